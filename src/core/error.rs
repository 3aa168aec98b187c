use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunmonError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown metric type: {0}")]
    UnknownType(String),

    #[error("Signature verification failed: {0}")]
    Signature(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Sampling error: {0}")]
    Sampling(String),

    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Operation cancelled by shutdown")]
    Cancelled,
}

/// Result type alias for runmon operations
pub type Result<T> = std::result::Result<T, RunmonError>;

impl RunmonError {
    /// Creates a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a new unknown type error
    pub fn unknown_type<S: Into<String>>(name: S) -> Self {
        Self::UnknownType(name.into())
    }

    /// Creates a new signature error
    pub fn signature<S: Into<String>>(msg: S) -> Self {
        Self::Signature(msg.into())
    }

    /// Creates a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a new sampling error
    pub fn sampling<S: Into<String>>(msg: S) -> Self {
        Self::Sampling(msg.into())
    }

    /// Creates a new parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Returns true if the failed operation may succeed on the next scheduled attempt.
    ///
    /// Nothing retries inside a call; this only informs logging and the
    /// periodic tasks that will try again on their next tick.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Sampling(_) | Self::Timeout { .. } | Self::ChannelClosed => {
                true
            },
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Database(e) => matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)),
            _ => false,
        }
    }

    /// Returns true for failures caused by the client's input (4xx territory).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::UnknownType(_) | Self::Signature(_) | Self::Parse { .. }
        )
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::UnknownType(_) | Self::Parse { .. } => "validation",
            Self::Signature(_) => "signature",
            Self::Storage(_) | Self::Database(_) => "storage",
            Self::Config(_) => "config",
            Self::Transport(_) | Self::Http(_) => "transport",
            Self::Sampling(_) => "sampling",
            Self::Timeout { .. } => "timeout",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Join(_) => "async",
            Self::ChannelClosed => "channel",
            Self::Cancelled => "cancelled",
        }
    }
}
