//! Configuration management for runmon.
//!
//! Configuration is layered as defaults, YAML file, environment and CLI
//! flags. The core only ever sees the finished [`Config`].

use crate::core::{Result, RunmonError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration shared by the agent and the monitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Monitor endpoint (listen address for the monitor, target for the agent)
    pub server: ServerConfig,
    /// Agent sampling and reporting
    pub agent: AgentConfig,
    /// Monitor storage
    pub storage: StorageConfig,
    /// Payload signing
    pub security: SecurityConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` of the monitor
    pub address: String,
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// How often samplers run
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// How often the buffer is drained to the monitor
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,
    /// Capacity of the event buffer between samplers and the reporter
    pub buffer_size: usize,
    /// Send each drain as a single batch
    pub bulk: bool,
    /// Wire format used towards the monitor
    pub protocol: ReportProtocol,
    /// Per-request timeout of the HTTP client
    #[serde(with = "humantime_serde")]
    pub client_timeout: Duration,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Dump period, zero means dump after every update
    #[serde(with = "humantime_serde")]
    pub store_interval: Duration,
    /// JSON-lines dump file, `None` disables dumping
    pub store_file: Option<PathBuf>,
    /// Load the dump into live storage at startup
    pub restore: bool,
    /// Postgres DSN, switches live storage from memory to the database
    pub database_dsn: Option<String>,
    /// Bound on every database call
    #[serde(with = "humantime_serde")]
    pub db_timeout: Duration,
}

/// Security configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Shared HMAC key, signing is disabled when absent or empty
    pub key: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Structured logging format
    pub structured: bool,
}

/// Agent wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportProtocol {
    /// `POST /update/<type>/<id>/<value>`, no body
    Plain,
    /// `POST /update` and `POST /updates` with JSON bodies
    Json,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "localhost:8080".to_string(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            poll_interval: Duration::from_secs(2),
            report_interval: Duration::from_secs(10),
            buffer_size: 256,
            bulk: false,
            protocol: ReportProtocol::Json,
            client_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            store_interval: Duration::from_secs(300),
            store_file: Some(PathBuf::from("/tmp/devops-metrics-db.json")),
            restore: true,
            database_dsn: None,
            db_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.address.trim().is_empty() {
            return Err(RunmonError::config("server address must not be empty"));
        }

        if self.agent.poll_interval.is_zero() {
            return Err(RunmonError::config("poll_interval must be greater than 0"));
        }

        if self.agent.report_interval.is_zero() {
            return Err(RunmonError::config("report_interval must be greater than 0"));
        }

        if self.agent.buffer_size == 0 {
            return Err(RunmonError::config("buffer_size must be greater than 0"));
        }

        if self.storage.db_timeout.is_zero() {
            return Err(RunmonError::config("db_timeout must be greater than 0"));
        }

        Ok(())
    }

    /// Signing key, `None` when signing is disabled.
    pub fn signing_key(&self) -> Option<&str> {
        self.security.key.as_deref().filter(|k| !k.is_empty())
    }

    /// Base URL the agent reports to.
    pub fn monitor_url(&self) -> String {
        if self.server.address.starts_with("http://") || self.server.address.starts_with("https://")
        {
            self.server.address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", self.server.address)
        }
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| RunmonError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set the monitor address
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.server.address = address.into();
        self
    }

    /// Set the poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.agent.poll_interval = interval;
        self
    }

    /// Set the report interval
    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.config.agent.report_interval = interval;
        self
    }

    /// Set the event buffer capacity
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.agent.buffer_size = size;
        self
    }

    /// Report in batches
    pub fn bulk(mut self, bulk: bool) -> Self {
        self.config.agent.bulk = bulk;
        self
    }

    /// Set the agent wire format
    pub fn protocol(mut self, protocol: ReportProtocol) -> Self {
        self.config.agent.protocol = protocol;
        self
    }

    /// Set the dump interval
    pub fn store_interval(mut self, interval: Duration) -> Self {
        self.config.storage.store_interval = interval;
        self
    }

    /// Set the dump file, an empty path disables dumping
    pub fn store_file(mut self, path: PathBuf) -> Self {
        self.config.storage.store_file = (!path.as_os_str().is_empty()).then_some(path);
        self
    }

    /// Enable restore at startup
    pub fn restore(mut self, restore: bool) -> Self {
        self.config.storage.restore = restore;
        self
    }

    /// Set the Postgres DSN, an empty DSN keeps memory storage
    pub fn database_dsn(mut self, dsn: impl Into<String>) -> Self {
        let dsn = dsn.into();
        self.config.storage.database_dsn = (!dsn.is_empty()).then_some(dsn);
        self
    }

    /// Set the signing key
    pub fn key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.security.key = (!key.is_empty()).then_some(key);
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.address, "localhost:8080");
        assert_eq!(config.agent.poll_interval, Duration::from_secs(2));
        assert_eq!(config.agent.report_interval, Duration::from_secs(10));
        assert_eq!(config.storage.store_interval, Duration::from_secs(300));
        assert!(config.storage.restore);
        assert!(config.signing_key().is_none());
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let mut config = Config::default();
        config.agent.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.agent.report_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        // Zero store interval means synchronous dumps
        let mut config = Config::default();
        config.storage.store_interval = Duration::ZERO;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_address_is_rejected() {
        assert!(ConfigBuilder::new().address("  ").build().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .address("127.0.0.1:9090")
            .poll_interval(Duration::from_millis(500))
            .bulk(true)
            .protocol(ReportProtocol::Plain)
            .store_file(PathBuf::new())
            .database_dsn("")
            .key("secret")
            .debug(true)
            .build()
            .unwrap();

        assert_eq!(config.server.address, "127.0.0.1:9090");
        assert_eq!(config.agent.poll_interval, Duration::from_millis(500));
        assert!(config.agent.bulk);
        assert_eq!(config.agent.protocol, ReportProtocol::Plain);
        assert!(config.storage.store_file.is_none());
        assert!(config.storage.database_dsn.is_none());
        assert_eq!(config.signing_key(), Some("secret"));
        assert!(config.debug);
    }

    #[test]
    fn test_monitor_url() {
        let config = ConfigBuilder::new().address("localhost:8080").build().unwrap();
        assert_eq!(config.monitor_url(), "http://localhost:8080");

        let config = ConfigBuilder::new().address("https://mon.local/").build().unwrap();
        assert_eq!(config.monitor_url(), "https://mon.local");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
server:
  address: "0.0.0.0:9000"
agent:
  poll_interval: 1s
  report_interval: 5s
  protocol: plain
storage:
  store_interval: 0s
  store_file: /var/lib/runmon/dump.json
  database_dsn: postgres://runmon@localhost/metrics
security:
  key: shared
"#;

        let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

        assert_eq!(config.server.address, "0.0.0.0:9000");
        assert_eq!(config.agent.poll_interval, Duration::from_secs(1));
        assert_eq!(config.agent.report_interval, Duration::from_secs(5));
        assert_eq!(config.agent.buffer_size, 256);
        assert_eq!(config.agent.protocol, ReportProtocol::Plain);
        assert!(config.storage.store_interval.is_zero());
        assert_eq!(
            config.storage.store_file,
            Some(PathBuf::from("/var/lib/runmon/dump.json"))
        );
        assert!(config.storage.restore);
        assert_eq!(config.signing_key(), Some("shared"));
    }
}
