//! Correlation identifiers carried from a sampler to the monitor's logs.

use std::fmt;
use uuid::Uuid;

/// HTTP header used to propagate the identifier.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Opaque per-event identifier, attached at publish time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Reuse an identifier received from a peer, generating one if it is blank.
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => Self(v.to_string()),
            _ => Self::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }

    #[test]
    fn test_from_header() {
        assert_eq!(CorrelationId::from_header(Some("abc")).as_str(), "abc");
        assert!(!CorrelationId::from_header(Some("  ")).as_str().trim().is_empty());
        assert!(!CorrelationId::from_header(None).as_str().is_empty());
    }
}
