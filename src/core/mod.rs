//! Core domain model for runmon.
//!
//! Metric types and merge rules, configuration, errors and the correlation
//! identifiers shared by the agent and the monitor.

#![warn(missing_docs)]

pub mod config;
pub mod correlation;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder, ReportProtocol};
pub use correlation::{CorrelationId, CORRELATION_ID_HEADER};
pub use error::{Result, RunmonError};
pub use types::{Metric, MetricList, MetricType, MetricValue};
