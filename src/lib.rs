//! runmon - runtime metrics agent and monitor.
//!
//! The agent samples process and host statistics, buffers them in a bounded
//! queue and reports them over HTTP. The monitor validates incoming metrics,
//! merges them into storage and serves them back.
//!
//! # Architecture
//!
//! - `core`: metric model, configuration, errors, correlation IDs
//! - `protocol`: JSON wire format, validation and HMAC signing
//! - `storage`: memory, JSON-lines file and Postgres backends
//! - `monitor`: storage orchestration, dump and restore
//! - `api`: the monitor's HTTP surface
//! - `agent`: samplers, reporter and the monitor client
//! - `task`: periodic jobs and graceful shutdown
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use runmon_lib::core::Config;
//! use runmon_lib::Application;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = Application::new(Config::default());
//!     app.run_monitor().await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod agent;
pub mod api;
pub mod application;
pub mod cli;
pub mod core;
pub mod monitor;
pub mod protocol;
pub mod storage;
pub mod task;

pub use crate::application::{Application, MonitorService};
pub use crate::core::{Config, Metric, MetricType, MetricValue, Result, RunmonError};
