//! Command-line interface for runmon.
//!
//! `runmon agent` samples and reports, `runmon monitor` stores and serves.
//! Every flag also reads an environment variable.

use crate::application::Application;
use crate::core::config::{ConfigBuilder, LogLevel};
use crate::core::{Config, ReportProtocol, Result, RunmonError};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime metrics agent and monitor.
#[derive(Parser, Debug)]
#[command(name = "runmon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file path (default: ~/.config/runmon/config.yaml)
    #[arg(short, long, global = true, env = "RUNMON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, env = "RUNMON_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long, global = true)]
    pub check_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sample runtime metrics and report them to a monitor
    Agent(AgentArgs),
    /// Receive, store and serve metrics
    Monitor(MonitorArgs),
}

/// Flags shared by both sides.
#[derive(Args, Debug, Default)]
pub struct CommonArgs {
    /// Monitor address (host:port)
    #[arg(short, long, env = "ADDRESS")]
    pub address: Option<String>,

    /// HMAC-SHA256 signing key
    #[arg(short, long, env = "KEY")]
    pub key: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct AgentArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Poll interval (seconds or a duration like `2s`)
    #[arg(short, long, env = "POLL_INTERVAL", value_parser = parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Report interval (seconds or a duration like `10s`)
    #[arg(short, long, env = "REPORT_INTERVAL", value_parser = parse_duration)]
    pub report_interval: Option<Duration>,

    /// Capacity of the report queue
    #[arg(long, env = "BUFFER_SIZE")]
    pub buffer_size: Option<usize>,

    /// Send each report as one batch
    #[arg(long, env = "BULK")]
    pub bulk: Option<bool>,

    /// Transport protocol: json or plain
    #[arg(long, env = "PROTOCOL", value_parser = parse_protocol)]
    pub protocol: Option<ReportProtocol>,
}

#[derive(Args, Debug, Default)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Dump interval, 0 dumps after every update
    #[arg(short = 'i', long, env = "STORE_INTERVAL", value_parser = parse_duration)]
    pub store_interval: Option<Duration>,

    /// Dump file, empty disables dumping
    #[arg(short = 'f', long, env = "STORE_FILE")]
    pub store_file: Option<String>,

    /// Load the dump on start
    #[arg(short, long, env = "RESTORE")]
    pub restore: Option<bool>,

    /// Postgres DSN, replaces the in-memory storage
    #[arg(long = "database-dsn", env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,
}

fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

fn parse_protocol(s: &str) -> std::result::Result<ReportProtocol, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(ReportProtocol::Json),
        "plain" => Ok(ReportProtocol::Plain),
        other => Err(format!("unknown protocol '{}', expected json or plain", other)),
    }
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Config file to read: the explicit `--config` path, or the per-user
    /// default when that file exists.
    pub fn config_source(&self) -> Option<PathBuf> {
        match &self.config {
            Some(path) => Some(path.clone()),
            None => dirs::config_dir()
                .map(|d| d.join("runmon").join("config.yaml"))
                .filter(|p| p.exists()),
        }
    }

    /// Load configuration with precedence CLI/env > config file > defaults.
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        if let Some(path) = self.config_source() {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    builder = builder.from_yaml(&content)?;
                },
                Err(e) => {
                    return Err(RunmonError::config(format!(
                        "failed to read config file {}: {}",
                        path.display(),
                        e
                    )));
                },
            }
        }

        self.apply_overrides(builder).build()
    }

    fn apply_overrides(&self, mut builder: ConfigBuilder) -> ConfigBuilder {
        let common = match &self.command {
            Command::Agent(args) => {
                if let Some(interval) = args.poll_interval {
                    builder = builder.poll_interval(interval);
                }
                if let Some(interval) = args.report_interval {
                    builder = builder.report_interval(interval);
                }
                if let Some(size) = args.buffer_size {
                    builder = builder.buffer_size(size);
                }
                if let Some(bulk) = args.bulk {
                    builder = builder.bulk(bulk);
                }
                if let Some(protocol) = args.protocol {
                    builder = builder.protocol(protocol);
                }
                &args.common
            },
            Command::Monitor(args) => {
                if let Some(interval) = args.store_interval {
                    builder = builder.store_interval(interval);
                }
                if let Some(path) = &args.store_file {
                    builder = builder.store_file(PathBuf::from(path));
                }
                if let Some(restore) = args.restore {
                    builder = builder.restore(restore);
                }
                if let Some(dsn) = &args.database_dsn {
                    builder = builder.database_dsn(dsn.as_str());
                }
                &args.common
            },
        };

        if let Some(address) = &common.address {
            builder = builder.address(address.as_str());
        }
        if let Some(key) = &common.key {
            builder = builder.key(key.as_str());
        }
        builder.debug(self.debug)
    }

    /// Initialize logging. `RUST_LOG` wins over `RUNMON_LOG_LEVEL` and `--debug`.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let level = if self.debug {
            LogLevel::Debug.as_str().to_string()
        } else {
            std::env::var("RUNMON_LOG_LEVEL")
                .unwrap_or_else(|_| config.logging.level.as_str().to_string())
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let fmt_layer = if config.logging.structured {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer().with_target(false).compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| RunmonError::config(format!("failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Execute the selected subcommand.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.load_config().await?;
    cli.init_logging(&config)?;
    match cli.config_source() {
        Some(path) => tracing::info!(path = %path.display(), "Loaded configuration"),
        None => tracing::debug!("No config file, using defaults and flags"),
    }

    if cli.check_config {
        config.validate()?;
        println!("Configuration is valid!");
        println!("  Address: {}", config.server.address);
        match &cli.command {
            Command::Agent(_) => {
                println!("  Poll interval: {:?}", config.agent.poll_interval);
                println!("  Report interval: {:?}", config.agent.report_interval);
                println!("  Protocol: {:?}", config.agent.protocol);
            },
            Command::Monitor(_) => {
                println!("  Store interval: {:?}", config.storage.store_interval);
                println!("  Restore: {}", config.storage.restore);
                println!(
                    "  Storage: {}",
                    if config.storage.database_dsn.is_some() { "postgres" } else { "memory" }
                );
            },
        }
        return Ok(());
    }

    let app = Application::new(config);
    match cli.command {
        Command::Agent(_) => app.run_agent().await,
        Command::Monitor(_) => app.run_monitor().await,
    }
}
