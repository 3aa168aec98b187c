//! Process assembly for the agent and the monitor.

use crate::agent::{Agent, HttpMonitorClient};
use crate::api::{self, ApiState};
use crate::core::{Config, Result, RunmonError};
use crate::monitor::MetricsMonitor;
use crate::storage;
use crate::task::Scheduler;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// A running monitor.
pub struct MonitorService {
    pub monitor: Arc<MetricsMonitor>,
    pub addr: SocketAddr,
}

/// Owns the configuration and the process-wide scheduler.
pub struct Application {
    config: Config,
    scheduler: Scheduler,
}

impl Application {
    /// Create a new Application with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            scheduler: Scheduler::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Build the agent and schedule its jobs.
    pub fn start_agent(&self) -> Result<Agent> {
        let client = Arc::new(HttpMonitorClient::from_config(&self.config)?);
        info!(
            monitor = %self.config.monitor_url(),
            protocol = ?self.config.agent.protocol,
            bulk = self.config.agent.bulk,
            signed = self.config.signing_key().is_some(),
            "Starting agent"
        );
        let agent = Agent::new(&self.config, client)?;
        agent.start(&self.scheduler);
        Ok(agent)
    }

    /// Open storage, restore, schedule dumps and start listening.
    pub async fn start_monitor(&self) -> Result<MonitorService> {
        let storages = storage::open(&self.config.storage)?;
        let monitor = Arc::new(MetricsMonitor::new(storages, &self.config.storage));
        monitor.init().await?;

        // A broken dump must not keep the monitor down.
        if let Err(e) = monitor.restore().await {
            warn!(error = %e, "Restore failed, starting with current storage contents");
        }

        if let Some((period, job)) = monitor.dump_job() {
            self.scheduler.periodic(period, job);
        }

        let listener = TcpListener::bind(&self.config.server.address).await.map_err(|e| {
            RunmonError::config(format!("can't listen on {}: {}", self.config.server.address, e))
        })?;
        let addr = listener.local_addr()?;

        let app = api::router(ApiState::new(
            Arc::clone(&monitor),
            self.config.signing_key().map(str::to_string),
        ));
        self.scheduler
            .spawn_until_shutdown("http", move |signal| api::serve(listener, app, signal));

        info!(
            %addr,
            storage = monitor.storage().name(),
            sync_dump = monitor.is_sync_dump(),
            "Monitor started"
        );
        Ok(MonitorService { monitor, addr })
    }

    /// Run the agent until a shutdown signal arrives.
    pub async fn run_agent(self) -> Result<()> {
        let _agent = self.start_agent()?;
        wait_for_signal().await;
        self.shutdown().await;
        Ok(())
    }

    /// Run the monitor until a shutdown signal arrives.
    pub async fn run_monitor(self) -> Result<()> {
        let service = self.start_monitor().await?;
        wait_for_signal().await;
        self.shutdown().await;
        service.monitor.close().await;
        Ok(())
    }

    /// Stop every job and wait for teardowns.
    pub async fn shutdown(&self) {
        info!("Shutting down");
        self.scheduler.shutdown().await;
        info!("All tasks stopped");
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            },
            Err(e) => {
                warn!(error = %e, "Can't install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            },
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received");
}
