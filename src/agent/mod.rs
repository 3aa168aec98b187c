//! Agent: samples runtime statistics and ships them to the monitor.

pub mod client;
pub mod collector;
pub mod reporter;

pub use client::{HttpMonitorClient, MonitorClient};
pub use collector::{MetricsCollector, RuntimeSampler, Sampler, SystemSampler};
pub use reporter::{EventPublisher, MetricEvent, Reporter};

use crate::core::{Config, Result};
use crate::task::{Job, Scheduler};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Collectors and the reporter they feed.
pub struct Agent {
    reporter: Arc<Reporter>,
    collectors: Vec<Arc<MetricsCollector>>,
    poll_interval: Duration,
    report_interval: Duration,
}

impl Agent {
    /// Agent with the runtime and system samplers.
    pub fn new(config: &Config, client: Arc<dyn MonitorClient>) -> Result<Self> {
        let samplers: Vec<Box<dyn Sampler>> =
            vec![Box::new(RuntimeSampler::new()?), Box::new(SystemSampler::new())];
        Ok(Self::with_samplers(config, client, samplers))
    }

    /// Agent over arbitrary samplers. The first one also publishes `PollCount`.
    pub fn with_samplers(
        config: &Config,
        client: Arc<dyn MonitorClient>,
        samplers: Vec<Box<dyn Sampler>>,
    ) -> Self {
        let reporter = Arc::new(Reporter::new(client, config.agent.buffer_size, config.agent.bulk));
        let collectors = samplers
            .into_iter()
            .enumerate()
            .map(|(i, sampler)| {
                let collector = MetricsCollector::new(sampler, reporter.publisher());
                Arc::new(if i == 0 { collector.with_poll_count() } else { collector })
            })
            .collect();

        Self {
            reporter,
            collectors,
            poll_interval: config.agent.poll_interval,
            report_interval: config.agent.report_interval,
        }
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    pub fn collectors(&self) -> &[Arc<MetricsCollector>] {
        &self.collectors
    }

    /// Schedule polling and reporting on `scheduler`.
    pub fn start(&self, scheduler: &Scheduler) {
        for collector in &self.collectors {
            collector.bind_shutdown(scheduler.shutdown_signal());
            scheduler.periodic(self.poll_interval, Job::new(collector.clone()));
        }
        scheduler.periodic(self.report_interval, Job::new(self.reporter.clone()));
        info!(
            collectors = self.collectors.len(),
            poll_interval = ?self.poll_interval,
            report_interval = ?self.report_interval,
            "Agent started"
        );
    }
}
