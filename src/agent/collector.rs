//! Samplers and the polling task that publishes their output.

use super::reporter::EventPublisher;
use crate::core::{Metric, MetricList, Result, RunmonError};
use crate::task::{ShutdownSignal, Task};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, info_span, Instrument};

/// Source of one poll's worth of metrics.
pub trait Sampler: Send {
    fn name(&self) -> &'static str;

    /// Take a snapshot. Any failure discards the whole snapshot.
    fn sample(&mut self) -> Result<MetricList>;
}

/// Statistics of the agent's own process plus `RandomValue`.
pub struct RuntimeSampler {
    system: System,
    pid: Pid,
}

impl RuntimeSampler {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(RunmonError::sampling)?;
        Ok(Self {
            system: System::new(),
            pid,
        })
    }
}

impl Sampler for RuntimeSampler {
    fn name(&self) -> &'static str {
        "runtime"
    }

    fn sample(&mut self) -> Result<MetricList> {
        self.system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        let process = self
            .system
            .process(self.pid)
            .ok_or_else(|| RunmonError::sampling(format!("process {} not found", self.pid)))?;

        let disk = process.disk_usage();
        Ok(vec![
            Metric::gauge("ResidentMemory", process.memory() as f64),
            Metric::gauge("VirtualMemory", process.virtual_memory() as f64),
            Metric::gauge("ProcessCPU", f64::from(process.cpu_usage())),
            Metric::gauge("DiskReadBytes", disk.total_read_bytes as f64),
            Metric::gauge("DiskWrittenBytes", disk.total_written_bytes as f64),
            Metric::gauge("RunTime", process.run_time() as f64),
            Metric::gauge("RandomValue", rand::thread_rng().gen::<f64>()),
        ])
    }
}

/// Host memory and per-core CPU utilisation.
pub struct SystemSampler {
    system: System,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SystemSampler {
    fn name(&self) -> &'static str {
        "system"
    }

    fn sample(&mut self) -> Result<MetricList> {
        self.system.refresh_memory();
        self.system.refresh_cpu_all();

        let total = self.system.total_memory();
        if total == 0 {
            return Err(RunmonError::sampling("memory statistics are unavailable"));
        }

        let mut list = vec![
            Metric::gauge("TotalMemory", total as f64),
            Metric::gauge("FreeMemory", self.system.free_memory() as f64),
        ];
        for (i, cpu) in self.system.cpus().iter().enumerate() {
            list.push(Metric::gauge(
                format!("CPUutilization{}", i + 1),
                f64::from(cpu.cpu_usage()),
            ));
        }
        Ok(list)
    }
}

/// Periodic task: sample, then publish every metric.
pub struct MetricsCollector {
    name: String,
    sampler: Mutex<Box<dyn Sampler>>,
    publisher: EventPublisher,
    count_polls: bool,
    polls: AtomicI64,
    shutdown: OnceLock<ShutdownSignal>,
}

impl MetricsCollector {
    pub fn new(sampler: Box<dyn Sampler>, publisher: EventPublisher) -> Self {
        Self {
            name: format!("collector:{}", sampler.name()),
            sampler: Mutex::new(sampler),
            publisher,
            count_polls: false,
            polls: AtomicI64::new(0),
            shutdown: OnceLock::new(),
        }
    }

    /// Abort a poll that is waiting on a full queue once `signal` fires.
    /// Only the first binding takes effect.
    pub fn bind_shutdown(&self, signal: ShutdownSignal) {
        if self.shutdown.set(signal).is_err() {
            debug!(collector = %self.name, "Shutdown signal already bound");
        }
    }

    /// Also publish `PollCount`, incremented by one on every poll.
    pub fn with_poll_count(mut self) -> Self {
        self.count_polls = true;
        self
    }

    pub fn poll_count(&self) -> i64 {
        self.polls.load(Ordering::Relaxed)
    }

    /// One poll cycle.
    pub async fn poll(&self) -> Result<()> {
        let poll_count = self.polls.fetch_add(1, Ordering::Relaxed) + 1;
        let span = info_span!("poll", collector = %self.name, poll_count);

        async {
            let mut list = self.sampler.lock().sample()?;
            if self.count_polls {
                list.push(Metric::counter("PollCount", 1));
            }

            let published = list.len();
            match self.shutdown.get().cloned() {
                Some(mut signal) => {
                    for metric in list {
                        self.publisher.publish_until(metric, &mut signal).await?;
                    }
                },
                None => {
                    for metric in list {
                        self.publisher.publish(metric).await?;
                    }
                },
            }
            debug!(published, "Poll completed");
            Ok(())
        }
        .instrument(span)
        .await
    }
}

#[async_trait::async_trait]
impl Task for MetricsCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<()> {
        self.poll().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::client::MonitorClient;
    use crate::agent::reporter::Reporter;
    use crate::core::{CorrelationId, MetricType, MetricValue};
    use std::sync::Arc;

    struct NoopClient;

    #[async_trait::async_trait]
    impl MonitorClient for NoopClient {
        async fn update(&self, _: &Metric, _: &CorrelationId) -> Result<()> {
            Ok(())
        }
        async fn update_bulk(&self, _: &[Metric], _: &CorrelationId) -> Result<()> {
            Ok(())
        }
        async fn value(&self, _: &str, _: MetricType) -> Result<Option<MetricValue>> {
            Ok(None)
        }
    }

    struct FixedSampler {
        fail: bool,
    }

    impl Sampler for FixedSampler {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn sample(&mut self) -> Result<MetricList> {
            if self.fail {
                return Err(RunmonError::sampling("stat unavailable"));
            }
            Ok(vec![Metric::gauge("Alloc", 1.0), Metric::gauge("Sys", 2.0)])
        }
    }

    #[tokio::test]
    async fn test_poll_publishes_samples_and_poll_count() {
        let reporter = Reporter::new(Arc::new(NoopClient), 16, false);
        let collector =
            MetricsCollector::new(Box::new(FixedSampler { fail: false }), reporter.publisher())
                .with_poll_count();

        collector.poll().await.unwrap();
        collector.poll().await.unwrap();

        assert_eq!(collector.poll_count(), 2);
        assert_eq!(reporter.publisher().queued(), 6);
    }

    #[tokio::test]
    async fn test_failed_sample_publishes_nothing() {
        let reporter = Reporter::new(Arc::new(NoopClient), 16, false);
        let collector =
            MetricsCollector::new(Box::new(FixedSampler { fail: true }), reporter.publisher())
                .with_poll_count();

        assert!(collector.poll().await.is_err());
        assert_eq!(reporter.publisher().queued(), 0);
        assert_eq!(collector.poll_count(), 1);
    }

    #[test]
    fn test_system_sampler_names() {
        let mut sampler = SystemSampler::new();
        let list = sampler.sample().unwrap();
        let names: Vec<&str> = list.iter().map(|m| m.id.as_str()).collect();
        assert!(names.contains(&"TotalMemory"));
        assert!(names.contains(&"FreeMemory"));
        assert!(names.iter().any(|n| n.starts_with("CPUutilization")));
    }

    #[test]
    fn test_runtime_sampler_reports_own_process() {
        let mut sampler = RuntimeSampler::new().unwrap();
        let list = sampler.sample().unwrap();
        let resident = list.iter().find(|m| m.id == "ResidentMemory").unwrap();
        assert!(resident.value.as_gauge().unwrap() > 0.0);
        assert!(list.iter().any(|m| m.id == "RandomValue"));
    }
}
