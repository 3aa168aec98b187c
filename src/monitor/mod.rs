//! Monitor orchestrator.
//!
//! Glues the live storage to the HTTP surface and keeps the optional dump
//! storage in sync, either after every update (zero store interval) or from
//! a periodic background job. Never both.

use crate::core::config::StorageConfig;
use crate::core::{Metric, MetricList, MetricType, Result};
use crate::storage::{MetricStorage, Storages};
use crate::task::{Job, Task};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Serves metric reads and writes on top of the configured storages.
pub struct MetricsMonitor {
    storage: Arc<dyn MetricStorage>,
    dump: Option<Arc<dyn MetricStorage>>,
    store_interval: Duration,
    restore: bool,
    // Serializes read-all + rewrite so concurrent dumps can't publish stale snapshots.
    dump_lock: Mutex<()>,
}

impl MetricsMonitor {
    pub fn new(storages: Storages, config: &StorageConfig) -> Self {
        Self {
            storage: storages.live,
            dump: storages.dump,
            store_interval: config.store_interval,
            restore: config.restore,
            dump_lock: Mutex::new(()),
        }
    }

    /// Live storage handle.
    pub fn storage(&self) -> &Arc<dyn MetricStorage> {
        &self.storage
    }

    /// Whether every update is followed by a dump.
    pub fn is_sync_dump(&self) -> bool {
        self.store_interval.is_zero()
    }

    /// Initialise both storages.
    pub async fn init(&self) -> Result<()> {
        self.storage.init().await?;
        if let Some(dump) = &self.dump {
            dump.init().await?;
        }
        Ok(())
    }

    /// Seed live storage from the dump.
    ///
    /// A no-op when restore is disabled or no dump storage is configured.
    /// Persistent live storage is cleared before loading. Returns the number
    /// of restored metrics.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<usize> {
        if !self.restore {
            info!("Restore is disabled");
            return Ok(0);
        }
        let Some(dump) = &self.dump else {
            warn!("Restore skipped: dump storage is not set");
            return Ok(0);
        };

        let list = dump.get_all().await?;
        if self.storage.is_persistent() {
            self.storage.clear().await?;
        }
        self.storage.update_bulk(&list).await?;

        info!(restored = list.len(), storage = self.storage.name(), "Metrics restored from dump");
        Ok(list.len())
    }

    #[instrument(skip(self, metric), fields(metric_id = %metric.id, metric_type = %metric.kind()))]
    pub async fn update(&self, metric: &Metric) -> Result<()> {
        metric.validate()?;
        self.storage.update(metric).await?;
        debug!("Metric updated");
        self.sync_dump().await
    }

    #[instrument(skip(self, list), fields(count = list.len()))]
    pub async fn update_bulk(&self, list: &[Metric]) -> Result<()> {
        for metric in list {
            metric.validate()?;
        }
        self.storage.update_bulk(list).await?;
        debug!("Metrics batch updated");
        self.sync_dump().await
    }

    pub async fn get(&self, id: &str, kind: MetricType) -> Result<Option<Metric>> {
        self.storage.get(id, kind).await
    }

    pub async fn get_all(&self) -> Result<MetricList> {
        self.storage.get_all().await
    }

    /// Dump storage connectivity. Without a dump there is nothing to check.
    pub async fn ping(&self) -> Result<()> {
        match &self.dump {
            Some(dump) => dump.ping().await,
            None => Ok(()),
        }
    }

    /// Replace the dump with the current contents of live storage.
    pub async fn dump(&self) -> Result<()> {
        let Some(dump) = &self.dump else {
            return Ok(());
        };

        let _guard = self.dump_lock.lock().await;
        let list = self.storage.get_all().await?;
        dump.update_bulk(&list).await?;
        debug!(records = list.len(), dump = dump.name(), "Metrics dumped");
        Ok(())
    }

    async fn sync_dump(&self) -> Result<()> {
        if self.is_sync_dump() {
            self.dump().await?;
        }
        Ok(())
    }

    /// Periodic dump job, `None` in sync mode or without dump storage.
    pub fn dump_job(self: &Arc<Self>) -> Option<(Duration, Job)> {
        if self.is_sync_dump() || self.dump.is_none() {
            return None;
        }
        let task = DumpTask {
            monitor: Arc::clone(self),
        };
        Some((self.store_interval, Job::new(Arc::new(task))))
    }

    /// Release storage resources.
    pub async fn close(&self) {
        self.storage.close().await;
        if let Some(dump) = &self.dump {
            dump.close().await;
        }
    }
}

/// Background dump with a final dump on teardown.
struct DumpTask {
    monitor: Arc<MetricsMonitor>,
}

#[async_trait::async_trait]
impl Task for DumpTask {
    fn name(&self) -> &str {
        "dump"
    }

    async fn run(&self) -> Result<()> {
        self.monitor.dump().await
    }

    async fn teardown(&self) {
        if let Err(e) = self.monitor.dump().await {
            warn!(error = %e, "Final dump failed");
        }
    }
}
