//! Storage backend trait.

use crate::core::{Metric, MetricList, MetricType, Result};

/// Capability interface shared by all metric stores.
///
/// Updates are upserts: a metric is created the first time its
/// `(id, type)` pair is seen and merged afterwards (counters add, gauges
/// replace). Bulk updates apply the same rule item by item.
#[async_trait::async_trait]
pub trait MetricStorage: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Whether contents survive a restart.
    fn is_persistent(&self) -> bool;

    /// Prepare the backend. Idempotent.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Connectivity check, no data access.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Release resources. Best effort.
    async fn close(&self) {}

    /// Point read. An absent metric is `Ok(None)`.
    async fn get(&self, id: &str, kind: MetricType) -> Result<Option<Metric>>;

    /// Every stored metric, in no particular order.
    async fn get_all(&self) -> Result<MetricList>;

    /// Upsert one metric.
    async fn update(&self, metric: &Metric) -> Result<()>;

    /// Upsert each metric in turn.
    async fn update_bulk(&self, list: &[Metric]) -> Result<()>;

    /// Remove everything.
    async fn clear(&self) -> Result<()>;
}
