//! In-memory metric store.
//!
//! Two maps, one per metric type, behind a single coarse read/write lock.
//! Contents are lost on restart.

use super::MetricStorage;
use crate::core::{Metric, MetricList, MetricType, MetricValue, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
struct Maps {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

impl Maps {
    fn apply(&mut self, metric: &Metric) -> Result<()> {
        metric.validate()?;
        match metric.value {
            MetricValue::Gauge(v) => {
                self.gauges.insert(metric.id.clone(), v);
            },
            MetricValue::Counter(delta) => {
                let merged = match self.counters.get(&metric.id) {
                    Some(&stored) => MetricValue::Counter(stored).merge(metric.value)?,
                    None => MetricValue::Counter(delta),
                };
                if let MetricValue::Counter(total) = merged {
                    self.counters.insert(metric.id.clone(), total);
                }
            },
        }
        Ok(())
    }
}

/// Non-persistent store backed by hash maps.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    maps: RwLock<Maps>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let maps = self.maps.read();
        maps.gauges.len() + maps.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl MetricStorage for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_persistent(&self) -> bool {
        false
    }

    async fn get(&self, id: &str, kind: MetricType) -> Result<Option<Metric>> {
        let maps = self.maps.read();
        let metric = match kind {
            MetricType::Gauge => maps.gauges.get(id).map(|&v| Metric::gauge(id, v)),
            MetricType::Counter => maps.counters.get(id).map(|&v| Metric::counter(id, v)),
        };
        Ok(metric)
    }

    async fn get_all(&self) -> Result<MetricList> {
        let maps = self.maps.read();
        let gauges = maps.gauges.iter().map(|(id, &v)| Metric::gauge(id.clone(), v));
        let counters = maps.counters.iter().map(|(id, &v)| Metric::counter(id.clone(), v));
        Ok(gauges.chain(counters).collect())
    }

    async fn update(&self, metric: &Metric) -> Result<()> {
        self.maps.write().apply(metric)
    }

    async fn update_bulk(&self, list: &[Metric]) -> Result<()> {
        let mut maps = self.maps.write();
        // A failing item leaves the store untouched.
        let mut staged = maps.clone();
        list.iter().try_for_each(|metric| staged.apply(metric))?;
        *maps = staged;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut maps = self.maps.write();
        maps.gauges.clear();
        maps.counters.clear();
        Ok(())
    }
}
