//! Metric storage.
//!
//! The [`MetricStorage`] trait with three backends: an in-memory map, a
//! JSON-lines dump file and a Postgres table. [`open`] picks the live and
//! dump stores from configuration.

pub mod backend;
pub mod file;
pub mod memory;
pub mod postgres;

pub use backend::MetricStorage;
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;

use crate::core::config::StorageConfig;
use crate::core::Result;
use std::sync::Arc;
use tracing::info;

/// Live storage plus the optional dump target.
#[derive(Clone)]
pub struct Storages {
    pub live: Arc<dyn MetricStorage>,
    pub dump: Option<Arc<dyn MetricStorage>>,
}

/// Build storages from configuration.
///
/// Live storage is Postgres when a DSN is set, memory otherwise. The dump
/// target is the store file when one is set.
pub fn open(config: &StorageConfig) -> Result<Storages> {
    let live: Arc<dyn MetricStorage> = match config.database_dsn.as_deref() {
        Some(dsn) if !dsn.is_empty() => {
            Arc::new(PostgresStorage::connect_lazy(dsn, config.db_timeout)?)
        },
        _ => Arc::new(MemoryStorage::new()),
    };

    let dump: Option<Arc<dyn MetricStorage>> = config
        .store_file
        .as_ref()
        .filter(|path| !path.as_os_str().is_empty())
        .map(|path| Arc::new(FileStorage::new(path.clone())) as Arc<dyn MetricStorage>);

    info!(
        storage = live.name(),
        dump = dump.as_ref().map_or("none", |d| d.name()),
        "Storage configured"
    );
    Ok(Storages { live, dump })
}
