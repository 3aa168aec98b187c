//! JSON-lines dump file.
//!
//! One [`Metric`] per line in the `{"ID":..,"Type":..,"Value":..}` form. The
//! file is a dump target, not a point-query store: every bulk update
//! replaces the whole file and single-metric access is unsupported.

use super::MetricStorage;
use crate::core::{Metric, MetricList, MetricType, Result, RunmonError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Persistent dump store backed by a single file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unsupported(&self, op: &str) -> RunmonError {
        RunmonError::storage(format!(
            "{} is not supported by file storage {}",
            op,
            self.path.display()
        ))
    }

    /// The old file is only removed once every record has serialized.
    async fn rewrite(&self, list: &[Metric]) -> Result<()> {
        let mut buf = Vec::with_capacity(list.len() * 48);
        for metric in list {
            serde_json::to_writer(&mut buf, metric)?;
            buf.push(b'\n');
        }

        match fs::remove_file(&self.path).await {
            Ok(()) => {},
            Err(e) if e.kind() == ErrorKind::NotFound => {},
            Err(e) => return Err(e.into()),
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        trace!(path = %self.path.display(), records = list.len(), "Dump written");
        Ok(())
    }
}

#[async_trait::async_trait]
impl MetricStorage for FileStorage {
    fn name(&self) -> &'static str {
        "file"
    }

    fn is_persistent(&self) -> bool {
        true
    }

    async fn ping(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let meta = fs::metadata(dir).await?;
        if !meta.is_dir() {
            return Err(RunmonError::storage(format!("{} is not a directory", dir.display())));
        }
        Ok(())
    }

    async fn get(&self, _id: &str, _kind: MetricType) -> Result<Option<Metric>> {
        Err(self.unsupported("get"))
    }

    /// Fails on the first malformed line. A missing file is created empty.
    async fn get_all(&self) -> Result<MetricList> {
        let _guard = self.lock.read().await;

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .await?;
        let mut lines = BufReader::new(file).lines();

        let mut list = MetricList::new();
        let mut line_no = 0usize;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let metric: Metric = serde_json::from_str(&line).map_err(|e| {
                RunmonError::storage(format!(
                    "{}:{}: malformed dump record: {}",
                    self.path.display(),
                    line_no,
                    e
                ))
            })?;
            list.push(metric);
        }

        debug!(path = %self.path.display(), records = list.len(), "Dump read");
        Ok(list)
    }

    async fn update(&self, _metric: &Metric) -> Result<()> {
        Err(self.unsupported("update"))
    }

    /// Replace the whole file with `list`.
    async fn update_bulk(&self, list: &[Metric]) -> Result<()> {
        let _guard = self.lock.write().await;
        self.rewrite(list).await
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.lock.write().await;
        self.rewrite(&[]).await
    }
}
