//! Postgres metric store.
//!
//! A single flat `metrics` table with one row per `(metric_id, metric_type)`.
//! Every call runs in its own transaction bounded by the configured timeout.
//! Upserts read the current row and then insert or update it; the table has
//! no uniqueness constraint, so concurrent writers for the same metric can
//! race between the read and the write.

use super::MetricStorage;
use crate::core::{Metric, MetricList, MetricType, MetricValue, Result, RunmonError};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, Row};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS metrics (
        metric_id varchar(255) NOT NULL,
        metric_type varchar(255) NOT NULL,
        value double precision,
        delta int8
    )
"#;

const SELECT_ONE: &str =
    "SELECT value, delta FROM metrics WHERE metric_id = $1 AND metric_type = $2 LIMIT 1";
const SELECT_ALL: &str = "SELECT metric_id, metric_type, value, delta FROM metrics";
const INSERT: &str =
    "INSERT INTO metrics (metric_id, metric_type, value, delta) VALUES ($1, $2, $3, $4)";
const UPDATE_GAUGE: &str =
    "UPDATE metrics SET value = $3 WHERE metric_id = $1 AND metric_type = $2";
const UPDATE_COUNTER: &str =
    "UPDATE metrics SET delta = delta + $3 WHERE metric_id = $1 AND metric_type = $2";
const DELETE_ALL: &str = "DELETE FROM metrics";

/// Persistent store backed by a Postgres pool.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresStorage {
    /// Create a lazily connecting pool; nothing touches the network until `init`.
    pub fn connect_lazy(dsn: &str, timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(timeout)
            .connect_lazy(dsn)?;
        Ok(Self { pool, timeout })
    }

    pub fn from_pool(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout = ?self.timeout, "Database call timed out");
                Err(RunmonError::Timeout {
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            },
        }
    }
}

fn metric_from_row(id: &str, kind: MetricType, row: &PgRow) -> Result<Metric> {
    let value = match kind {
        MetricType::Gauge => row.try_get::<Option<f64>, _>("value")?.map(MetricValue::Gauge),
        MetricType::Counter => row.try_get::<Option<i64>, _>("delta")?.map(MetricValue::Counter),
    };
    value
        .map(|value| Metric::new(id, value))
        .ok_or_else(|| RunmonError::storage(format!("stored {} '{}' has no measurement", kind, id)))
}

async fn read(conn: &mut PgConnection, id: &str, kind: MetricType) -> Result<Option<Metric>> {
    let row = sqlx::query(SELECT_ONE)
        .bind(id)
        .bind(kind.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|row| metric_from_row(id, kind, &row)).transpose()
}

async fn upsert(conn: &mut PgConnection, metric: &Metric) -> Result<()> {
    metric.validate()?;
    let kind = metric.kind();

    match read(&mut *conn, &metric.id, kind).await? {
        None => {
            sqlx::query(INSERT)
                .bind(&metric.id)
                .bind(kind.as_str())
                .bind(metric.value.as_gauge())
                .bind(metric.value.as_counter())
                .execute(&mut *conn)
                .await?;
        },
        Some(stored) => {
            // Surfaces counter overflow before the database sees it.
            stored.merge(metric)?;
            let query = match metric.value {
                MetricValue::Gauge(v) => sqlx::query(UPDATE_GAUGE)
                    .bind(&metric.id)
                    .bind(kind.as_str())
                    .bind(v),
                MetricValue::Counter(delta) => sqlx::query(UPDATE_COUNTER)
                    .bind(&metric.id)
                    .bind(kind.as_str())
                    .bind(delta),
            };
            query.execute(&mut *conn).await?;
        },
    }
    Ok(())
}

#[async_trait::async_trait]
impl MetricStorage for PostgresStorage {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn is_persistent(&self) -> bool {
        true
    }

    async fn init(&self) -> Result<()> {
        self.bounded("init", async {
            sqlx::query(SCHEMA).execute(&self.pool).await?;
            Ok(())
        })
        .await?;
        info!("Metrics schema initialized");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.bounded("ping", async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("Database pool closed");
    }

    async fn get(&self, id: &str, kind: MetricType) -> Result<Option<Metric>> {
        self.bounded("get", async {
            let mut tx = self.pool.begin().await?;
            let metric = read(&mut tx, id, kind).await?;
            tx.commit().await?;
            Ok(metric)
        })
        .await
    }

    async fn get_all(&self) -> Result<MetricList> {
        self.bounded("get_all", async {
            let mut tx = self.pool.begin().await?;
            let rows = sqlx::query(SELECT_ALL).fetch_all(&mut *tx).await?;
            tx.commit().await?;

            rows.iter()
                .map(|row| {
                    let id: String = row.try_get("metric_id")?;
                    let kind: MetricType = row.try_get::<String, _>("metric_type")?.parse()?;
                    metric_from_row(&id, kind, row)
                })
                .collect()
        })
        .await
    }

    async fn update(&self, metric: &Metric) -> Result<()> {
        self.bounded("update", async {
            let mut tx = self.pool.begin().await?;
            upsert(&mut tx, metric).await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn update_bulk(&self, list: &[Metric]) -> Result<()> {
        self.bounded("update_bulk", async {
            let mut tx = self.pool.begin().await?;
            for metric in list {
                upsert(&mut tx, metric).await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.bounded("clear", async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(DELETE_ALL).execute(&mut *tx).await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }
}
