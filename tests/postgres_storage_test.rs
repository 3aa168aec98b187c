//! Postgres backend against a live server.
//!
//! Run with `RUNMON_TEST_DATABASE_URL=postgres://... cargo test -- --ignored`.

use pretty_assertions::assert_eq;
use runmon_lib::core::types::sort_by_display;
use runmon_lib::core::{Metric, MetricType, RunmonError};
use runmon_lib::storage::{MetricStorage, PostgresStorage};
use std::time::Duration;

fn storage() -> PostgresStorage {
    let dsn = std::env::var("RUNMON_TEST_DATABASE_URL")
        .expect("RUNMON_TEST_DATABASE_URL must point at a scratch database");
    PostgresStorage::connect_lazy(&dsn, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
#[ignore = "needs RUNMON_TEST_DATABASE_URL"]
async fn test_postgres_merge_semantics() {
    let storage = storage();
    storage.init().await.unwrap();
    storage.ping().await.unwrap();
    storage.clear().await.unwrap();
    assert!(storage.is_persistent());

    storage.update(&Metric::counter("PollCount", 2)).await.unwrap();
    storage.update(&Metric::counter("PollCount", 3)).await.unwrap();
    storage.update(&Metric::gauge("Alloc", 1.5)).await.unwrap();
    storage.update(&Metric::gauge("Alloc", 2.5)).await.unwrap();

    assert_eq!(
        storage.get("PollCount", MetricType::Counter).await.unwrap(),
        Some(Metric::counter("PollCount", 5))
    );
    assert_eq!(
        storage.get("Alloc", MetricType::Gauge).await.unwrap(),
        Some(Metric::gauge("Alloc", 2.5))
    );
    assert_eq!(storage.get("Alloc", MetricType::Counter).await.unwrap(), None);

    storage
        .update_bulk(&[
            Metric::counter("PollCount", 1),
            Metric::counter("PollCount", 1),
            Metric::gauge("Sys", 10.0),
        ])
        .await
        .unwrap();

    let mut all = storage.get_all().await.unwrap();
    sort_by_display(&mut all);
    assert_eq!(
        all,
        vec![
            Metric::counter("PollCount", 7),
            Metric::gauge("Alloc", 2.5),
            Metric::gauge("Sys", 10.0),
        ]
    );

    // A failing item rolls back the whole batch.
    let err = storage
        .update_bulk(&[Metric::counter("PollCount", 1), Metric::counter("PollCount", i64::MAX)])
        .await
        .unwrap_err();
    assert!(matches!(err, RunmonError::Validation(_)));
    assert_eq!(
        storage.get("PollCount", MetricType::Counter).await.unwrap(),
        Some(Metric::counter("PollCount", 7))
    );

    storage.clear().await.unwrap();
    assert!(storage.get_all().await.unwrap().is_empty());
    storage.close().await;
}
