//! Common test utilities and fixtures.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use runmon_lib::api::{self, ApiState};
use runmon_lib::core::config::StorageConfig;
use runmon_lib::monitor::MetricsMonitor;
use runmon_lib::storage::{FileStorage, MemoryStorage, MetricStorage, Storages};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Storage settings with nothing touching the filesystem.
pub fn memory_config() -> StorageConfig {
    StorageConfig {
        store_file: None,
        restore: false,
        ..StorageConfig::default()
    }
}

/// Monitor over memory storage, no dump target.
pub fn memory_monitor() -> Arc<MetricsMonitor> {
    let storages = Storages {
        live: Arc::new(MemoryStorage::new()),
        dump: None,
    };
    Arc::new(MetricsMonitor::new(storages, &memory_config()))
}

/// Monitor over memory storage dumping to `path`.
pub fn file_monitor(path: &Path, store_interval: Duration, restore: bool) -> Arc<MetricsMonitor> {
    let config = StorageConfig {
        store_file: Some(path.to_path_buf()),
        store_interval,
        restore,
        ..StorageConfig::default()
    };
    let storages = Storages {
        live: Arc::new(MemoryStorage::new()),
        dump: Some(Arc::new(FileStorage::new(path)) as Arc<dyn MetricStorage>),
    };
    Arc::new(MetricsMonitor::new(storages, &config))
}

pub fn app(monitor: Arc<MetricsMonitor>, key: Option<&str>) -> Router {
    api::router(ApiState::new(monitor, key.map(str::to_string)))
}

/// Response parts that tests look at.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_str(&self.body).unwrap()
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    TestResponse {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

pub async fn post(app: &Router, uri: &str) -> TestResponse {
    let request = Request::post(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn get(app: &Router, uri: &str) -> TestResponse {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn post_json<T: serde::Serialize + ?Sized>(app: &Router, uri: &str, body: &T) -> TestResponse {
    post_raw(app, uri, serde_json::to_string(body).unwrap()).await
}

pub async fn post_raw(app: &Router, uri: &str, body: impl Into<String>) -> TestResponse {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.into()))
        .unwrap();
    send(app, request).await
}
