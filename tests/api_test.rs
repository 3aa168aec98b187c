//! HTTP surface of the monitor, driven through the router without a socket.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use pretty_assertions::assert_eq;
use runmon_lib::core::{Metric, MetricType, CORRELATION_ID_HEADER};
use runmon_lib::protocol::{self, Metrics};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_plain_gauge_update_and_read() {
    let monitor = memory_monitor();
    let app = app(monitor.clone(), None);

    assert_eq!(post(&app, "/update/gauge/Alloc/1.5").await.status, StatusCode::OK);
    assert_eq!(post(&app, "/update/gauge/Alloc/2.25").await.status, StatusCode::OK);

    let response = get(&app, "/value/gauge/Alloc").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "2.250");
    assert_eq!(
        monitor.get("Alloc", MetricType::Gauge).await.unwrap(),
        Some(Metric::gauge("Alloc", 2.25))
    );
}

#[tokio::test]
async fn test_plain_counter_accumulates() {
    let app = app(memory_monitor(), None);

    post(&app, "/update/counter/PollCount/5").await;
    post(&app, "/update/counter/PollCount/5").await;

    assert_eq!(get(&app, "/value/counter/PollCount").await.body, "10");
}

#[tokio::test]
async fn test_plain_update_errors() {
    let app = app(memory_monitor(), None);

    assert_eq!(post(&app, "/update/histogram/h/1").await.status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(post(&app, "/update/counter/c/1.5").await.status, StatusCode::BAD_REQUEST);
    assert_eq!(post(&app, "/update/gauge/g/abc").await.status, StatusCode::BAD_REQUEST);
    assert_eq!(post(&app, "/update/gauge/g").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_plain_read_errors() {
    let app = app(memory_monitor(), None);

    assert_eq!(get(&app, "/value/gauge/missing").await.status, StatusCode::NOT_FOUND);
    assert_eq!(get(&app, "/value/summary/x").await.status, StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_counter_and_gauge_namespaces_are_separate() {
    let app = app(memory_monitor(), None);

    post(&app, "/update/counter/x/3").await;
    post(&app, "/update/gauge/x/0.5").await;

    assert_eq!(get(&app, "/value/counter/x").await.body, "3");
    assert_eq!(get(&app, "/value/gauge/x").await.body, "0.500");
}

#[tokio::test]
async fn test_json_update_and_value() {
    let app = app(memory_monitor(), None);

    let response = post_json(&app, "/update", &json!({"id": "hits", "type": "counter", "delta": 2})).await;
    assert_eq!(response.status, StatusCode::OK);
    post_json(&app, "/update", &json!({"id": "hits", "type": "counter", "delta": 3})).await;

    let response = post_json(&app, "/value", &json!({"id": "hits", "type": "counter"})).await;
    assert_eq!(response.status, StatusCode::OK);
    let reply: Metrics = response.json();
    assert_eq!(reply, Metrics::from(&Metric::counter("hits", 5)));
}

#[tokio::test]
async fn test_json_rejections() {
    let app = app(memory_monitor(), None);

    let cases = [
        json!({"id": "", "type": "gauge", "value": 1.0}),
        json!({"id": "g", "type": "gauge"}),
        json!({"id": "c", "type": "counter", "value": 1.0}),
        json!({"id": "h", "type": "histogram", "value": 1.0}),
    ];
    for body in &cases {
        let response = post_json(&app, "/update", body).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "body: {}", body);
    }

    assert_eq!(post_raw(&app, "/update", "{not json").await.status, StatusCode::BAD_REQUEST);
    assert_eq!(post_raw(&app, "/value", "[]").await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_json_value_errors() {
    let app = app(memory_monitor(), None);

    let response = post_json(&app, "/value", &json!({"id": "nope", "type": "gauge"})).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = post_json(&app, "/value", &json!({"id": "x", "type": "summary"})).await;
    assert_eq!(response.status, StatusCode::NOT_IMPLEMENTED);

    let response = post_json(&app, "/value", &json!({"id": "", "type": "gauge"})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bulk_update_is_all_or_nothing() {
    let monitor = memory_monitor();
    let app = app(monitor.clone(), None);

    let batch = json!([
        {"id": "a", "type": "counter", "delta": 1},
        {"id": "b", "type": "gauge"},
    ]);
    assert_eq!(post_json(&app, "/updates", &batch).await.status, StatusCode::BAD_REQUEST);
    assert!(monitor.get_all().await.unwrap().is_empty());

    let batch = json!([
        {"id": "a", "type": "counter", "delta": 1},
        {"id": "a", "type": "counter", "delta": 4},
        {"id": "b", "type": "gauge", "value": 0.5},
    ]);
    assert_eq!(post_json(&app, "/updates", &batch).await.status, StatusCode::OK);
    assert_eq!(
        monitor.get("a", MetricType::Counter).await.unwrap(),
        Some(Metric::counter("a", 5))
    );
}

#[tokio::test]
async fn test_signed_updates() {
    let key = "secret";
    let app = app(memory_monitor(), Some(key));

    let mut wire = Metrics::from(&Metric::gauge("Alloc", 12.5));
    assert_eq!(post_json(&app, "/update", &wire).await.status, StatusCode::BAD_REQUEST);

    protocol::sign(&mut wire, "other").unwrap();
    assert_eq!(post_json(&app, "/update", &wire).await.status, StatusCode::BAD_REQUEST);

    protocol::sign(&mut wire, key).unwrap();
    assert_eq!(post_json(&app, "/update", &wire).await.status, StatusCode::OK);

    let response = post_json(&app, "/value", &Metrics::query("Alloc", MetricType::Gauge)).await;
    let reply: Metrics = response.json();
    assert!(reply.hash.is_some());
    protocol::verify(&reply, key).unwrap();
    assert_eq!(reply.value, Some(12.5));
}

#[tokio::test]
async fn test_unsigned_monitor_ignores_hash() {
    let app = app(memory_monitor(), None);

    let body = json!({"id": "g", "type": "gauge", "value": 1.0, "hash": "deadbeef"});
    assert_eq!(post_json(&app, "/update", &body).await.status, StatusCode::OK);

    let reply: Metrics = post_json(&app, "/value", &json!({"id": "g", "type": "gauge"})).await.json();
    assert!(reply.hash.is_none());
}

#[tokio::test]
async fn test_listing_is_sorted() {
    let app = app(memory_monitor(), None);

    post(&app, "/update/gauge/b/2").await;
    post(&app, "/update/gauge/a/1").await;
    post(&app, "/update/counter/z/7").await;

    let response = get(&app, "/").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "counter/z/7\ngauge/a/1.000\ngauge/b/2.000\n");
}

#[tokio::test]
async fn test_ping() {
    let app = app(memory_monitor(), None);
    assert_eq!(get(&app, "/ping").await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_correlation_id_is_echoed() {
    let app = app(memory_monitor(), None);

    let request = Request::post("/update/counter/c/1")
        .header(CORRELATION_ID_HEADER, "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.headers.get(CORRELATION_ID_HEADER).unwrap(), "abc-123");

    let response = get(&app, "/ping").await;
    let minted = response.headers.get(CORRELATION_ID_HEADER).unwrap().to_str().unwrap();
    assert!(!minted.is_empty());
}

#[tokio::test]
async fn test_error_body_shape() {
    let app = app(memory_monitor(), None);

    let response = get(&app, "/value/gauge/missing").await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], 404);
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_non_finite_gauge_leaves_dump_intact() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.json");
    let app = app(file_monitor(&path, Duration::ZERO, false), None);

    assert_eq!(post(&app, "/update/counter/hits/5").await.status, StatusCode::OK);
    let before = tokio::fs::read_to_string(&path).await.unwrap();

    for uri in ["/update/gauge/bad/NaN", "/update/gauge/bad/inf", "/update/gauge/bad/-Infinity"] {
        assert_eq!(post(&app, uri).await.status, StatusCode::BAD_REQUEST, "{}", uri);
    }
    let response = post_raw(&app, "/update", r#"{"id":"bad","type":"gauge","value":1e999}"#).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), before);
    assert_eq!(get(&app, "/value/gauge/bad").await.status, StatusCode::NOT_FOUND);

    assert_eq!(post(&app, "/update/counter/hits/1").await.status, StatusCode::OK);
    assert_eq!(get(&app, "/value/counter/hits").await.body, "6");
}
