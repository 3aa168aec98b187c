//! HTTP surface of the monitor.
//!
//! | Route                            | Body      | Notes                              |
//! |----------------------------------|-----------|------------------------------------|
//! | `POST /update/:type/:id/:value`  | none      | plain text; 501 on unknown type    |
//! | `POST /update`                   | `Metrics` | signature checked when a key is set |
//! | `POST /updates`                  | `[Metrics]` | first invalid item rejects batch |
//! | `POST /value`                    | `Metrics` | JSON reply, signed when a key is set |
//! | `GET /value/:type/:id`           | none      | plain text value                   |
//! | `GET /ping`                      | none      | 500 when the dump is unreachable   |
//! | `GET /`                          | none      | sorted plain-text listing          |

use crate::core::types::sort_by_display;
use crate::core::{CorrelationId, Metric, MetricType, Result, RunmonError, CORRELATION_ID_HEADER};
use crate::monitor::MetricsMonitor;
use crate::protocol::{self, check_id, Metrics};
use crate::task::ShutdownSignal;
use axum::{
    body::Bytes,
    extract::{Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub monitor: Arc<MetricsMonitor>,
    pub key: Option<String>,
}

impl ApiState {
    pub fn new(monitor: Arc<MetricsMonitor>, key: Option<String>) -> Self {
        Self {
            monitor,
            key: key.filter(|k| !k.is_empty()),
        }
    }
}

/// Error returned by handlers, rendered as `{"error": .., "status": ..}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    NotImplemented(String),
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RunmonError> for ApiError {
    fn from(err: RunmonError) -> Self {
        match err {
            RunmonError::UnknownType(name) => {
                ApiError::NotImplemented(format!("type {} is not supported yet", name))
            },
            e if e.is_client_error() => ApiError::BadRequest(e.to_string()),
            e => {
                error!(error = %e, category = e.category(), "Request failed");
                ApiError::Internal("internal server error".to_string())
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::NotImplemented(msg)
            | ApiError::Internal(msg) => msg,
        };

        let body = Json(serde_json::json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Build the monitor router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(list_handler))
        .route("/ping", get(ping_handler))
        .route("/update", post(update_json_handler))
        .route("/updates", post(update_bulk_handler))
        .route("/update/:type/:id/:value", post(update_plain_handler))
        .route("/value", post(value_json_handler))
        .route("/value/:type/:id", get(value_plain_handler))
        .layer(middleware::from_fn(correlation_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `listener` until `signal` fires.
pub async fn serve(listener: TcpListener, app: Router, mut signal: ShutdownSignal) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("Monitor listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await?;

    info!("Monitor listener stopped");
    Ok(())
}

/// Reads or mints the correlation ID, runs the request inside a `request`
/// span carrying it and echoes it back.
async fn correlation_middleware(mut req: Request, next: Next) -> Response {
    let cid = CorrelationId::from_header(
        req.headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok()),
    );
    let span = info_span!(
        "request",
        cid = %cid,
        method = %req.method(),
        path = %req.uri().path()
    );
    req.extensions_mut().insert(cid.clone());

    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(cid.as_str()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

fn decode<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("error while decoding JSON: {}", e)))
}

fn plain_text(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

/// POST /update/:type/:id/:value
async fn update_plain_handler(
    State(state): State<ApiState>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    let kind: MetricType = kind.parse()?;
    let value = kind.parse_value(&value)?;
    let metric = Metric::new(id, value);
    metric.validate()?;

    state.monitor.update(&metric).await?;
    debug!(metric = %metric, "Plain update stored");
    Ok(StatusCode::OK)
}

/// POST /update
async fn update_json_handler(State(state): State<ApiState>, body: Bytes) -> ApiResult<StatusCode> {
    let wire: Metrics = decode(&body)?;
    wire.validate_update(state.key.as_deref()).map_err(reject)?;
    let metric = wire.to_metric().map_err(reject)?;

    state.monitor.update(&metric).await?;
    debug!(metric_id = %metric.id, metric_type = %metric.kind(), "JSON update stored");
    Ok(StatusCode::OK)
}

/// POST /updates
async fn update_bulk_handler(State(state): State<ApiState>, body: Bytes) -> ApiResult<StatusCode> {
    let batch: Vec<Metrics> = decode(&body)?;

    let mut list = Vec::with_capacity(batch.len());
    for wire in &batch {
        wire.validate_update(state.key.as_deref()).map_err(reject)?;
        list.push(wire.to_metric().map_err(reject)?);
    }

    state.monitor.update_bulk(&list).await?;
    debug!(count = list.len(), "Bulk update stored");
    Ok(StatusCode::OK)
}

/// POST /value
async fn value_json_handler(State(state): State<ApiState>, body: Bytes) -> ApiResult<Response> {
    let query: Metrics = decode(&body)?;
    check_id(&query).map_err(reject)?;
    let kind = query.metric_type()?;

    let metric = state
        .monitor
        .get(&query.id, kind)
        .await?
        .ok_or_else(|| not_found(&query.id, kind))?;

    let mut reply = Metrics::from(&metric);
    if let Some(key) = state.key.as_deref() {
        protocol::sign(&mut reply, key).map_err(reject)?;
    }
    Ok(Json(reply).into_response())
}

/// GET /value/:type/:id
async fn value_plain_handler(
    State(state): State<ApiState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let kind: MetricType = kind.parse()?;
    let metric = state
        .monitor
        .get(&id, kind)
        .await?
        .ok_or_else(|| not_found(&id, kind))?;
    Ok(plain_text(metric.value.to_string()))
}

/// GET /ping
async fn ping_handler(State(state): State<ApiState>) -> ApiResult<StatusCode> {
    state.monitor.ping().await.map_err(|e| {
        warn!(error = %e, "Storage ping failed");
        ApiError::Internal("storage is unavailable".to_string())
    })?;
    Ok(StatusCode::OK)
}

/// GET /
async fn list_handler(State(state): State<ApiState>) -> ApiResult<Response> {
    let mut list = state.monitor.get_all().await?;
    sort_by_display(&mut list);

    let mut body = String::new();
    for metric in &list {
        body.push_str(&metric.to_string());
        body.push('\n');
    }
    Ok(plain_text(body))
}

/// JSON endpoints answer every rejected payload with 400.
fn reject(err: RunmonError) -> ApiError {
    warn!(error = %err, "Payload rejected");
    ApiError::BadRequest(err.to_string())
}

fn not_found(id: &str, kind: MetricType) -> ApiError {
    ApiError::NotFound(format!("{} ({}) metric not found", id, kind))
}
