//! HTTP client for the monitor.

use crate::core::{
    Config, CorrelationId, Metric, MetricType, MetricValue, ReportProtocol, Result, RunmonError,
    CORRELATION_ID_HEADER,
};
use crate::protocol::{self, Metrics};
use reqwest::{StatusCode, Url};
use tracing::{debug, trace};

/// Remote side the reporter transmits to.
#[async_trait::async_trait]
pub trait MonitorClient: Send + Sync {
    /// Send a single metric.
    async fn update(&self, metric: &Metric, cid: &CorrelationId) -> Result<()>;

    /// Send a batch in one call where the protocol allows it.
    async fn update_bulk(&self, list: &[Metric], cid: &CorrelationId) -> Result<()>;

    /// Read a metric back. `None` when the monitor doesn't know it.
    async fn value(&self, id: &str, kind: MetricType) -> Result<Option<MetricValue>>;
}

/// `reqwest` client speaking either the plain-text or the JSON protocol.
#[derive(Debug, Clone)]
pub struct HttpMonitorClient {
    http: reqwest::Client,
    base: Url,
    protocol: ReportProtocol,
    key: Option<String>,
}

impl HttpMonitorClient {
    pub fn new(base_url: &str, protocol: ReportProtocol, key: Option<String>) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), base_url, protocol, key)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.agent.client_timeout)
            .build()?;
        Self::with_client(
            http,
            &config.monitor_url(),
            config.agent.protocol,
            config.signing_key().map(str::to_string),
        )
    }

    fn with_client(
        http: reqwest::Client,
        base_url: &str,
        protocol: ReportProtocol,
        key: Option<String>,
    ) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| RunmonError::config(format!("invalid monitor url '{}': {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(RunmonError::config(format!("invalid monitor url '{}'", base_url)));
        }
        Ok(Self {
            http,
            base,
            protocol,
            key: key.filter(|k| !k.is_empty()),
        })
    }

    pub fn protocol(&self) -> ReportProtocol {
        self.protocol
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| RunmonError::config(format!("invalid monitor url '{}'", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn signed(&self, metric: &Metric) -> Result<Metrics> {
        let mut wire = Metrics::from(metric);
        if let Some(key) = self.key.as_deref() {
            protocol::sign(&mut wire, key)?;
        }
        Ok(wire)
    }

    async fn post_plain(&self, metric: &Metric, cid: &CorrelationId) -> Result<()> {
        let value = metric.value.to_string();
        let url = self.url(&["update", metric.kind().as_str(), &metric.id, &value])?;
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .header(CORRELATION_ID_HEADER, cid.as_str())
            .send()
            .await?;
        ensure_ok(response).await.map(|_| ())
    }

    async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        cid: &CorrelationId,
    ) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(self.url(&[path])?)
            .header(CORRELATION_ID_HEADER, cid.as_str())
            .json(body)
            .send()
            .await?;
        ensure_ok(response).await
    }
}

async fn ensure_ok(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RunmonError::transport(format!(
        "monitor replied {}: {}",
        status,
        body.trim()
    )))
}

#[async_trait::async_trait]
impl MonitorClient for HttpMonitorClient {
    async fn update(&self, metric: &Metric, cid: &CorrelationId) -> Result<()> {
        trace!(cid = %cid, metric = %metric, "Sending update");
        match self.protocol {
            ReportProtocol::Plain => self.post_plain(metric, cid).await,
            ReportProtocol::Json => {
                let body = self.signed(metric)?;
                self.post_json("update", &body, cid).await.map(|_| ())
            },
        }
    }

    async fn update_bulk(&self, list: &[Metric], cid: &CorrelationId) -> Result<()> {
        match self.protocol {
            // No batch endpoint in the plain protocol.
            ReportProtocol::Plain => {
                for metric in list {
                    self.post_plain(metric, cid).await?;
                }
                Ok(())
            },
            ReportProtocol::Json => {
                let body = list.iter().map(|m| self.signed(m)).collect::<Result<Vec<_>>>()?;
                self.post_json("updates", &body, cid).await?;
                debug!(cid = %cid, count = list.len(), "Batch sent");
                Ok(())
            },
        }
    }

    async fn value(&self, id: &str, kind: MetricType) -> Result<Option<MetricValue>> {
        let cid = CorrelationId::new();
        let response = match self.protocol {
            ReportProtocol::Plain => {
                self.http
                    .get(self.url(&["value", kind.as_str(), id])?)
                    .header(CORRELATION_ID_HEADER, cid.as_str())
                    .send()
                    .await?
            },
            ReportProtocol::Json => {
                self.http
                    .post(self.url(&["value"])?)
                    .header(CORRELATION_ID_HEADER, cid.as_str())
                    .json(&Metrics::query(id, kind))
                    .send()
                    .await?
            },
        };
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_ok(response).await?;

        match self.protocol {
            ReportProtocol::Plain => {
                let text = response.text().await?;
                kind.parse_value(text.trim()).map(Some)
            },
            ReportProtocol::Json => {
                let reply: Metrics = response.json().await?;
                if let Some(key) = self.key.as_deref() {
                    protocol::verify(&reply, key)?;
                }
                Ok(Some(reply.to_metric()?.value))
            },
        }
    }
}
