//! Buffered reporting of sampled metrics.
//!
//! Samplers publish into a bounded queue; the reporter drains it on every
//! report tick. Publishing waits while the queue is full. A drain takes at
//! most the number of events queued when it starts.
//!
//! Delivery is at least once at best. In single mode the drain stops at the
//! first failed send; events already taken from the queue are dropped and
//! the rest wait for the next tick. In bulk mode a failed batch is dropped
//! as a whole.

use super::client::MonitorClient;
use crate::core::{CorrelationId, Metric, Result, RunmonError};
use crate::task::{ShutdownSignal, Task};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, trace, warn};

/// A queued metric with the correlation ID assigned at publish time.
#[derive(Debug, Clone)]
pub struct MetricEvent {
    pub metric: Metric,
    pub cid: CorrelationId,
}

/// Cloneable producer side of the queue.
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<MetricEvent>,
}

impl EventPublisher {
    /// Enqueue `metric`, waiting while the queue is full.
    pub async fn publish(&self, metric: Metric) -> Result<CorrelationId> {
        let cid = CorrelationId::new();
        trace!(cid = %cid, metric_id = %metric.id, metric_type = %metric.kind(), "Publishing");
        self.tx
            .send(MetricEvent {
                metric,
                cid: cid.clone(),
            })
            .await
            .map_err(|_| RunmonError::ChannelClosed)?;
        Ok(cid)
    }

    /// Like [`publish`](Self::publish), but gives up with
    /// [`RunmonError::Cancelled`] once `signal` fires.
    pub async fn publish_until(
        &self,
        metric: Metric,
        signal: &mut ShutdownSignal,
    ) -> Result<CorrelationId> {
        if signal.is_cancelled() {
            return Err(RunmonError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = signal.cancelled() => Err(RunmonError::Cancelled),
            published = self.publish(metric) => published,
        }
    }

    /// Events currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Drains the queue towards the monitor.
pub struct Reporter {
    publisher: EventPublisher,
    rx: Mutex<mpsc::Receiver<MetricEvent>>,
    client: Arc<dyn MonitorClient>,
    bulk: bool,
}

impl Reporter {
    pub fn new(client: Arc<dyn MonitorClient>, capacity: usize, bulk: bool) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            publisher: EventPublisher { tx },
            rx: Mutex::new(rx),
            client,
            bulk,
        }
    }

    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    pub async fn publish(&self, metric: Metric) -> Result<CorrelationId> {
        self.publisher.publish(metric).await
    }

    /// Drain the events queued right now and send them. Returns how many
    /// were delivered.
    pub async fn report(&self) -> Result<usize> {
        let mut rx = self.rx.lock().await;
        let pending = rx.len();
        if pending == 0 {
            return Ok(0);
        }

        if self.bulk {
            self.send_bulk(&mut rx, pending).await
        } else {
            self.send_each(&mut rx, pending).await
        }
    }

    async fn send_each(&self, rx: &mut mpsc::Receiver<MetricEvent>, pending: usize) -> Result<usize> {
        let mut sent = 0;
        for _ in 0..pending {
            let Ok(event) = rx.try_recv() else { break };
            if let Err(e) = self.client.update(&event.metric, &event.cid).await {
                warn!(
                    cid = %event.cid,
                    metric_id = %event.metric.id,
                    error = %e,
                    sent,
                    left = pending - sent - 1,
                    "Report aborted"
                );
                return Err(e);
            }
            sent += 1;
        }
        debug!(sent, "Metrics reported");
        Ok(sent)
    }

    async fn send_bulk(&self, rx: &mut mpsc::Receiver<MetricEvent>, pending: usize) -> Result<usize> {
        let mut events = Vec::with_capacity(pending);
        while events.len() < pending {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        let Some(first) = events.first() else {
            return Ok(0);
        };

        let cid = first.cid.clone();
        for event in &events[1..] {
            debug!(batch_cid = %cid, cid = %event.cid, metric_id = %event.metric.id, "Batched");
        }

        let list: Vec<Metric> = events.into_iter().map(|e| e.metric).collect();
        if let Err(e) = self.client.update_bulk(&list, &cid).await {
            warn!(cid = %cid, dropped = list.len(), error = %e, "Batch report failed");
            return Err(e);
        }
        debug!(cid = %cid, sent = list.len(), "Metrics batch reported");
        Ok(list.len())
    }
}

#[async_trait::async_trait]
impl Task for Reporter {
    fn name(&self) -> &str {
        "reporter"
    }

    async fn run(&self) -> Result<()> {
        self.report().await.map(|_| ())
    }

    async fn teardown(&self) {
        match self.report().await {
            Ok(sent) => info!(sent, "Final report flushed"),
            Err(e) => warn!(error = %e, "Final report failed"),
        }
    }
}
