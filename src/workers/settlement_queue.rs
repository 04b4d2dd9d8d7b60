//! Delayed job delivery for the reconciliation worker.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Immutable poll request. `attempt` is the persisted attempt counter the job
/// was scheduled against; a mismatch on delivery means the job is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementJob {
    pub reference: String,
    pub attempt: u32,
}

impl SettlementJob {
    pub fn new(reference: impl Into<String>, attempt: u32) -> Self {
        Self {
            reference: reference.into(),
            attempt,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("settlement queue is closed")]
    Closed,
}

#[async_trait]
pub trait SettlementQueue: Send + Sync {
    /// Deliver `job` to the worker after `delay`.
    async fn schedule(&self, job: SettlementJob, delay: Duration) -> Result<(), QueueError>;
}

/// Channel-backed queue; each delayed job sleeps in its own task.
#[derive(Clone)]
pub struct TokioSettlementQueue {
    tx: mpsc::UnboundedSender<SettlementJob>,
}

impl TokioSettlementQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SettlementJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SettlementQueue for TokioSettlementQueue {
    async fn schedule(&self, job: SettlementJob, delay: Duration) -> Result<(), QueueError> {
        if self.tx.is_closed() {
            return Err(QueueError::Closed);
        }
        if delay.is_zero() {
            return self.tx.send(job).map_err(|_| QueueError::Closed);
        }

        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = tx.send(job) {
                // Row stays live in storage; startup recovery picks it up.
                warn!(reference = %e.0.reference, "worker gone, dropping delayed settlement job");
            }
        });
        Ok(())
    }
}
