//! Operator view of push-payment settlements.

use crate::database::repository::SettlementRepository;
use crate::database::settlement_repository::{PendingSettlement, SettlementState};
use crate::error::{AppError, AppResult, DomainError};
use crate::services::ledger::{settlement_key, OwnerLocks};
use crate::workers::settlement_queue::{SettlementJob, SettlementQueue};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct SettlementService {
    settlements: Arc<dyn SettlementRepository>,
    queue: Arc<dyn SettlementQueue>,
    locks: Arc<OwnerLocks>,
    stuck_threshold: Duration,
}

impl SettlementService {
    pub fn new(
        settlements: Arc<dyn SettlementRepository>,
        queue: Arc<dyn SettlementQueue>,
        locks: Arc<OwnerLocks>,
        stuck_threshold: Duration,
    ) -> Self {
        Self {
            settlements,
            queue,
            locks,
            stuck_threshold,
        }
    }

    pub fn stuck_threshold(&self) -> Duration {
        self.stuck_threshold
    }

    pub async fn settlement_status(&self, reference: &str) -> AppResult<PendingSettlement> {
        self.settlements.find(reference).await?.ok_or_else(|| {
            AppError::domain(DomainError::SettlementNotFound {
                reference: reference.to_string(),
            })
        })
    }

    /// Live settlements with no progress for `threshold` plus every
    /// exhausted one.
    pub async fn list_stuck(&self, threshold: Duration) -> AppResult<Vec<PendingSettlement>> {
        let threshold = chrono::Duration::from_std(threshold)
            .map_err(|e| AppError::internal(format!("invalid stuck threshold: {}", e)))?;
        Ok(self.settlements.list_stuck(Utc::now() - threshold).await?)
    }

    /// Hands an exhausted settlement back to the worker with a fresh poll
    /// budget. Any other state is rejected.
    pub async fn retry_exhausted(&self, reference: &str) -> AppResult<PendingSettlement> {
        let _guard = self.locks.acquire([settlement_key(reference)]).await;

        let current = self.settlement_status(reference).await?;
        if current.state != SettlementState::Exhausted {
            return Err(AppError::domain(DomainError::InvalidSettlementState {
                reference: reference.to_string(),
                state: current.state.to_string(),
            }));
        }

        let restarted = self
            .settlements
            .restart_exhausted(reference)
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::InvalidSettlementState {
                    reference: reference.to_string(),
                    state: current.state.to_string(),
                })
            })?;

        if let Err(e) = self
            .queue
            .schedule(SettlementJob::new(reference, restarted.attempt), Duration::ZERO)
            .await
        {
            // The row is live again; startup recovery will pick it up.
            error!(reference = %reference, error = %e, "failed to enqueue manual retry");
        }

        info!(
            reference = %reference,
            manual_retries = restarted.manual_retries,
            "Settlement handed back to reconciliation"
        );
        Ok(restarted)
    }
}
