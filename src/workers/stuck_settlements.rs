use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info};

use crate::database::settlement_repository::{PendingSettlement, SettlementState};
use crate::error::{AppError, AppResult};
use crate::services::settlements::SettlementService;

/// Periodically raises an alert for settlements that have not resolved
/// within the threshold, and for exhausted ones waiting on an operator.
pub struct StuckSettlementMonitor {
    settlements: Arc<SettlementService>,
    scan_interval: Duration,
    threshold: Duration,
}

impl StuckSettlementMonitor {
    pub fn new(
        settlements: Arc<SettlementService>,
        scan_interval: Duration,
        threshold: Duration,
    ) -> Self {
        Self {
            settlements,
            scan_interval,
            threshold,
        }
    }

    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval(self.scan_interval);
        info!(
            interval_secs = self.scan_interval.as_secs(),
            threshold_secs = self.threshold.as_secs(),
            "Stuck settlement monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Stuck settlement monitor stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.scan().await {
                        error!(error = %e, "Failed to scan for stuck settlements");
                    }
                }
            }
        }
    }

    /// One pass; returns how many alerts were raised.
    pub async fn scan(&self) -> AppResult<usize> {
        let stuck = self.settlements.list_stuck(self.threshold).await?;
        for settlement in &stuck {
            alert(settlement);
        }
        Ok(stuck.len())
    }
}

fn alert(settlement: &PendingSettlement) {
    let now = chrono::Utc::now();
    let age_secs = now.signed_duration_since(settlement.created_at).num_seconds();
    let idle_secs = now.signed_duration_since(settlement.updated_at).num_seconds();
    match settlement.state {
        SettlementState::Exhausted => {
            let exhausted =
                AppError::reconciliation_exhausted(&settlement.reference, settlement.attempt);
            error!(
                reference = %settlement.reference,
                error_code = ?exhausted.error_code(),
                payer_id = %settlement.payer_id,
                amount = %settlement.gross_amount,
                manual_retries = settlement.manual_retries,
                last_error = settlement.last_error.as_deref().unwrap_or(""),
                age_secs,
                "🚨 {}",
                exhausted
            )
        }
        _ => error!(
            reference = %settlement.reference,
            payer_id = %settlement.payer_id,
            amount = %settlement.gross_amount,
            state = %settlement.state,
            attempts = settlement.attempt,
            age_secs,
            idle_secs,
            "🚨 Settlement unresolved past threshold"
        ),
    }
}
