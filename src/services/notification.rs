use crate::database::settlement_repository::{PendingSettlement, SettlementState};
use async_trait::async_trait;
use tracing::{error, info, warn};

/// Called once per settlement when it reaches a resolved state.
#[async_trait]
pub trait SettlementNotifier: Send + Sync {
    async fn settlement_resolved(&self, settlement: &PendingSettlement);
}

/// Emits a structured log event; message delivery lives elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SettlementNotifier for LogNotifier {
    async fn settlement_resolved(&self, settlement: &PendingSettlement) {
        match settlement.state {
            SettlementState::Confirmed => {
                info!(
                    reference = %settlement.reference,
                    payer_id = %settlement.payer_id,
                    purpose = settlement.purpose.as_str(),
                    amount = %settlement.gross_amount,
                    "🔔 NOTIFICATION: Payment confirmed"
                );
            }
            SettlementState::Failed => {
                warn!(
                    reference = %settlement.reference,
                    payer_id = %settlement.payer_id,
                    purpose = settlement.purpose.as_str(),
                    "🔔 NOTIFICATION: Payment failed"
                );
            }
            SettlementState::Exhausted => {
                error!(
                    reference = %settlement.reference,
                    payer_id = %settlement.payer_id,
                    attempts = settlement.attempt,
                    last_error = settlement.last_error.as_deref().unwrap_or(""),
                    "🔔 NOTIFICATION: Payment unconfirmed, needs review"
                );
            }
            SettlementState::Initiated | SettlementState::Polling => {}
        }
    }
}
