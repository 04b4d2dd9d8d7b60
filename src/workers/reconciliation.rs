use crate::database::error::DatabaseError;
use crate::database::posting_repository::{Confirmation, ConfirmationOutcome};
use crate::database::rent_payment_repository::{NewRentPayment, PaymentChannel};
use crate::database::repository::{PostingRepository, SettlementRepository, TenantDirectory};
use crate::database::settlement_repository::{
    PendingSettlement, SettlementState, SettlementUpdate,
};
use crate::error::AppError;
use crate::payments::provider::PushPaymentProvider;
use crate::payments::types::{ConfirmationRequest, GatewayStatus};
use crate::services::ledger::{settlement_key, tenant_key, wallet_key, OwnerLocks};
use crate::services::notification::SettlementNotifier;
use crate::services::rent_allocator::RentAllocator;
use crate::workers::settlement_queue::{QueueError, SettlementJob, SettlementQueue};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed delay between polls that did not return a final answer.
    pub backoff: Duration,
    /// Total polls before a settlement is marked exhausted.
    pub max_attempts: u32,
    /// Delay before the first poll after initiation.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(60),
            max_attempts: 5,
            initial_delay: Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// What one poll of the gateway told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Success,
    Failed,
    /// Pending, unreachable or an answer we do not recognize.
    Inconclusive(String),
}

impl PollOutcome {
    pub fn from_status(status: GatewayStatus) -> Self {
        match status {
            GatewayStatus::Success => PollOutcome::Success,
            GatewayStatus::Failed => PollOutcome::Failed,
            GatewayStatus::Pending => PollOutcome::Inconclusive("pending".to_string()),
            GatewayStatus::Unknown(raw) => {
                PollOutcome::Inconclusive(format!("unrecognized gateway status '{}'", raw))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Confirm { attempt: u32 },
    Fail { attempt: u32 },
    Reschedule { attempt: u32, delay: Duration, reason: String },
    Exhaust { attempt: u32, reason: String },
    /// The settlement is already resolved; nothing may change.
    Ignore,
}

/// Pure transition function. `attempt` is the number of polls already
/// recorded; the poll being evaluated is number `attempt + 1`.
pub fn next_transition(
    state: SettlementState,
    attempt: u32,
    outcome: PollOutcome,
    policy: &RetryPolicy,
) -> Transition {
    if state.is_resolved() {
        return Transition::Ignore;
    }

    let polled = attempt.saturating_add(1);
    match outcome {
        PollOutcome::Success => Transition::Confirm { attempt: polled },
        PollOutcome::Failed => Transition::Fail { attempt: polled },
        PollOutcome::Inconclusive(reason) if polled >= policy.max_attempts => {
            Transition::Exhaust {
                attempt: polled,
                reason,
            }
        }
        PollOutcome::Inconclusive(reason) => Transition::Reschedule {
            attempt: polled,
            delay: policy.backoff,
            reason,
        },
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Confirmed,
    Failed,
    Rescheduled { attempt: u32 },
    Exhausted,
    /// The reference was already resolved when the job ran.
    Duplicate,
    /// The job was scheduled against an attempt that is no longer current.
    Stale,
    Missing,
}

pub struct ReconciliationWorker {
    settlements: Arc<dyn SettlementRepository>,
    postings: Arc<dyn PostingRepository>,
    tenants: Arc<dyn TenantDirectory>,
    allocator: Arc<RentAllocator>,
    gateway: Arc<dyn PushPaymentProvider>,
    queue: Arc<dyn SettlementQueue>,
    notifier: Arc<dyn SettlementNotifier>,
    locks: Arc<OwnerLocks>,
    policy: RetryPolicy,
}

impl ReconciliationWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settlements: Arc<dyn SettlementRepository>,
        postings: Arc<dyn PostingRepository>,
        tenants: Arc<dyn TenantDirectory>,
        allocator: Arc<RentAllocator>,
        gateway: Arc<dyn PushPaymentProvider>,
        queue: Arc<dyn SettlementQueue>,
        notifier: Arc<dyn SettlementNotifier>,
        locks: Arc<OwnerLocks>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            settlements,
            postings,
            tenants,
            allocator,
            gateway,
            queue,
            notifier,
            locks,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run(
        self: Arc<Self>,
        mut jobs: mpsc::UnboundedReceiver<SettlementJob>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!(
            backoff_secs = self.policy.backoff.as_secs(),
            max_attempts = self.policy.max_attempts,
            "settlement reconciliation worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("settlement reconciliation worker stopping");
                        break;
                    }
                }
                job = jobs.recv() => {
                    let Some(job) = job else {
                        info!("settlement queue closed");
                        break;
                    };
                    let worker = self.clone();
                    tokio::spawn(async move { worker.handle(job).await });
                }
            }
        }

        info!("settlement reconciliation worker stopped");
    }

    /// Runs one job; infrastructure errors put the same job back after the
    /// backoff so a database blip never drops a settlement.
    pub async fn handle(&self, job: SettlementJob) {
        match self.process(job.clone()).await {
            Ok(outcome) => {
                debug!(reference = %job.reference, outcome = ?outcome, "settlement job done");
            }
            Err(e) => {
                warn!(
                    reference = %job.reference,
                    attempt = job.attempt,
                    error = %e,
                    "settlement job failed, retrying after backoff"
                );
                if let Err(e) = self.queue.schedule(job.clone(), self.policy.backoff).await {
                    error!(reference = %job.reference, error = %e, "could not requeue settlement job");
                }
            }
        }
    }

    pub async fn process(&self, job: SettlementJob) -> Result<JobOutcome, ReconciliationError> {
        let _guard = self.locks.acquire([settlement_key(&job.reference)]).await;

        let Some(settlement) = self.settlements.find(&job.reference).await? else {
            warn!(reference = %job.reference, "settlement job for unknown reference");
            return Ok(JobOutcome::Missing);
        };

        if settlement.state.is_resolved() {
            let duplicate = AppError::duplicate_settlement(&job.reference);
            info!(
                reference = %job.reference,
                state = %settlement.state,
                error_code = ?duplicate.error_code(),
                "{}; ignoring job",
                duplicate
            );
            return Ok(JobOutcome::Duplicate);
        }
        if settlement.attempt != job.attempt {
            debug!(
                reference = %job.reference,
                job_attempt = job.attempt,
                current_attempt = settlement.attempt,
                "dropping stale settlement job"
            );
            return Ok(JobOutcome::Stale);
        }

        let outcome = self.poll(&settlement.reference).await;
        let transition = next_transition(settlement.state, settlement.attempt, outcome, &self.policy);

        match transition {
            Transition::Confirm { attempt } => self.confirm(&settlement, attempt).await,
            Transition::Fail { attempt } => {
                let update = SettlementUpdate {
                    state: SettlementState::Failed,
                    attempt,
                    last_error: Some("gateway reported the payment as failed".to_string()),
                };
                self.resolve(&settlement, update, JobOutcome::Failed).await
            }
            Transition::Exhaust { attempt, reason } => {
                let update = SettlementUpdate {
                    state: SettlementState::Exhausted,
                    attempt,
                    last_error: Some(reason),
                };
                self.resolve(&settlement, update, JobOutcome::Exhausted).await
            }
            Transition::Reschedule {
                attempt,
                delay,
                reason,
            } => {
                let update = SettlementUpdate {
                    state: SettlementState::Polling,
                    attempt,
                    last_error: Some(reason),
                };
                if self
                    .settlements
                    .transition(&settlement.reference, settlement.attempt, update)
                    .await?
                    .is_none()
                {
                    return Ok(JobOutcome::Stale);
                }
                self.queue
                    .schedule(SettlementJob::new(&settlement.reference, attempt), delay)
                    .await?;
                debug!(
                    reference = %settlement.reference,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "settlement still pending, rescheduled"
                );
                Ok(JobOutcome::Rescheduled { attempt })
            }
            Transition::Ignore => Ok(JobOutcome::Duplicate),
        }
    }

    async fn poll(&self, reference: &str) -> PollOutcome {
        match self
            .gateway
            .confirm(ConfirmationRequest {
                reference: reference.to_string(),
            })
            .await
        {
            Ok(response) => PollOutcome::from_status(response.status),
            Err(e) => {
                warn!(reference = %reference, error = %e, "gateway poll failed");
                PollOutcome::Inconclusive(e.to_string())
            }
        }
    }

    async fn resolve(
        &self,
        settlement: &PendingSettlement,
        update: SettlementUpdate,
        outcome: JobOutcome,
    ) -> Result<JobOutcome, ReconciliationError> {
        match self
            .settlements
            .transition(&settlement.reference, settlement.attempt, update)
            .await?
        {
            Some(resolved) => {
                if resolved.state == SettlementState::Exhausted {
                    let exhausted =
                        AppError::reconciliation_exhausted(&resolved.reference, resolved.attempt);
                    error!(
                        reference = %resolved.reference,
                        error_code = ?exhausted.error_code(),
                        last_error = resolved.last_error.as_deref().unwrap_or(""),
                        "{}",
                        exhausted
                    );
                } else {
                    info!(
                        reference = %resolved.reference,
                        state = %resolved.state,
                        attempt = resolved.attempt,
                        "settlement resolved"
                    );
                }
                self.notifier.settlement_resolved(&resolved).await;
                Ok(outcome)
            }
            None => Ok(JobOutcome::Stale),
        }
    }

    async fn confirm(
        &self,
        settlement: &PendingSettlement,
        attempt: u32,
    ) -> Result<JobOutcome, ReconciliationError> {
        let confirmation = match &settlement.rent {
            None => Confirmation {
                reference: settlement.reference.clone(),
                expected_attempt: settlement.attempt,
                attempt,
                credit_owner_id: settlement.payer_id.clone(),
                credit_amount: settlement.gross_amount,
                rent_payment: None,
            },
            Some(rent) => {
                let _guard = self
                    .locks
                    .acquire([tenant_key(rent.tenant_id), wallet_key(&rent.landlord_owner_id)])
                    .await;

                let Some(tenant) = self.tenants.find_tenant(rent.tenant_id).await? else {
                    error!(
                        reference = %settlement.reference,
                        tenant_id = rent.tenant_id,
                        "confirmed rent payment for a tenant that no longer exists"
                    );
                    let update = SettlementUpdate {
                        state: SettlementState::Exhausted,
                        attempt,
                        last_error: Some(format!(
                            "gateway confirmed payment but tenant {} was not found",
                            rent.tenant_id
                        )),
                    };
                    return self.resolve(settlement, update, JobOutcome::Exhausted).await;
                };

                let today = Utc::now().date_naive();
                let month = self.allocator.allocate_for(&tenant, today).await?;
                let confirmation = Confirmation {
                    reference: settlement.reference.clone(),
                    expected_attempt: settlement.attempt,
                    attempt,
                    credit_owner_id: rent.landlord_owner_id.clone(),
                    credit_amount: rent.net_landlord_amount,
                    rent_payment: Some(NewRentPayment {
                        tenant_id: rent.tenant_id,
                        landlord_id: rent.landlord_id,
                        amount: settlement.gross_amount,
                        service_fee: rent.service_fee,
                        landlord_amount: rent.net_landlord_amount,
                        method: PaymentChannel::GatewayPush,
                        external_reference: Some(settlement.reference.clone()),
                        payment_date: today,
                        month,
                    }),
                };
                return self.commit(confirmation).await;
            }
        };

        let _guard = self.locks.acquire([wallet_key(&settlement.payer_id)]).await;
        self.commit(confirmation).await
    }

    async fn commit(&self, confirmation: Confirmation) -> Result<JobOutcome, ReconciliationError> {
        let reference = confirmation.reference.clone();
        match self.postings.commit_confirmation(confirmation).await? {
            ConfirmationOutcome::Applied {
                settlement,
                wallet,
                payment,
            } => {
                info!(
                    reference = %reference,
                    owner_id = %wallet.owner_id,
                    amount_minor = settlement.gross_amount.minor(),
                    balance_minor = wallet.balance.minor(),
                    rent_month = payment.as_ref().map(|p| p.month.to_string()).unwrap_or_default(),
                    "✅ Settlement confirmed"
                );
                self.notifier.settlement_resolved(&settlement).await;
                Ok(JobOutcome::Confirmed)
            }
            ConfirmationOutcome::AlreadyResolved => {
                let duplicate = AppError::duplicate_settlement(&reference);
                info!(
                    reference = %reference,
                    error_code = ?duplicate.error_code(),
                    "{}; confirmation already applied",
                    duplicate
                );
                Ok(JobOutcome::Duplicate)
            }
        }
    }

    /// Re-enqueues every live settlement. Called once at startup.
    pub async fn recover_live(&self) -> Result<usize, ReconciliationError> {
        let live = self.settlements.list_live().await?;
        for settlement in &live {
            self.queue
                .schedule(
                    SettlementJob::new(&settlement.reference, settlement.attempt),
                    self.policy.initial_delay,
                )
                .await?;
        }
        if !live.is_empty() {
            info!(count = live.len(), "recovered live settlements");
        }
        Ok(live.len())
    }
}
