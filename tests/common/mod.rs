//! Shared fixtures: a scripted gateway, a recording queue and an in-memory
//! harness wired the same way the binary wires Postgres.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use rentwallet_backend::app::{Components, ServiceSettings, Stores};
use rentwallet_backend::database::memory::InMemoryStore;
use rentwallet_backend::database::settlement_repository::{PendingSettlement, SettlementState};
use rentwallet_backend::database::tenant_repository::{LandlordRef, TenantProfile};
use rentwallet_backend::payments::error::{PaymentError, PaymentResult};
use rentwallet_backend::payments::provider::PushPaymentProvider;
use rentwallet_backend::payments::types::{
    ConfirmationRequest, ConfirmationResponse, GatewayStatus, ProviderName, PushRequest,
    PushResponse,
};
use rentwallet_backend::services::notification::SettlementNotifier;
use rentwallet_backend::workers::reconciliation::JobOutcome;
use rentwallet_backend::workers::settlement_queue::{QueueError, SettlementJob, SettlementQueue};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TENANT_ID: i64 = 7;
pub const TENANT_USER: &str = "tenant-user";
pub const LANDLORD_ID: i64 = 3;
pub const LANDLORD_USER: &str = "landlord-user";
pub const PHONE: &str = "0712345678";

/// Gateway whose confirmation answers are queued up front. Once the script
/// runs out every poll answers `pending`.
#[derive(Default)]
pub struct ScriptedGateway {
    confirmations: Mutex<VecDeque<PaymentResult<GatewayStatus>>>,
    initiations: Mutex<Vec<PushRequest>>,
    reject_initiation: Mutex<Option<PaymentError>>,
    polls: AtomicUsize,
    next_reference: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script<I>(&self, statuses: I)
    where
        I: IntoIterator<Item = GatewayStatus>,
    {
        let mut queue = self.confirmations.lock().unwrap();
        queue.extend(statuses.into_iter().map(Ok));
    }

    pub fn script_error(&self, error: PaymentError) {
        self.confirmations.lock().unwrap().push_back(Err(error));
    }

    pub fn fail_initiation_with(&self, error: PaymentError) {
        *self.reject_initiation.lock().unwrap() = Some(error);
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn initiations(&self) -> Vec<PushRequest> {
        self.initiations.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushPaymentProvider for ScriptedGateway {
    async fn initiate_push(&self, request: PushRequest) -> PaymentResult<PushResponse> {
        if let Some(error) = self.reject_initiation.lock().unwrap().clone() {
            return Err(error);
        }
        self.initiations.lock().unwrap().push(request);
        let n = self.next_reference.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PushResponse {
            reference: format!("ws_CO_{:04}", n),
        })
    }

    async fn confirm(&self, _request: ConfirmationRequest) -> PaymentResult<ConfirmationResponse> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.confirmations.lock().unwrap().pop_front();
        match next {
            Some(Ok(status)) => Ok(ConfirmationResponse { status }),
            Some(Err(error)) => Err(error),
            None => Ok(ConfirmationResponse {
                status: GatewayStatus::Pending,
            }),
        }
    }

    fn name(&self) -> ProviderName {
        ProviderName::Mpesa
    }
}

/// Queue that records scheduled jobs instead of delivering them; tests pop
/// and run them by hand.
#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<VecDeque<(SettlementJob, Duration)>>,
}

impl RecordingQueue {
    pub fn pop(&self) -> Option<(SettlementJob, Duration)> {
        self.jobs.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

#[async_trait]
impl SettlementQueue for RecordingQueue {
    async fn schedule(&self, job: SettlementJob, delay: Duration) -> Result<(), QueueError> {
        self.jobs.lock().unwrap().push_back((job, delay));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    resolved: Mutex<Vec<(String, SettlementState)>>,
}

impl RecordingNotifier {
    pub fn resolved(&self) -> Vec<(String, SettlementState)> {
        self.resolved.lock().unwrap().clone()
    }
}

#[async_trait]
impl SettlementNotifier for RecordingNotifier {
    async fn settlement_resolved(&self, settlement: &PendingSettlement) {
        self.resolved
            .lock()
            .unwrap()
            .push((settlement.reference.clone(), settlement.state));
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub queue: Arc<RecordingQueue>,
    pub notifier: Arc<RecordingNotifier>,
    pub components: Components,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(ScriptedGateway::new());
        let queue = Arc::new(RecordingQueue::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let components = Components::build(
            &Stores::in_memory(store.clone()),
            gateway.clone(),
            queue.clone(),
            notifier.clone(),
            ServiceSettings::default(),
        );
        Self {
            store,
            gateway,
            queue,
            notifier,
            components,
        }
    }

    /// Harness with the standard tenant and landlord registered.
    pub fn with_tenant(joined_on: NaiveDate) -> Self {
        let harness = Self::new();
        harness
            .store
            .add_tenant(TenantProfile {
                tenant_id: TENANT_ID,
                user_id: TENANT_USER.to_string(),
                joined_on,
                landlord: Some(LandlordRef {
                    landlord_id: LANDLORD_ID,
                    user_id: LANDLORD_USER.to_string(),
                }),
            })
            .unwrap();
        harness
    }

    /// Pops the next scheduled job and runs it through the worker.
    pub async fn run_next_job(&self) -> Option<JobOutcome> {
        let (job, _delay) = self.queue.pop()?;
        Some(self.components.worker.process(job).await.unwrap())
    }

    /// Runs jobs until the queue drains, returning each outcome.
    pub async fn drain(&self) -> Vec<JobOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.run_next_job().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}
