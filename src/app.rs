//! Component wiring shared by the binary and the integration tests.

use crate::api::ApiState;
use crate::config::AppConfig;
use crate::database::memory::InMemoryStore;
use crate::database::posting_repository::PgPostingRepository;
use crate::database::rent_payment_repository::PgRentPaymentRepository;
use crate::database::repository::{
    PostingRepository, RentPaymentRepository, SettlementRepository, TenantDirectory,
    WalletRepository,
};
use crate::database::settlement_repository::PgSettlementRepository;
use crate::database::tenant_repository::PgTenantDirectory;
use crate::database::wallet_repository::PgWalletRepository;
use crate::health::HealthChecker;
use crate::payments::provider::PushPaymentProvider;
use crate::services::fee_calculation::{FeeSplitter, DEFAULT_SERVICE_FEE_BPS};
use crate::services::notification::SettlementNotifier;
use crate::services::{
    Ledger, OwnerLocks, PaymentInitiator, RentAllocator, SettlementService, WalletService,
};
use crate::workers::reconciliation::{ReconciliationWorker, RetryPolicy};
use crate::workers::settlement_queue::SettlementQueue;
use crate::workers::stuck_settlements::StuckSettlementMonitor;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Storage behind the repository traits.
#[derive(Clone)]
pub struct Stores {
    pub wallets: Arc<dyn WalletRepository>,
    pub settlements: Arc<dyn SettlementRepository>,
    pub rent_payments: Arc<dyn RentPaymentRepository>,
    pub tenants: Arc<dyn TenantDirectory>,
    pub postings: Arc<dyn PostingRepository>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            wallets: Arc::new(PgWalletRepository::new(pool.clone())),
            settlements: Arc::new(PgSettlementRepository::new(pool.clone())),
            rent_payments: Arc::new(PgRentPaymentRepository::new(pool.clone())),
            tenants: Arc::new(PgTenantDirectory::new(pool.clone())),
            postings: Arc::new(PgPostingRepository::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            wallets: store.clone(),
            settlements: store.clone(),
            rent_payments: store.clone(),
            tenants: store.clone(),
            postings: store,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub policy: RetryPolicy,
    pub stuck_threshold: Duration,
    pub stuck_scan_interval: Duration,
    pub service_fee_bps: u32,
    pub currency: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
            stuck_threshold: Duration::from_secs(900),
            stuck_scan_interval: Duration::from_secs(60),
            service_fee_bps: DEFAULT_SERVICE_FEE_BPS,
            currency: "KES".to_string(),
        }
    }
}

impl From<&AppConfig> for ServiceSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            policy: config.reconciliation.policy.clone(),
            stuck_threshold: config.reconciliation.stuck_threshold,
            stuck_scan_interval: config.reconciliation.stuck_scan_interval,
            service_fee_bps: config.wallet.service_fee_bps,
            currency: config.wallet.currency.clone(),
        }
    }
}

pub struct Components {
    pub ledger: Arc<Ledger>,
    pub wallet: Arc<WalletService>,
    pub settlements: Arc<SettlementService>,
    pub allocator: Arc<RentAllocator>,
    pub worker: Arc<ReconciliationWorker>,
    pub settings: ServiceSettings,
}

impl Components {
    /// One lock table is shared by the ledger, the wallet service, the
    /// operator surface and the worker.
    pub fn build(
        stores: &Stores,
        gateway: Arc<dyn PushPaymentProvider>,
        queue: Arc<dyn SettlementQueue>,
        notifier: Arc<dyn SettlementNotifier>,
        settings: ServiceSettings,
    ) -> Self {
        let locks = Arc::new(OwnerLocks::new());
        let ledger = Arc::new(Ledger::new(stores.wallets.clone(), locks.clone()));
        let allocator = Arc::new(RentAllocator::new(
            stores.tenants.clone(),
            stores.rent_payments.clone(),
        ));
        let settlements = Arc::new(SettlementService::new(
            stores.settlements.clone(),
            queue.clone(),
            locks.clone(),
            settings.stuck_threshold,
        ));
        let wallet = Arc::new(WalletService::new(
            ledger.clone(),
            Arc::new(PaymentInitiator::new(gateway.clone())),
            stores.settlements.clone(),
            stores.postings.clone(),
            stores.tenants.clone(),
            allocator.clone(),
            queue.clone(),
            FeeSplitter::new(settings.service_fee_bps),
            settings.policy.initial_delay,
        ));
        let worker = Arc::new(ReconciliationWorker::new(
            stores.settlements.clone(),
            stores.postings.clone(),
            stores.tenants.clone(),
            allocator.clone(),
            gateway,
            queue,
            notifier,
            locks,
            settings.policy.clone(),
        ));

        Self {
            ledger,
            wallet,
            settlements,
            allocator,
            worker,
            settings,
        }
    }

    pub fn api_state(&self, db_pool: Option<PgPool>) -> ApiState {
        ApiState {
            wallet: self.wallet.clone(),
            settlements: self.settlements.clone(),
            allocator: self.allocator.clone(),
            health: HealthChecker::new(db_pool, self.settlements.clone()),
            currency: self.settings.currency.clone(),
        }
    }

    pub fn stuck_monitor(&self) -> StuckSettlementMonitor {
        StuckSettlementMonitor::new(
            self.settlements.clone(),
            self.settings.stuck_scan_interval,
            self.settings.stuck_threshold,
        )
    }
}
