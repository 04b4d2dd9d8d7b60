//! Storage traits
//!
//! Services only talk to these traits. `database::memory` backs them with an
//! in-process store, the `Pg*` repositories with Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::calendar::RentMonth;
use crate::database::error::DatabaseResult;
use crate::database::posting_repository::{
    Confirmation, ConfirmationOutcome, RentPosting, WalletRentOutcome,
};
use crate::database::rent_payment_repository::RentPayment;
use crate::database::settlement_repository::{NewSettlement, PendingSettlement, SettlementUpdate};
use crate::database::tenant_repository::TenantProfile;
use crate::database::wallet_repository::{DebitOutcome, Wallet};
use crate::money::Amount;

#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn find(&self, owner_id: &str) -> DatabaseResult<Option<Wallet>>;

    /// Returns the wallet, creating a zero-balance one if needed.
    async fn ensure(&self, owner_id: &str) -> DatabaseResult<Wallet>;

    /// Adds `amount` in a single atomic step, creating the wallet lazily.
    async fn credit(&self, owner_id: &str, amount: Amount) -> DatabaseResult<Wallet>;

    /// Subtracts `amount` only if the balance covers it.
    async fn debit(&self, owner_id: &str, amount: Amount) -> DatabaseResult<DebitOutcome>;
}

#[async_trait]
pub trait SettlementRepository: Send + Sync {
    /// Fails with a unique violation when the reference already exists.
    async fn insert(&self, settlement: NewSettlement) -> DatabaseResult<PendingSettlement>;

    async fn find(&self, reference: &str) -> DatabaseResult<Option<PendingSettlement>>;

    /// Compare-and-set: applies `update` only while the row is live and its
    /// attempt counter still equals `expected_attempt`. `None` means another
    /// writer got there first.
    async fn transition(
        &self,
        reference: &str,
        expected_attempt: u32,
        update: SettlementUpdate,
    ) -> DatabaseResult<Option<PendingSettlement>>;

    /// Moves an `Exhausted` row back to `Initiated` with a fresh attempt
    /// counter. `None` when the row is not exhausted.
    async fn restart_exhausted(&self, reference: &str) -> DatabaseResult<Option<PendingSettlement>>;

    /// Rows still in `Initiated` or `Polling`.
    async fn list_live(&self) -> DatabaseResult<Vec<PendingSettlement>>;

    /// Live rows untouched since `idle_since`, plus every `Exhausted` row.
    /// A manual restart counts as a touch.
    async fn list_stuck(&self, idle_since: DateTime<Utc>)
        -> DatabaseResult<Vec<PendingSettlement>>;
}

#[async_trait]
pub trait RentPaymentRepository: Send + Sync {
    /// Months that already have a `paid` row for the tenant, ascending.
    async fn paid_months(&self, tenant_id: i64) -> DatabaseResult<Vec<RentMonth>>;

    async fn list_for_tenant(&self, tenant_id: i64) -> DatabaseResult<Vec<RentPayment>>;

    async fn list_for_landlord(
        &self,
        landlord_id: i64,
        month: RentMonth,
    ) -> DatabaseResult<Vec<RentPayment>>;
}

/// Read access to tenant records owned by the wider application.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_tenant(&self, tenant_id: i64) -> DatabaseResult<Option<TenantProfile>>;

    async fn find_tenant_by_user(&self, user_id: &str) -> DatabaseResult<Option<TenantProfile>>;
}

/// Multi-row money movements that must commit together or not at all.
#[async_trait]
pub trait PostingRepository: Send + Sync {
    /// Debit payer, credit landlord and append the rent payment.
    async fn commit_wallet_rent(&self, posting: RentPosting) -> DatabaseResult<WalletRentOutcome>;

    /// Mark a live settlement confirmed, credit the recipient and append the
    /// rent payment if there is one.
    async fn commit_confirmation(
        &self,
        confirmation: Confirmation,
    ) -> DatabaseResult<ConfirmationOutcome>;
}
