//! In-process storage backend
//!
//! Implements every repository trait over a single mutex-guarded state so
//! multi-row postings are atomic the same way a database transaction is.
//! Used by the test suite and by `SKIP_EXTERNALS=true` runs.

use crate::calendar::RentMonth;
use crate::database::error::{DatabaseError, DatabaseErrorKind, DatabaseResult};
use crate::database::posting_repository::{
    Confirmation, ConfirmationOutcome, RentPosting, WalletRentOutcome,
};
use crate::database::rent_payment_repository::{NewRentPayment, RentPayment, STATUS_PAID};
use crate::database::repository::{
    PostingRepository, RentPaymentRepository, SettlementRepository, TenantDirectory,
    WalletRepository,
};
use crate::database::settlement_repository::{
    NewSettlement, PendingSettlement, SettlementState, SettlementUpdate,
};
use crate::database::tenant_repository::TenantProfile;
use crate::database::wallet_repository::{DebitOutcome, Wallet};
use crate::money::Amount;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    wallets: HashMap<String, Wallet>,
    settlements: HashMap<String, PendingSettlement>,
    rent_payments: Vec<RentPayment>,
    tenants: HashMap<i64, TenantProfile>,
    next_payment_id: i64,
}

impl State {
    fn credit(&mut self, owner_id: &str, amount: Amount) -> DatabaseResult<Wallet> {
        let now = Utc::now();
        let wallet = self
            .wallets
            .entry(owner_id.to_string())
            .or_insert_with(|| Wallet {
                owner_id: owner_id.to_string(),
                balance: Amount::ZERO,
                created_at: now,
                updated_at: now,
            });
        wallet.balance = wallet.balance.checked_add(amount).ok_or_else(|| {
            DatabaseError::new(DatabaseErrorKind::QueryError {
                message: format!("balance overflow for wallet {}", owner_id),
            })
        })?;
        wallet.updated_at = now;
        Ok(wallet.clone())
    }

    fn debit(&mut self, owner_id: &str, amount: Amount) -> DebitOutcome {
        match self.wallets.get_mut(owner_id) {
            None => DebitOutcome::NoWallet,
            Some(wallet) => match wallet.balance.checked_sub(amount) {
                Some(remaining) if remaining >= Amount::ZERO => {
                    wallet.balance = remaining;
                    wallet.updated_at = Utc::now();
                    DebitOutcome::Applied(wallet.clone())
                }
                _ => DebitOutcome::Insufficient {
                    available: wallet.balance,
                },
            },
        }
    }

    /// Mirrors the partial unique index on (tenant_id, month) for paid rows.
    fn check_rent_unique(&self, payment: &NewRentPayment) -> DatabaseResult<()> {
        let taken = self.rent_payments.iter().any(|existing| {
            existing.tenant_id == payment.tenant_id
                && existing.month == payment.month
                && existing.status == STATUS_PAID
        });
        if taken {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "rent_payments_tenant_month_paid".to_string(),
            }));
        }
        Ok(())
    }

    fn insert_rent(&mut self, payment: NewRentPayment) -> RentPayment {
        self.next_payment_id += 1;
        let row = RentPayment {
            id: self.next_payment_id,
            tenant_id: payment.tenant_id,
            landlord_id: payment.landlord_id,
            amount: payment.amount,
            service_fee: payment.service_fee,
            landlord_amount: payment.landlord_amount,
            method: payment.method,
            external_reference: payment.external_reference,
            payment_date: payment.payment_date,
            month: payment.month,
            status: STATUS_PAID.to_string(),
            created_at: Utc::now(),
        };
        self.rent_payments.push(row.clone());
        row
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> DatabaseResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| {
            DatabaseError::new(DatabaseErrorKind::Unknown {
                message: "in-memory store lock poisoned".to_string(),
            })
        })
    }

    /// Registers a tenant record owned by the wider application.
    pub fn add_tenant(&self, profile: TenantProfile) -> DatabaseResult<()> {
        self.lock()?.tenants.insert(profile.tenant_id, profile);
        Ok(())
    }

    /// Appends a historical paid row, e.g. months settled before go-live.
    pub fn record_rent_payment(&self, payment: NewRentPayment) -> DatabaseResult<RentPayment> {
        let mut state = self.lock()?;
        state.check_rent_unique(&payment)?;
        Ok(state.insert_rent(payment))
    }
}

#[async_trait]
impl WalletRepository for InMemoryStore {
    async fn find(&self, owner_id: &str) -> DatabaseResult<Option<Wallet>> {
        Ok(self.lock()?.wallets.get(owner_id).cloned())
    }

    async fn ensure(&self, owner_id: &str) -> DatabaseResult<Wallet> {
        self.lock()?.credit(owner_id, Amount::ZERO)
    }

    async fn credit(&self, owner_id: &str, amount: Amount) -> DatabaseResult<Wallet> {
        self.lock()?.credit(owner_id, amount)
    }

    async fn debit(&self, owner_id: &str, amount: Amount) -> DatabaseResult<DebitOutcome> {
        Ok(self.lock()?.debit(owner_id, amount))
    }
}

#[async_trait]
impl SettlementRepository for InMemoryStore {
    async fn insert(&self, settlement: NewSettlement) -> DatabaseResult<PendingSettlement> {
        let mut state = self.lock()?;
        if state.settlements.contains_key(&settlement.reference) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: "pending_settlements_pkey".to_string(),
            }));
        }
        let now = Utc::now();
        let row = PendingSettlement {
            purpose: settlement.purpose(),
            reference: settlement.reference,
            payer_id: settlement.payer_id,
            payer_phone: settlement.payer_phone,
            gross_amount: settlement.gross_amount,
            rent: settlement.rent,
            attempt: 0,
            state: SettlementState::Initiated,
            last_error: None,
            manual_retries: 0,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };
        state.settlements.insert(row.reference.clone(), row.clone());
        Ok(row)
    }

    async fn find(&self, reference: &str) -> DatabaseResult<Option<PendingSettlement>> {
        Ok(self.lock()?.settlements.get(reference).cloned())
    }

    async fn transition(
        &self,
        reference: &str,
        expected_attempt: u32,
        update: SettlementUpdate,
    ) -> DatabaseResult<Option<PendingSettlement>> {
        let mut state = self.lock()?;
        let Some(row) = state.settlements.get_mut(reference) else {
            return Ok(None);
        };
        if !row.state.is_live() || row.attempt != expected_attempt {
            return Ok(None);
        }
        let now = Utc::now();
        row.state = update.state;
        row.attempt = update.attempt;
        row.last_error = update.last_error;
        row.updated_at = now;
        row.resolved_at = if update.state.is_live() { None } else { Some(now) };
        Ok(Some(row.clone()))
    }

    async fn restart_exhausted(&self, reference: &str) -> DatabaseResult<Option<PendingSettlement>> {
        let mut state = self.lock()?;
        let Some(row) = state.settlements.get_mut(reference) else {
            return Ok(None);
        };
        if row.state != SettlementState::Exhausted {
            return Ok(None);
        }
        row.state = SettlementState::Initiated;
        row.attempt = 0;
        row.manual_retries += 1;
        row.updated_at = Utc::now();
        row.resolved_at = None;
        Ok(Some(row.clone()))
    }

    async fn list_live(&self) -> DatabaseResult<Vec<PendingSettlement>> {
        let state = self.lock()?;
        let mut rows: Vec<_> = state
            .settlements
            .values()
            .filter(|row| row.state.is_live())
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.created_at);
        Ok(rows)
    }

    async fn list_stuck(&self, idle_since: DateTime<Utc>) -> DatabaseResult<Vec<PendingSettlement>> {
        let state = self.lock()?;
        let mut rows: Vec<_> = state
            .settlements
            .values()
            .filter(|row| {
                (row.state.is_live() && row.updated_at < idle_since)
                    || row.state == SettlementState::Exhausted
            })
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.created_at);
        Ok(rows)
    }
}

#[async_trait]
impl RentPaymentRepository for InMemoryStore {
    async fn paid_months(&self, tenant_id: i64) -> DatabaseResult<Vec<RentMonth>> {
        let state = self.lock()?;
        let mut months: Vec<RentMonth> = state
            .rent_payments
            .iter()
            .filter(|p| p.tenant_id == tenant_id && p.status == STATUS_PAID)
            .map(|p| p.month)
            .collect();
        months.sort();
        Ok(months)
    }

    async fn list_for_tenant(&self, tenant_id: i64) -> DatabaseResult<Vec<RentPayment>> {
        let state = self.lock()?;
        let mut rows: Vec<_> = state
            .rent_payments
            .iter()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.month.cmp(&b.month).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn list_for_landlord(
        &self,
        landlord_id: i64,
        month: RentMonth,
    ) -> DatabaseResult<Vec<RentPayment>> {
        let state = self.lock()?;
        let mut rows: Vec<_> = state
            .rent_payments
            .iter()
            .filter(|p| p.landlord_id == landlord_id && p.month == month)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.payment_date.cmp(&b.payment_date).then(a.id.cmp(&b.id)));
        Ok(rows)
    }
}

#[async_trait]
impl TenantDirectory for InMemoryStore {
    async fn find_tenant(&self, tenant_id: i64) -> DatabaseResult<Option<TenantProfile>> {
        Ok(self.lock()?.tenants.get(&tenant_id).cloned())
    }

    async fn find_tenant_by_user(&self, user_id: &str) -> DatabaseResult<Option<TenantProfile>> {
        Ok(self
            .lock()?
            .tenants
            .values()
            .find(|t| t.user_id == user_id)
            .cloned())
    }
}

#[async_trait]
impl PostingRepository for InMemoryStore {
    async fn commit_wallet_rent(&self, posting: RentPosting) -> DatabaseResult<WalletRentOutcome> {
        let mut state = self.lock()?;

        // Validate everything before the first write so a failure leaves no trace.
        state.check_rent_unique(&posting.payment)?;
        match state.wallets.get(&posting.payer_owner_id) {
            None => return Ok(WalletRentOutcome::NoWallet),
            Some(wallet) if wallet.balance < posting.gross => {
                return Ok(WalletRentOutcome::Insufficient {
                    available: wallet.balance,
                })
            }
            Some(_) => {}
        }
        if let Some(landlord) = state.wallets.get(&posting.landlord_owner_id) {
            if landlord.balance.checked_add(posting.net).is_none() {
                return Err(DatabaseError::new(DatabaseErrorKind::QueryError {
                    message: format!("balance overflow for wallet {}", posting.landlord_owner_id),
                }));
            }
        }

        let payer = match state.debit(&posting.payer_owner_id, posting.gross) {
            DebitOutcome::Applied(wallet) => wallet,
            DebitOutcome::Insufficient { available } => {
                return Ok(WalletRentOutcome::Insufficient { available })
            }
            DebitOutcome::NoWallet => return Ok(WalletRentOutcome::NoWallet),
        };
        let landlord = state.credit(&posting.landlord_owner_id, posting.net)?;
        let payment = state.insert_rent(posting.payment);

        Ok(WalletRentOutcome::Committed {
            payer,
            landlord,
            payment,
        })
    }

    async fn commit_confirmation(
        &self,
        confirmation: Confirmation,
    ) -> DatabaseResult<ConfirmationOutcome> {
        let mut state = self.lock()?;

        let live = state
            .settlements
            .get(&confirmation.reference)
            .map(|row| row.state.is_live() && row.attempt == confirmation.expected_attempt)
            .unwrap_or(false);
        if !live {
            return Ok(ConfirmationOutcome::AlreadyResolved);
        }
        if let Some(payment) = &confirmation.rent_payment {
            state.check_rent_unique(payment)?;
        }

        let wallet = state.credit(&confirmation.credit_owner_id, confirmation.credit_amount)?;
        let payment = confirmation
            .rent_payment
            .map(|payment| state.insert_rent(payment));

        let now = Utc::now();
        let settlement = match state.settlements.get_mut(&confirmation.reference) {
            Some(row) => {
                row.state = SettlementState::Confirmed;
                row.attempt = confirmation.attempt;
                row.last_error = None;
                row.updated_at = now;
                row.resolved_at = Some(now);
                row.clone()
            }
            None => return Ok(ConfirmationOutcome::AlreadyResolved),
        };

        Ok(ConfirmationOutcome::Applied {
            settlement,
            wallet,
            payment,
        })
    }
}
