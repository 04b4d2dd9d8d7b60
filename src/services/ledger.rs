//! Wallet ledger
//!
//! Single-owner balance changes go through here. Multi-leg postings (a
//! wallet-funded rent payment, a gateway confirmation) are committed in one
//! storage transaction by `PostingRepository` instead, under the same
//! [`OwnerLocks`] keys, so they never interleave with a ledger call on the
//! same owner. The storage layer additionally guarantees the balance never
//! goes negative with a conditional update.

use crate::database::error::DatabaseError;
use crate::database::repository::WalletRepository;
use crate::database::wallet_repository::{DebitOutcome, Wallet};
use crate::error::{AppError, DomainError, ValidationError};
use crate::money::Amount;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("amount {amount} must be greater than zero")]
    InvalidAmount { amount: Amount },

    #[error("insufficient balance for {owner_id}: available {available}, required {required}")]
    InsufficientBalance {
        owner_id: String,
        available: Amount,
        required: Amount,
    },

    #[error("wallet not found for {owner_id}")]
    WalletNotFound { owner_id: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidAmount { amount } => {
                AppError::validation(ValidationError::InvalidAmount {
                    amount: amount.to_string(),
                    reason: "amount must be greater than zero".to_string(),
                })
            }
            LedgerError::InsufficientBalance {
                owner_id,
                available,
                required,
            } => AppError::domain(DomainError::InsufficientBalance {
                owner_id,
                available: available.to_string(),
                required: required.to_string(),
            }),
            LedgerError::WalletNotFound { owner_id } => {
                AppError::domain(DomainError::WalletNotFound { owner_id })
            }
            LedgerError::Database(e) => e.into(),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

pub fn wallet_key(owner_id: &str) -> String {
    format!("wallet:{}", owner_id)
}

pub fn tenant_key(tenant_id: i64) -> String {
    format!("tenant:{}", tenant_id)
}

pub fn settlement_key(reference: &str) -> String {
    format!("settlement:{}", reference)
}

const PRUNE_THRESHOLD: usize = 1024;

/// Keyed async mutexes. Multiple keys are always taken in sorted order so two
/// callers locking overlapping sets cannot deadlock.
#[derive(Default)]
pub struct OwnerLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Holds every lock taken by one [`OwnerLocks::acquire`] call.
pub struct OwnerGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire<I, K>(&self, keys: I) -> OwnerGuard
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        let mutexes: Vec<Arc<AsyncMutex<()>>> = {
            let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
            if slots.len() > PRUNE_THRESHOLD {
                slots.retain(|_, m| Arc::strong_count(m) > 1);
            }
            keys.iter()
                .map(|key| slots.entry(key.clone()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }
        OwnerGuard { _guards: guards }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// Credits, debits and balance reads for one owner at a time. Multi-leg
/// postings bypass it and go through `PostingRepository`.
pub struct Ledger {
    wallets: Arc<dyn WalletRepository>,
    locks: Arc<OwnerLocks>,
}

impl Ledger {
    pub fn new(wallets: Arc<dyn WalletRepository>, locks: Arc<OwnerLocks>) -> Self {
        Self { wallets, locks }
    }

    pub fn locks(&self) -> &Arc<OwnerLocks> {
        &self.locks
    }

    fn require_positive(amount: Amount) -> LedgerResult<()> {
        if amount.is_positive() {
            Ok(())
        } else {
            Err(LedgerError::InvalidAmount { amount })
        }
    }

    /// Adds to the owner's balance, creating the wallet on first funding.
    pub async fn credit(&self, owner_id: &str, amount: Amount) -> LedgerResult<Wallet> {
        Self::require_positive(amount)?;
        let _guard = self.locks.acquire([wallet_key(owner_id)]).await;

        let wallet = self.wallets.credit(owner_id, amount).await?;
        info!(
            owner_id = %owner_id,
            amount_minor = amount.minor(),
            balance_minor = wallet.balance.minor(),
            "💰 Wallet credited"
        );
        Ok(wallet)
    }

    /// Subtracts from the balance; fails without side effects when the
    /// balance does not cover `amount`.
    pub async fn debit(&self, owner_id: &str, amount: Amount) -> LedgerResult<Wallet> {
        Self::require_positive(amount)?;
        let _guard = self.locks.acquire([wallet_key(owner_id)]).await;

        match self.wallets.debit(owner_id, amount).await? {
            DebitOutcome::Applied(wallet) => {
                info!(
                    owner_id = %owner_id,
                    amount_minor = amount.minor(),
                    balance_minor = wallet.balance.minor(),
                    "💸 Wallet debited"
                );
                Ok(wallet)
            }
            DebitOutcome::Insufficient { available } => {
                warn!(
                    owner_id = %owner_id,
                    amount_minor = amount.minor(),
                    available_minor = available.minor(),
                    "Debit rejected: insufficient balance"
                );
                Err(LedgerError::InsufficientBalance {
                    owner_id: owner_id.to_string(),
                    available,
                    required: amount,
                })
            }
            DebitOutcome::NoWallet => Err(LedgerError::WalletNotFound {
                owner_id: owner_id.to_string(),
            }),
        }
    }

    pub async fn balance_of(&self, owner_id: &str) -> LedgerResult<Amount> {
        self.wallets
            .find(owner_id)
            .await?
            .map(|wallet| wallet.balance)
            .ok_or_else(|| LedgerError::WalletNotFound {
                owner_id: owner_id.to_string(),
            })
    }

    /// Funding-context read: creates an empty wallet when none exists.
    pub async fn ensure_wallet(&self, owner_id: &str) -> LedgerResult<Wallet> {
        Ok(self.wallets.ensure(owner_id).await?)
    }
}
