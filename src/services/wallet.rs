//! Wallet entry points: top up, withdraw, balance and rent payment.
//!
//! Rent paid from the wallet settles synchronously in one storage
//! transaction. Rent and top-ups paid by push only create a pending
//! settlement here; the reconciliation worker moves the money once the
//! gateway confirms.

use crate::calendar::RentMonth;
use crate::database::error::DatabaseError;
use crate::database::posting_repository::{RentPosting, WalletRentOutcome};
use crate::database::rent_payment_repository::{NewRentPayment, PaymentChannel, RentPayment};
use crate::database::repository::{PostingRepository, SettlementRepository, TenantDirectory};
use crate::database::settlement_repository::{NewSettlement, RentTerms};
use crate::database::tenant_repository::{LandlordRef, TenantProfile};
use crate::database::wallet_repository::Wallet;
use crate::error::{AppError, AppResult, DomainError, ValidationError};
use crate::money::Amount;
use crate::services::fee_calculation::{FeeSplit, FeeSplitter};
use crate::services::ledger::{tenant_key, wallet_key, Ledger};
use crate::services::payment_initiator::{PaymentInitiator, PendingReference};
use crate::services::rent_allocator::RentAllocator;
use crate::workers::settlement_queue::{SettlementJob, SettlementQueue};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopUpReceipt {
    pub reference: String,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RentReceipt {
    /// Settled from the wallet.
    Paid {
        payment: RentPayment,
        split: FeeSplit,
        payer_balance: Amount,
    },
    /// Push sent; settles when the gateway confirms.
    Pending { reference: String, split: FeeSplit },
}

#[derive(Debug, Clone)]
pub struct PayRentRequest {
    pub amount: Amount,
    pub channel: PaymentChannel,
    pub phone: Option<String>,
}

pub struct WalletService {
    ledger: Arc<Ledger>,
    initiator: Arc<PaymentInitiator>,
    settlements: Arc<dyn SettlementRepository>,
    postings: Arc<dyn PostingRepository>,
    tenants: Arc<dyn TenantDirectory>,
    allocator: Arc<RentAllocator>,
    queue: Arc<dyn SettlementQueue>,
    fees: FeeSplitter,
    first_poll_delay: Duration,
}

impl WalletService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<Ledger>,
        initiator: Arc<PaymentInitiator>,
        settlements: Arc<dyn SettlementRepository>,
        postings: Arc<dyn PostingRepository>,
        tenants: Arc<dyn TenantDirectory>,
        allocator: Arc<RentAllocator>,
        queue: Arc<dyn SettlementQueue>,
        fees: FeeSplitter,
        first_poll_delay: Duration,
    ) -> Self {
        Self {
            ledger,
            initiator,
            settlements,
            postings,
            tenants,
            allocator,
            queue,
            fees,
            first_poll_delay,
        }
    }

    fn require_positive(amount: Amount) -> AppResult<()> {
        if amount.is_positive() {
            return Ok(());
        }
        Err(AppError::validation(ValidationError::InvalidAmount {
            amount: amount.to_string(),
            reason: "amount must be greater than zero".to_string(),
        }))
    }

    /// Sends an STK push for `amount`; the wallet is credited once the
    /// gateway confirms the payment.
    pub async fn add_funds(
        &self,
        user_id: &str,
        phone: &str,
        amount: Amount,
    ) -> AppResult<TopUpReceipt> {
        Self::require_positive(amount)?;
        self.ledger.ensure_wallet(user_id).await?;

        let pending = self.initiator.initiate(phone, amount, user_id).await?;
        self.track(
            &pending,
            NewSettlement {
                reference: pending.reference.clone(),
                payer_id: user_id.to_string(),
                payer_phone: pending.msisdn.clone(),
                gross_amount: amount,
                rent: None,
            },
        )
        .await?;

        info!(
            owner_id = %user_id,
            reference = %pending.reference,
            amount_minor = amount.minor(),
            "Wallet top-up initiated"
        );
        Ok(TopUpReceipt {
            reference: pending.reference,
            amount,
        })
    }

    pub async fn remove_funds(&self, user_id: &str, amount: Amount) -> AppResult<Wallet> {
        Self::require_positive(amount)?;
        Ok(self.ledger.debit(user_id, amount).await?)
    }

    pub async fn get_balance(&self, user_id: &str) -> AppResult<Amount> {
        Ok(self.ledger.balance_of(user_id).await?)
    }

    pub async fn pay_rent(&self, user_id: &str, request: PayRentRequest) -> AppResult<RentReceipt> {
        Self::require_positive(request.amount)?;

        let tenant = self
            .tenants
            .find_tenant_by_user(user_id)
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::TenantNotFound {
                    tenant: user_id.to_string(),
                })
            })?;
        let landlord = tenant.landlord.clone().ok_or_else(|| {
            AppError::domain(DomainError::LandlordNotFound {
                tenant_id: tenant.tenant_id,
            })
        })?;
        let split = self.fees.split(request.amount);

        match request.channel {
            PaymentChannel::Wallet => self.pay_rent_from_wallet(&tenant, &landlord, split).await,
            PaymentChannel::GatewayPush => {
                let phone = request
                    .phone
                    .as_deref()
                    .filter(|p| !p.trim().is_empty())
                    .ok_or_else(|| {
                        AppError::validation(ValidationError::MissingField {
                            field: "phone".to_string(),
                        })
                    })?;
                self.pay_rent_by_push(&tenant, &landlord, split, phone).await
            }
        }
    }

    async fn pay_rent_from_wallet(
        &self,
        tenant: &TenantProfile,
        landlord: &LandlordRef,
        split: FeeSplit,
    ) -> AppResult<RentReceipt> {
        let _guard = self
            .ledger
            .locks()
            .acquire([
                tenant_key(tenant.tenant_id),
                wallet_key(&tenant.user_id),
                wallet_key(&landlord.user_id),
            ])
            .await;

        let today = Utc::now().date_naive();
        let month: RentMonth = self.allocator.allocate_for(tenant, today).await?;
        let posting = RentPosting {
            payer_owner_id: tenant.user_id.clone(),
            landlord_owner_id: landlord.user_id.clone(),
            gross: split.gross,
            net: split.net,
            payment: NewRentPayment {
                tenant_id: tenant.tenant_id,
                landlord_id: landlord.landlord_id,
                amount: split.gross,
                service_fee: split.service_fee,
                landlord_amount: split.net,
                method: PaymentChannel::Wallet,
                external_reference: None,
                payment_date: today,
                month,
            },
        };

        match self.postings.commit_wallet_rent(posting).await? {
            WalletRentOutcome::Committed { payer, payment, .. } => {
                info!(
                    tenant_id = tenant.tenant_id,
                    landlord_id = landlord.landlord_id,
                    month = %payment.month,
                    amount_minor = split.gross.minor(),
                    service_fee_minor = split.service_fee.minor(),
                    "🏠 Rent paid from wallet"
                );
                Ok(RentReceipt::Paid {
                    payment,
                    split,
                    payer_balance: payer.balance,
                })
            }
            WalletRentOutcome::Insufficient { available } => {
                warn!(
                    owner_id = %tenant.user_id,
                    available_minor = available.minor(),
                    required_minor = split.gross.minor(),
                    "Rent payment rejected: insufficient balance"
                );
                Err(AppError::domain(DomainError::InsufficientBalance {
                    owner_id: tenant.user_id.clone(),
                    available: available.to_string(),
                    required: split.gross.to_string(),
                }))
            }
            WalletRentOutcome::NoWallet => Err(AppError::domain(DomainError::WalletNotFound {
                owner_id: tenant.user_id.clone(),
            })),
        }
    }

    async fn pay_rent_by_push(
        &self,
        tenant: &TenantProfile,
        landlord: &LandlordRef,
        split: FeeSplit,
        phone: &str,
    ) -> AppResult<RentReceipt> {
        let pending = self
            .initiator
            .initiate(phone, split.gross, &tenant.user_id)
            .await?;

        self.track(
            &pending,
            NewSettlement {
                reference: pending.reference.clone(),
                payer_id: tenant.user_id.clone(),
                payer_phone: pending.msisdn.clone(),
                gross_amount: split.gross,
                rent: Some(RentTerms {
                    tenant_id: tenant.tenant_id,
                    landlord_id: landlord.landlord_id,
                    landlord_owner_id: landlord.user_id.clone(),
                    service_fee: split.service_fee,
                    net_landlord_amount: split.net,
                }),
            },
        )
        .await?;

        info!(
            tenant_id = tenant.tenant_id,
            reference = %pending.reference,
            amount_minor = split.gross.minor(),
            "Rent push payment initiated"
        );
        Ok(RentReceipt::Pending {
            reference: pending.reference,
            split,
        })
    }

    /// Persists the pending settlement and hands it to the worker.
    async fn track(&self, pending: &PendingReference, settlement: NewSettlement) -> AppResult<()> {
        match self.settlements.insert(settlement).await {
            Ok(_) => {}
            Err(e) if e.is_unique_violation() => {
                let duplicate = AppError::duplicate_settlement(&pending.reference);
                warn!(
                    reference = %pending.reference,
                    error_code = ?duplicate.error_code(),
                    "{}; gateway reused a tracked reference",
                    duplicate
                );
                return Ok(());
            }
            Err(e) => return Err(tracking_failed(pending, e)),
        }

        if let Err(e) = self
            .queue
            .schedule(SettlementJob::new(&pending.reference, 0), self.first_poll_delay)
            .await
        {
            // Row is persisted; startup recovery re-enqueues it.
            error!(reference = %pending.reference, error = %e, "failed to enqueue settlement job");
        }
        Ok(())
    }
}

fn tracking_failed(pending: &PendingReference, err: DatabaseError) -> AppError {
    error!(
        reference = %pending.reference,
        error = %err,
        "push accepted by gateway but settlement could not be recorded"
    );
    AppError::from(err).with_context(format!("settlement {}", pending.reference))
}
