//! Decides which rent month a payment settles.

use crate::calendar::RentMonth;
use crate::database::error::DatabaseResult;
use crate::database::rent_payment_repository::RentPayment;
use crate::database::repository::{RentPaymentRepository, TenantDirectory};
use crate::database::tenant_repository::TenantProfile;
use crate::error::{AppError, AppResult, DomainError};
use crate::money::Amount;
use chrono::{NaiveDate, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Oldest unpaid month between `joined` and `current` inclusive. When every
/// month up to `current` is paid the payment is a prepayment for the month
/// after the latest paid one.
pub fn select_month(joined: RentMonth, current: RentMonth, paid: &[RentMonth]) -> RentMonth {
    let paid: BTreeSet<RentMonth> = paid.iter().copied().collect();

    let mut month = joined;
    while month <= current {
        if !paid.contains(&month) {
            return month;
        }
        month = month.next();
    }

    match paid.iter().next_back() {
        Some(latest) if *latest >= joined => latest.next(),
        _ => joined,
    }
}

pub struct RentAllocator {
    tenants: Arc<dyn TenantDirectory>,
    payments: Arc<dyn RentPaymentRepository>,
}

impl RentAllocator {
    pub fn new(tenants: Arc<dyn TenantDirectory>, payments: Arc<dyn RentPaymentRepository>) -> Self {
        Self { tenants, payments }
    }

    async fn tenant(&self, tenant_id: i64) -> AppResult<TenantProfile> {
        self.tenants
            .find_tenant(tenant_id)
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::TenantNotFound {
                    tenant: tenant_id.to_string(),
                })
            })
    }

    pub async fn allocate(&self, tenant_id: i64, amount: Amount) -> AppResult<RentMonth> {
        self.allocate_at(tenant_id, amount, Utc::now().date_naive())
            .await
    }

    pub async fn allocate_at(
        &self,
        tenant_id: i64,
        amount: Amount,
        today: NaiveDate,
    ) -> AppResult<RentMonth> {
        let tenant = self.tenant(tenant_id).await?;
        let month = self.allocate_for(&tenant, today).await?;
        debug!(
            tenant_id,
            amount_minor = amount.minor(),
            month = %month,
            "rent allocated"
        );
        Ok(month)
    }

    /// Allocation for an already loaded tenant.
    pub async fn allocate_for(
        &self,
        tenant: &TenantProfile,
        today: NaiveDate,
    ) -> DatabaseResult<RentMonth> {
        let paid = self.payments.paid_months(tenant.tenant_id).await?;
        Ok(select_month(
            RentMonth::of(tenant.joined_on),
            RentMonth::of(today),
            &paid,
        ))
    }

    /// Every payment a tenant has made, oldest month first.
    pub async fn tenant_rent_payments(&self, tenant_id: i64) -> AppResult<Vec<RentPayment>> {
        let tenant = self.tenant(tenant_id).await?;
        Ok(self.payments.list_for_tenant(tenant.tenant_id).await?)
    }

    /// Payments a landlord received for one month.
    pub async fn landlord_rent_payments(
        &self,
        landlord_id: i64,
        month: RentMonth,
    ) -> AppResult<Vec<RentPayment>> {
        Ok(self.payments.list_for_landlord(landlord_id, month).await?)
    }
}
