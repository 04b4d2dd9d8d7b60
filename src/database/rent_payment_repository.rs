use crate::calendar::RentMonth;
use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::repository::RentPaymentRepository;
use crate::money::Amount;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres};
use std::str::FromStr;

pub const STATUS_PAID: &str = "paid";

/// How the tenant paid. `GatewayPush` keeps the `mpesa` wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentChannel {
    #[serde(rename = "wallet")]
    Wallet,
    #[serde(rename = "mpesa")]
    GatewayPush,
}

impl PaymentChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentChannel::Wallet => "wallet",
            PaymentChannel::GatewayPush => "mpesa",
        }
    }
}

impl FromStr for PaymentChannel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "wallet" => Ok(PaymentChannel::Wallet),
            "mpesa" => Ok(PaymentChannel::GatewayPush),
            other => Err(format!("unknown payment channel '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RentPayment {
    pub id: i64,
    pub tenant_id: i64,
    pub landlord_id: i64,
    pub amount: Amount,
    pub service_fee: Amount,
    pub landlord_amount: Amount,
    pub method: PaymentChannel,
    pub external_reference: Option<String>,
    pub payment_date: NaiveDate,
    pub month: RentMonth,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRentPayment {
    pub tenant_id: i64,
    pub landlord_id: i64,
    pub amount: Amount,
    pub service_fee: Amount,
    pub landlord_amount: Amount,
    pub method: PaymentChannel,
    pub external_reference: Option<String>,
    pub payment_date: NaiveDate,
    pub month: RentMonth,
}

#[derive(Debug, FromRow)]
pub(crate) struct RentPaymentRow {
    id: i64,
    tenant_id: i64,
    landlord_id: i64,
    amount_minor: i64,
    service_fee_minor: i64,
    landlord_amount_minor: i64,
    method: String,
    external_reference: Option<String>,
    payment_date: NaiveDate,
    month: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<RentPaymentRow> for RentPayment {
    type Error = DatabaseError;

    fn try_from(row: RentPaymentRow) -> Result<Self, Self::Error> {
        Ok(RentPayment {
            id: row.id,
            tenant_id: row.tenant_id,
            landlord_id: row.landlord_id,
            amount: Amount::from_minor(row.amount_minor),
            service_fee: Amount::from_minor(row.service_fee_minor),
            landlord_amount: Amount::from_minor(row.landlord_amount_minor),
            method: PaymentChannel::from_str(&row.method).map_err(DatabaseError::corrupt)?,
            external_reference: row.external_reference,
            payment_date: row.payment_date,
            month: RentMonth::from_str(&row.month)
                .map_err(|e| DatabaseError::corrupt(e.to_string()))?,
            status: row.status,
            created_at: row.created_at,
        })
    }
}

const RENT_PAYMENT_COLUMNS: &str = "id, tenant_id, landlord_id, amount_minor, service_fee_minor, \
     landlord_amount_minor, method, external_reference, payment_date, month, status, created_at";

fn into_payments(rows: Vec<RentPaymentRow>) -> DatabaseResult<Vec<RentPayment>> {
    rows.into_iter().map(RentPayment::try_from).collect()
}

/// Appends a `paid` row. The partial unique index on (tenant_id, month)
/// surfaces a double allocation as a unique violation.
pub(crate) async fn insert_paid_in<'e, E>(
    executor: E,
    payment: &NewRentPayment,
) -> DatabaseResult<RentPayment>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row = sqlx::query_as::<_, RentPaymentRow>(&format!(
        "INSERT INTO rent_payments (
            tenant_id, landlord_id, amount_minor, service_fee_minor, landlord_amount_minor,
            method, external_reference, payment_date, month, status
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING {}",
        RENT_PAYMENT_COLUMNS
    ))
    .bind(payment.tenant_id)
    .bind(payment.landlord_id)
    .bind(payment.amount.minor())
    .bind(payment.service_fee.minor())
    .bind(payment.landlord_amount.minor())
    .bind(payment.method.as_str())
    .bind(&payment.external_reference)
    .bind(payment.payment_date)
    .bind(payment.month.to_string())
    .bind(STATUS_PAID)
    .fetch_one(executor)
    .await
    .map_err(DatabaseError::from_sqlx)?;

    RentPayment::try_from(row)
}

pub(crate) async fn paid_months_in<'e, E>(executor: E, tenant_id: i64) -> DatabaseResult<Vec<RentMonth>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let months: Vec<(String,)> = sqlx::query_as(
        "SELECT month FROM rent_payments
         WHERE tenant_id = $1 AND status = $2
         ORDER BY month ASC",
    )
    .bind(tenant_id)
    .bind(STATUS_PAID)
    .fetch_all(executor)
    .await
    .map_err(DatabaseError::from_sqlx)?;

    months
        .into_iter()
        .map(|(month,)| RentMonth::from_str(&month).map_err(|e| DatabaseError::corrupt(e.to_string())))
        .collect()
}

/// Repository for the rent payment ledger
pub struct PgRentPaymentRepository {
    pool: PgPool,
}

impl PgRentPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RentPaymentRepository for PgRentPaymentRepository {
    async fn paid_months(&self, tenant_id: i64) -> DatabaseResult<Vec<RentMonth>> {
        paid_months_in(&self.pool, tenant_id).await
    }

    async fn list_for_tenant(&self, tenant_id: i64) -> DatabaseResult<Vec<RentPayment>> {
        let rows = sqlx::query_as::<_, RentPaymentRow>(&format!(
            "SELECT {} FROM rent_payments WHERE tenant_id = $1 ORDER BY month ASC, id ASC",
            RENT_PAYMENT_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        into_payments(rows)
    }

    async fn list_for_landlord(
        &self,
        landlord_id: i64,
        month: RentMonth,
    ) -> DatabaseResult<Vec<RentPayment>> {
        let rows = sqlx::query_as::<_, RentPaymentRow>(&format!(
            "SELECT {} FROM rent_payments
             WHERE landlord_id = $1 AND month = $2
             ORDER BY payment_date ASC, id ASC",
            RENT_PAYMENT_COLUMNS
        ))
        .bind(landlord_id)
        .bind(month.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        into_payments(rows)
    }
}
