use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::repository::SettlementRepository;
use crate::money::Amount;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementState {
    Initiated,
    Polling,
    Confirmed,
    Failed,
    Exhausted,
}

impl SettlementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementState::Initiated => "initiated",
            SettlementState::Polling => "polling",
            SettlementState::Confirmed => "confirmed",
            SettlementState::Failed => "failed",
            SettlementState::Exhausted => "exhausted",
        }
    }

    /// Still owned by the reconciliation worker.
    pub fn is_live(&self) -> bool {
        matches!(self, SettlementState::Initiated | SettlementState::Polling)
    }

    /// Confirmed, failed or exhausted. Only `retry_exhausted` leaves one.
    pub fn is_resolved(&self) -> bool {
        !self.is_live()
    }
}

impl fmt::Display for SettlementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "initiated" => Ok(SettlementState::Initiated),
            "polling" => Ok(SettlementState::Polling),
            "confirmed" => Ok(SettlementState::Confirmed),
            "failed" => Ok(SettlementState::Failed),
            "exhausted" => Ok(SettlementState::Exhausted),
            other => Err(format!("unknown settlement state '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementPurpose {
    WalletTopUp,
    Rent,
}

impl SettlementPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementPurpose::WalletTopUp => "wallet_top_up",
            SettlementPurpose::Rent => "rent",
        }
    }
}

/// Rent details fixed at initiation and carried through to settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RentTerms {
    pub tenant_id: i64,
    pub landlord_id: i64,
    pub landlord_owner_id: String,
    pub service_fee: Amount,
    pub net_landlord_amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingSettlement {
    pub reference: String,
    pub purpose: SettlementPurpose,
    pub payer_id: String,
    pub payer_phone: String,
    pub gross_amount: Amount,
    pub rent: Option<RentTerms>,
    pub attempt: u32,
    pub state: SettlementState,
    pub last_error: Option<String>,
    pub manual_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewSettlement {
    pub reference: String,
    pub payer_id: String,
    pub payer_phone: String,
    pub gross_amount: Amount,
    pub rent: Option<RentTerms>,
}

impl NewSettlement {
    pub fn purpose(&self) -> SettlementPurpose {
        if self.rent.is_some() {
            SettlementPurpose::Rent
        } else {
            SettlementPurpose::WalletTopUp
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementUpdate {
    pub state: SettlementState,
    pub attempt: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, FromRow)]
pub(crate) struct SettlementRow {
    reference: String,
    purpose: String,
    payer_id: String,
    payer_phone: String,
    gross_minor: i64,
    tenant_id: Option<i64>,
    landlord_id: Option<i64>,
    landlord_owner_id: Option<String>,
    service_fee_minor: Option<i64>,
    net_landlord_minor: Option<i64>,
    attempt: i32,
    state: String,
    last_error: Option<String>,
    manual_retries: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<SettlementRow> for PendingSettlement {
    type Error = DatabaseError;

    fn try_from(row: SettlementRow) -> Result<Self, Self::Error> {
        let state = SettlementState::from_str(&row.state).map_err(DatabaseError::corrupt)?;
        let purpose = match row.purpose.as_str() {
            "wallet_top_up" => SettlementPurpose::WalletTopUp,
            "rent" => SettlementPurpose::Rent,
            other => {
                return Err(DatabaseError::corrupt(format!(
                    "settlement {} has unknown purpose '{}'",
                    row.reference, other
                )))
            }
        };
        let rent = match (
            row.tenant_id,
            row.landlord_id,
            row.landlord_owner_id,
            row.service_fee_minor,
            row.net_landlord_minor,
        ) {
            (Some(tenant_id), Some(landlord_id), Some(owner), Some(fee), Some(net)) => {
                Some(RentTerms {
                    tenant_id,
                    landlord_id,
                    landlord_owner_id: owner,
                    service_fee: Amount::from_minor(fee),
                    net_landlord_amount: Amount::from_minor(net),
                })
            }
            (None, None, None, None, None) => None,
            _ => {
                return Err(DatabaseError::corrupt(format!(
                    "settlement {} has partial rent terms",
                    row.reference
                )))
            }
        };
        if (purpose == SettlementPurpose::Rent) != rent.is_some() {
            return Err(DatabaseError::corrupt(format!(
                "settlement {} purpose does not match its rent terms",
                row.reference
            )));
        }

        Ok(PendingSettlement {
            reference: row.reference,
            purpose,
            payer_id: row.payer_id,
            payer_phone: row.payer_phone,
            gross_amount: Amount::from_minor(row.gross_minor),
            rent,
            attempt: row.attempt.max(0) as u32,
            state,
            last_error: row.last_error,
            manual_retries: row.manual_retries.max(0) as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
            resolved_at: row.resolved_at,
        })
    }
}

const SETTLEMENT_COLUMNS: &str = "reference, purpose, payer_id, payer_phone, gross_minor, \
     tenant_id, landlord_id, landlord_owner_id, service_fee_minor, net_landlord_minor, \
     attempt, state, last_error, manual_retries, created_at, updated_at, resolved_at";

fn into_settlements(rows: Vec<SettlementRow>) -> DatabaseResult<Vec<PendingSettlement>> {
    rows.into_iter().map(PendingSettlement::try_from).collect()
}

/// Marks a live settlement confirmed inside the caller's transaction.
pub(crate) async fn confirm_in<'e, E>(
    executor: E,
    reference: &str,
    expected_attempt: u32,
    attempt: u32,
) -> DatabaseResult<Option<PendingSettlement>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row = sqlx::query_as::<_, SettlementRow>(&format!(
        "UPDATE pending_settlements
         SET state = 'confirmed', attempt = $3, last_error = NULL,
             updated_at = NOW(), resolved_at = NOW()
         WHERE reference = $1 AND attempt = $2 AND state IN ('initiated', 'polling')
         RETURNING {}",
        SETTLEMENT_COLUMNS
    ))
    .bind(reference)
    .bind(expected_attempt as i32)
    .bind(attempt as i32)
    .fetch_optional(executor)
    .await
    .map_err(DatabaseError::from_sqlx)?;

    row.map(PendingSettlement::try_from).transpose()
}

/// Repository for settlements awaiting gateway confirmation
pub struct PgSettlementRepository {
    pool: PgPool,
}

impl PgSettlementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettlementRepository for PgSettlementRepository {
    async fn insert(&self, settlement: NewSettlement) -> DatabaseResult<PendingSettlement> {
        let purpose = settlement.purpose();
        let rent = settlement.rent.as_ref();
        let row = sqlx::query_as::<_, SettlementRow>(&format!(
            "INSERT INTO pending_settlements (
                reference, purpose, payer_id, payer_phone, gross_minor,
                tenant_id, landlord_id, landlord_owner_id, service_fee_minor, net_landlord_minor,
                attempt, state, manual_retries
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, 'initiated', 0)
             RETURNING {}",
            SETTLEMENT_COLUMNS
        ))
        .bind(&settlement.reference)
        .bind(purpose.as_str())
        .bind(&settlement.payer_id)
        .bind(&settlement.payer_phone)
        .bind(settlement.gross_amount.minor())
        .bind(rent.map(|r| r.tenant_id))
        .bind(rent.map(|r| r.landlord_id))
        .bind(rent.map(|r| r.landlord_owner_id.clone()))
        .bind(rent.map(|r| r.service_fee.minor()))
        .bind(rent.map(|r| r.net_landlord_amount.minor()))
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        PendingSettlement::try_from(row)
    }

    async fn find(&self, reference: &str) -> DatabaseResult<Option<PendingSettlement>> {
        let row = sqlx::query_as::<_, SettlementRow>(&format!(
            "SELECT {} FROM pending_settlements WHERE reference = $1",
            SETTLEMENT_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(PendingSettlement::try_from).transpose()
    }

    async fn transition(
        &self,
        reference: &str,
        expected_attempt: u32,
        update: SettlementUpdate,
    ) -> DatabaseResult<Option<PendingSettlement>> {
        let row = sqlx::query_as::<_, SettlementRow>(&format!(
            "UPDATE pending_settlements
             SET state = $3, attempt = $4, last_error = $5, updated_at = NOW(),
                 resolved_at = CASE WHEN $3 IN ('initiated', 'polling') THEN NULL ELSE NOW() END
             WHERE reference = $1 AND attempt = $2 AND state IN ('initiated', 'polling')
             RETURNING {}",
            SETTLEMENT_COLUMNS
        ))
        .bind(reference)
        .bind(expected_attempt as i32)
        .bind(update.state.as_str())
        .bind(update.attempt as i32)
        .bind(update.last_error)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(PendingSettlement::try_from).transpose()
    }

    async fn restart_exhausted(&self, reference: &str) -> DatabaseResult<Option<PendingSettlement>> {
        let row = sqlx::query_as::<_, SettlementRow>(&format!(
            "UPDATE pending_settlements
             SET state = 'initiated', attempt = 0, manual_retries = manual_retries + 1,
                 updated_at = NOW(), resolved_at = NULL
             WHERE reference = $1 AND state = 'exhausted'
             RETURNING {}",
            SETTLEMENT_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(PendingSettlement::try_from).transpose()
    }

    async fn list_live(&self) -> DatabaseResult<Vec<PendingSettlement>> {
        let rows = sqlx::query_as::<_, SettlementRow>(&format!(
            "SELECT {} FROM pending_settlements
             WHERE state IN ('initiated', 'polling')
             ORDER BY created_at ASC",
            SETTLEMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        into_settlements(rows)
    }

    async fn list_stuck(&self, idle_since: DateTime<Utc>) -> DatabaseResult<Vec<PendingSettlement>> {
        let rows = sqlx::query_as::<_, SettlementRow>(&format!(
            "SELECT {} FROM pending_settlements
             WHERE (state IN ('initiated', 'polling') AND updated_at < $1)
                OR state = 'exhausted'
             ORDER BY created_at ASC",
            SETTLEMENT_COLUMNS
        ))
        .bind(idle_since)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        into_settlements(rows)
    }
}
