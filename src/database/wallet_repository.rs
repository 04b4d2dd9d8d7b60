use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::repository::WalletRepository;
use crate::money::Amount;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres};

/// Wallet entity, keyed by the owner's external user id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    pub owner_id: String,
    pub balance: Amount,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitOutcome {
    Applied(Wallet),
    Insufficient { available: Amount },
    NoWallet,
}

#[derive(Debug, FromRow)]
pub(crate) struct WalletRow {
    owner_id: String,
    balance_minor: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Self {
            owner_id: row.owner_id,
            balance: Amount::from_minor(row.balance_minor),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const WALLET_COLUMNS: &str = "owner_id, balance_minor, created_at, updated_at";

/// Repository for wallets
pub struct PgWalletRepository {
    pool: PgPool,
}

impl PgWalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) async fn credit_in<'e, E>(
    executor: E,
    owner_id: &str,
    amount: Amount,
) -> DatabaseResult<Wallet>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, WalletRow>(&format!(
        "INSERT INTO wallets (owner_id, balance_minor)
         VALUES ($1, $2)
         ON CONFLICT (owner_id) DO UPDATE
         SET balance_minor = wallets.balance_minor + EXCLUDED.balance_minor,
             updated_at = NOW()
         RETURNING {}",
        WALLET_COLUMNS
    ))
    .bind(owner_id)
    .bind(amount.minor())
    .fetch_one(executor)
    .await
    .map(Wallet::from)
    .map_err(DatabaseError::from_sqlx)
}

/// Conditional debit; `None` when the row is missing or the balance is short.
pub(crate) async fn try_debit_in<'e, E>(
    executor: E,
    owner_id: &str,
    amount: Amount,
) -> DatabaseResult<Option<Wallet>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, WalletRow>(&format!(
        "UPDATE wallets
         SET balance_minor = balance_minor - $2, updated_at = NOW()
         WHERE owner_id = $1 AND balance_minor >= $2
         RETURNING {}",
        WALLET_COLUMNS
    ))
    .bind(owner_id)
    .bind(amount.minor())
    .fetch_optional(executor)
    .await
    .map(|row| row.map(Wallet::from))
    .map_err(DatabaseError::from_sqlx)
}

pub(crate) async fn find_in<'e, E>(executor: E, owner_id: &str) -> DatabaseResult<Option<Wallet>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, WalletRow>(&format!(
        "SELECT {} FROM wallets WHERE owner_id = $1",
        WALLET_COLUMNS
    ))
    .bind(owner_id)
    .fetch_optional(executor)
    .await
    .map(|row| row.map(Wallet::from))
    .map_err(DatabaseError::from_sqlx)
}

#[async_trait]
impl WalletRepository for PgWalletRepository {
    async fn find(&self, owner_id: &str) -> DatabaseResult<Option<Wallet>> {
        find_in(&self.pool, owner_id).await
    }

    async fn ensure(&self, owner_id: &str) -> DatabaseResult<Wallet> {
        sqlx::query_as::<_, WalletRow>(&format!(
            "INSERT INTO wallets (owner_id, balance_minor)
             VALUES ($1, 0)
             ON CONFLICT (owner_id) DO UPDATE SET owner_id = EXCLUDED.owner_id
             RETURNING {}",
            WALLET_COLUMNS
        ))
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .map(Wallet::from)
        .map_err(DatabaseError::from_sqlx)
    }

    async fn credit(&self, owner_id: &str, amount: Amount) -> DatabaseResult<Wallet> {
        credit_in(&self.pool, owner_id, amount).await
    }

    async fn debit(&self, owner_id: &str, amount: Amount) -> DatabaseResult<DebitOutcome> {
        if let Some(wallet) = try_debit_in(&self.pool, owner_id, amount).await? {
            return Ok(DebitOutcome::Applied(wallet));
        }
        Ok(match find_in(&self.pool, owner_id).await? {
            Some(wallet) => DebitOutcome::Insufficient {
                available: wallet.balance,
            },
            None => DebitOutcome::NoWallet,
        })
    }
}
