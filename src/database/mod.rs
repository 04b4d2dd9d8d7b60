pub mod error;
pub mod memory;
pub mod posting_repository;
pub mod rent_payment_repository;
pub mod repository;
pub mod settlement_repository;
pub mod tenant_repository;
pub mod wallet_repository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error as log_error, info, warn};

use self::error::DatabaseError;
use crate::config::DatabaseConfig;

const MAX_LIFETIME: Duration = Duration::from_secs(1800);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Opens the Postgres pool backing wallets, settlements and rent payments.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_secs = config.connection_timeout,
        "Connecting to Postgres"
    );

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .idle_timeout(
            config
                .idle_timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_IDLE_TIMEOUT),
        )
        .max_lifetime(MAX_LIFETIME)
        .connect(&config.url)
        .await
        .map_err(|e| {
            log_error!(error = %e, "Postgres connection failed");
            DatabaseError::from_sqlx(e)
        })
}

/// Applies the schema in `migrations/`. Statements are idempotent.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DatabaseError> {
    for (name, sql) in MIGRATIONS {
        info!(migration = name, "Applying migration");
        sqlx::raw_sql(sql).execute(pool).await.map_err(|e| {
            log_error!(migration = name, "Migration failed: {}", e);
            DatabaseError::from_sqlx(e)
        })?;
    }
    Ok(())
}

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_wallets",
        include_str!("../../migrations/0001_wallets.sql"),
    ),
    (
        "0002_pending_settlements",
        include_str!("../../migrations/0002_pending_settlements.sql"),
    ),
    (
        "0003_rent_payments",
        include_str!("../../migrations/0003_rent_payments.sql"),
    ),
];

/// Round-trips a trivial query through the pool.
pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .map(|_| ())
        .map_err(|e| {
            warn!(error = %e, "Postgres probe failed");
            DatabaseError::from_sqlx(e)
        })
}
