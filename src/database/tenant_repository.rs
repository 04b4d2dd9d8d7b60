use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::repository::TenantDirectory;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};

/// The landlord who owns the tenant's property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandlordRef {
    pub landlord_id: i64,
    /// External user id; keys the landlord's wallet.
    pub user_id: String,
}

/// The slice of a tenant record the ledger needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantProfile {
    pub tenant_id: i64,
    pub user_id: String,
    /// Date the tenant record was created; rent is owed from this month on.
    pub joined_on: NaiveDate,
    pub landlord: Option<LandlordRef>,
}

#[derive(Debug, FromRow)]
struct TenantRow {
    id: i64,
    user_id: String,
    created_at: DateTime<Utc>,
    landlord_id: Option<i64>,
    landlord_user_id: Option<String>,
}

impl From<TenantRow> for TenantProfile {
    fn from(row: TenantRow) -> Self {
        let landlord = match (row.landlord_id, row.landlord_user_id) {
            (Some(landlord_id), Some(user_id)) => Some(LandlordRef {
                landlord_id,
                user_id,
            }),
            _ => None,
        };
        Self {
            tenant_id: row.id,
            user_id: row.user_id,
            joined_on: row.created_at.date_naive(),
            landlord,
        }
    }
}

const TENANT_QUERY: &str = "SELECT t.id, t.user_id, t.created_at,
        l.id AS landlord_id, l.user_id AS landlord_user_id
     FROM tenants t
     LEFT JOIN properties p ON p.id = t.property_id
     LEFT JOIN landlords l ON l.id = p.landlord_id";

/// Reads the tenant, property and landlord tables owned by the main application
pub struct PgTenantDirectory {
    pool: PgPool,
}

impl PgTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn find_tenant(&self, tenant_id: i64) -> DatabaseResult<Option<TenantProfile>> {
        sqlx::query_as::<_, TenantRow>(&format!("{} WHERE t.id = $1", TENANT_QUERY))
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.map(TenantProfile::from))
            .map_err(DatabaseError::from_sqlx)
    }

    async fn find_tenant_by_user(&self, user_id: &str) -> DatabaseResult<Option<TenantProfile>> {
        sqlx::query_as::<_, TenantRow>(&format!("{} WHERE t.user_id = $1", TENANT_QUERY))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.map(TenantProfile::from))
            .map_err(DatabaseError::from_sqlx)
    }
}
