use super::auth::Principal;
use super::ApiState;
use crate::calendar::RentMonth;
use crate::error::AppResult;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    /// `YYYY-MM`; the current month when absent.
    pub month: Option<String>,
}

pub async fn tenant_rent_payments(
    State(state): State<ApiState>,
    _principal: Principal,
    Path(tenant_id): Path<i64>,
) -> AppResult<Json<Value>> {
    let payments = state.allocator.tenant_rent_payments(tenant_id).await?;
    Ok(Json(json!({
        "status": "success",
        "tenant_id": tenant_id,
        "rent_payments": payments,
    })))
}

pub async fn landlord_rent_payments(
    State(state): State<ApiState>,
    _principal: Principal,
    Path(landlord_id): Path<i64>,
    Query(query): Query<MonthQuery>,
) -> AppResult<Json<Value>> {
    let month = match query.month.as_deref() {
        Some(raw) => raw.parse::<RentMonth>()?,
        None => RentMonth::of(Utc::now().date_naive()),
    };
    let payments = state
        .allocator
        .landlord_rent_payments(landlord_id, month)
        .await?;
    Ok(Json(json!({
        "status": "success",
        "landlord_id": landlord_id,
        "month": month,
        "rent_payments": payments,
    })))
}
