//! Operator endpoints for push-payment settlements.

use super::auth::Principal;
use super::ApiState;
use crate::error::AppResult;
use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::info;

pub async fn settlement_status(
    State(state): State<ApiState>,
    _principal: Principal,
    Path(reference): Path<String>,
) -> AppResult<Json<Value>> {
    let settlement = state.settlements.settlement_status(&reference).await?;
    Ok(Json(json!({
        "status": "success",
        "settlement": settlement,
    })))
}

pub async fn list_stuck(
    State(state): State<ApiState>,
    _principal: Principal,
) -> AppResult<Json<Value>> {
    let threshold = state.settlements.stuck_threshold();
    let stuck = state.settlements.list_stuck(threshold).await?;
    Ok(Json(json!({
        "status": "success",
        "threshold_seconds": threshold.as_secs(),
        "count": stuck.len(),
        "settlements": stuck,
    })))
}

pub async fn retry_exhausted(
    State(state): State<ApiState>,
    principal: Principal,
    Path(reference): Path<String>,
) -> AppResult<Json<Value>> {
    info!(
        reference = %reference,
        operator = %principal.user_id(),
        "Manual settlement retry requested"
    );
    let settlement = state.settlements.retry_exhausted(&reference).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Settlement re-queued for reconciliation",
        "settlement": settlement,
    })))
}
