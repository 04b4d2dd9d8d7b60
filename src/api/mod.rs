//! HTTP surface: wallet, settlement and rent payment routes.

pub mod auth;
pub mod rent_payments;
pub mod settlements;
pub mod wallet;

use crate::error::{AppError, AppResult, ValidationError};
use crate::health::{HealthChecker, HealthState, HealthStatus};
use crate::middleware::error::error_handling_middleware;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::{RentAllocator, SettlementService, WalletService};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

#[derive(Clone)]
pub struct ApiState {
    pub wallet: Arc<WalletService>,
    pub settlements: Arc<SettlementService>,
    pub allocator: Arc<RentAllocator>,
    pub health: HealthChecker,
    pub currency: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .route("/api/wallet/add-funds", post(wallet::add_funds))
        .route("/api/wallet/remove-funds", post(wallet::remove_funds))
        .route("/api/wallet/balance", get(wallet::get_balance))
        .route("/api/wallet/pay-rent", post(wallet::pay_rent))
        .route("/api/settlements/stuck", get(settlements::list_stuck))
        .route(
            "/api/settlements/{reference}",
            get(settlements::settlement_status),
        )
        .route(
            "/api/settlements/{reference}/retry",
            post(settlements::retry_exhausted),
        )
        .route(
            "/api/tenants/{tenant_id}/rent-payments",
            get(rent_payments::tenant_rent_payments),
        )
        .route(
            "/api/landlords/{landlord_id}/rent-payments",
            get(rent_payments::landlord_rent_payments),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(axum::middleware::from_fn(error_handling_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// Unwraps a JSON body, turning axum's rejection into the failure envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        AppError::validation(ValidationError::MalformedBody {
            reason: rejection.body_text(),
        })
    })
}

async fn root() -> &'static str {
    "Rent wallet backend"
}

async fn health(
    State(state): State<ApiState>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    let health_status = state.health.check_health().await;

    if health_status.status == HealthState::Unhealthy {
        error!("❌ Health check failed - service unhealthy");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health_status)))
    } else {
        Ok(Json(health_status))
    }
}

/// Readiness probe - checks if the service is ready to accept traffic
async fn readiness(
    state: State<ApiState>,
) -> Result<Json<HealthStatus>, (StatusCode, Json<HealthStatus>)> {
    let result = health(state).await;
    if result.is_ok() {
        info!("✅ Readiness check passed");
    }
    result
}

/// Liveness probe - the process is up and serving
async fn liveness() -> &'static str {
    "OK"
}
