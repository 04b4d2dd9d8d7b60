//! HTTP handler tests over the full router and middleware stack

mod common;

use axum::{body::Body, Router};
use chrono::Utc;
use common::*;
use http::{HeaderMap, Request, StatusCode};
use rentwallet_backend::api;
use rentwallet_backend::money::Amount;
use rentwallet_backend::payments::types::GatewayStatus;
use serde_json::{json, Value};
use tower::util::ServiceExt;

fn app(harness: &Harness) -> Router {
    api::router(harness.components.api_state(None))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, user: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-user-id", user)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let harness = Harness::new();
    let (status, headers, body) = send(&app(&harness), get("/api/wallet/balance", None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert_eq!(body["retryable"], false);
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(
        body["request_id"].as_str(),
        headers["x-request-id"].to_str().ok()
    );
}

#[tokio::test]
async fn balance_reports_minor_units_as_decimal() {
    let harness = Harness::new();
    harness
        .components
        .ledger
        .credit("owner-1", Amount::from_minor(123_450))
        .await
        .unwrap();

    let (status, _, body) = send(&app(&harness), get("/api/wallet/balance", Some("owner-1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "success", "balance": "1234.50", "currency": "KES"})
    );
}

#[tokio::test]
async fn add_funds_initiates_push() {
    let harness = Harness::new();

    let (status, _, body) = send(
        &app(&harness),
        post(
            "/api/wallet/add-funds",
            "owner-1",
            json!({"amount": 500, "phone": PHONE}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["amount"], "500.00");
    assert!(body["reference"].as_str().unwrap().starts_with("ws_CO_"));
    assert_eq!(harness.queue.len(), 1);
}

#[tokio::test]
async fn remove_funds_overdraft_is_a_client_error() {
    let harness = Harness::new();
    harness
        .components
        .ledger
        .credit("owner-1", Amount::from_major(10))
        .await
        .unwrap();

    let (status, _, body) = send(
        &app(&harness),
        post("/api/wallet/remove-funds", "owner-1", json!({"amount": "25.00"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error"], "INSUFFICIENT_BALANCE");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn malformed_body_uses_failure_envelope() {
    let harness = Harness::new();

    let (status, _, body) = send(
        &app(&harness),
        post("/api/wallet/remove-funds", "owner-1", json!({"amount": "1.234"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn wallet_rent_returns_split_details() {
    let harness = Harness::with_tenant(Utc::now().date_naive());
    harness
        .components
        .ledger
        .credit(TENANT_USER, Amount::from_major(1000))
        .await
        .unwrap();

    let (status, _, body) = send(
        &app(&harness),
        post(
            "/api/wallet/pay-rent",
            TENANT_USER,
            json!({"amount": 1000, "payment_channel": "wallet"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Rent paid successfully!");
    assert_eq!(
        body["details"],
        json!({
            "total_paid": "1000.00",
            "service_fee": "75.00",
            "landlord_receives": "925.00",
        })
    );
    assert_eq!(body["balance"], "0.00");
}

#[tokio::test]
async fn push_rent_accepts_camel_case_channel() {
    let harness = Harness::with_tenant(Utc::now().date_naive());

    let (status, _, body) = send(
        &app(&harness),
        post(
            "/api/wallet/pay-rent",
            TENANT_USER,
            json!({"amount": 1000, "paymentChannel": "mpesa", "phone": PHONE}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Rent payment initiated successfully!");
    assert_eq!(body["details"]["landlord_receives"], "925.00");
    let reference = body["reference"].as_str().unwrap().to_string();

    let (status, _, body) = send(
        &app(&harness),
        get(&format!("/api/settlements/{}", reference), Some("operator")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settlement"]["state"], "initiated");
    assert_eq!(body["settlement"]["purpose"], "rent");
}

#[tokio::test]
async fn unknown_settlement_echoes_request_id() {
    let harness = Harness::new();
    let request = Request::builder()
        .uri("/api/settlements/ws_CO_missing")
        .header("x-user-id", "operator")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();

    let (status, headers, body) = send(&app(&harness), request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "SETTLEMENT_NOT_FOUND");
    assert_eq!(body["request_id"], "req-123");
    assert_eq!(headers["x-request-id"], "req-123");
}

#[tokio::test]
async fn operator_can_list_and_retry_exhausted_settlements() {
    let harness = Harness::new();
    let reference = harness
        .components
        .wallet
        .add_funds("owner-1", PHONE, Amount::from_major(300))
        .await
        .unwrap()
        .reference;
    harness.drain().await;
    let app = app(&harness);

    let (status, _, body) = send(&app, get("/api/settlements/stuck", Some("operator"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["settlements"][0]["reference"], reference.as_str());
    assert_eq!(body["settlements"][0]["state"], "exhausted");

    let (status, _, body) = send(
        &app,
        post(
            &format!("/api/settlements/{}/retry", reference),
            "operator",
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settlement"]["state"], "initiated");
    assert_eq!(body["settlement"]["manual_retries"], 1);

    harness.gateway.script([GatewayStatus::Success]);
    harness.drain().await;

    let (status, _, body) = send(
        &app,
        post(
            &format!("/api/settlements/{}/retry", reference),
            "operator",
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "INVALID_SETTLEMENT_STATE");
}

#[tokio::test]
async fn landlord_rent_payments_reject_bad_month() {
    let harness = Harness::new();

    let (status, _, body) = send(
        &app(&harness),
        get("/api/landlords/3/rent-payments?month=2024-13", Some("landlord")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn tenant_rent_payments_lists_history() {
    let harness = Harness::with_tenant(Utc::now().date_naive());
    harness
        .components
        .ledger
        .credit(TENANT_USER, Amount::from_major(1000))
        .await
        .unwrap();
    let app = app(&harness);
    send(
        &app,
        post(
            "/api/wallet/pay-rent",
            TENANT_USER,
            json!({"amount": 1000, "payment_channel": "wallet"}),
        ),
    )
    .await;

    let (status, _, body) = send(
        &app,
        get(&format!("/api/tenants/{}/rent-payments", TENANT_ID), Some(TENANT_USER)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let payments = body["rent_payments"].as_array().unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0]["method"], "wallet");
    assert_eq!(payments[0]["service_fee"], "75.00");
}

#[tokio::test]
async fn health_is_ok_on_in_memory_backend() {
    let harness = Harness::new();

    let (status, _, body) = send(&app(&harness), get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Healthy");

    let (status, _, _) = send(&app(&harness), get("/health/live", None)).await;
    assert_eq!(status, StatusCode::OK);
}
