//! Wallet entry points against the in-memory store

mod common;

use chrono::Utc;
use common::*;
use rentwallet_backend::calendar::RentMonth;
use rentwallet_backend::database::rent_payment_repository::PaymentChannel;
use rentwallet_backend::database::repository::{RentPaymentRepository, SettlementRepository};
use rentwallet_backend::database::settlement_repository::{SettlementPurpose, SettlementState};
use rentwallet_backend::error::{ErrorCode, ValidationError};
use rentwallet_backend::error::AppErrorKind;
use rentwallet_backend::money::Amount;
use rentwallet_backend::payments::error::PaymentError;
use rentwallet_backend::services::wallet::{PayRentRequest, RentReceipt};
use std::time::Duration;

fn today() -> chrono::NaiveDate {
    Utc::now().date_naive()
}

#[tokio::test]
async fn credit_and_debit_round_trip() {
    let harness = Harness::new();
    let ledger = &harness.components.ledger;

    ledger.credit("owner-1", Amount::from_major(500)).await.unwrap();
    let wallet = ledger.debit("owner-1", Amount::from_major(200)).await.unwrap();
    assert_eq!(wallet.balance, Amount::from_major(300));

    ledger.credit("owner-1", Amount::from_major(200)).await.unwrap();
    assert_eq!(
        ledger.balance_of("owner-1").await.unwrap(),
        Amount::from_major(500)
    );
}

#[tokio::test]
async fn overdraft_is_rejected_without_changing_balance() {
    let harness = Harness::new();
    let wallet = &harness.components.wallet;
    harness
        .components
        .ledger
        .credit("owner-1", Amount::from_major(100))
        .await
        .unwrap();

    let err = wallet
        .remove_funds("owner-1", Amount::from_major(150))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), ErrorCode::InsufficientBalance);
    assert_eq!(err.status_code(), 400);
    assert!(!err.is_retryable());
    assert_eq!(
        wallet.get_balance("owner-1").await.unwrap(),
        Amount::from_major(100)
    );
}

#[tokio::test]
async fn balance_of_unknown_owner_is_not_found() {
    let harness = Harness::new();

    let err = harness
        .components
        .wallet
        .get_balance("nobody")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::WalletNotFound);
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn wallet_rent_payment_moves_net_to_landlord() {
    let harness = Harness::with_tenant(today());
    let ledger = &harness.components.ledger;
    ledger
        .credit(TENANT_USER, Amount::from_major(1000))
        .await
        .unwrap();

    let receipt = harness
        .components
        .wallet
        .pay_rent(
            TENANT_USER,
            PayRentRequest {
                amount: Amount::from_major(1000),
                channel: PaymentChannel::Wallet,
                phone: None,
            },
        )
        .await
        .unwrap();

    let RentReceipt::Paid {
        payment,
        split,
        payer_balance,
    } = receipt
    else {
        panic!("wallet rent should settle synchronously");
    };
    assert_eq!(payer_balance, Amount::ZERO);
    assert_eq!(split.service_fee, Amount::from_major(75));
    assert_eq!(split.net, Amount::from_major(925));
    assert_eq!(payment.month, RentMonth::of(today()));
    assert_eq!(payment.method, PaymentChannel::Wallet);
    assert_eq!(payment.external_reference, None);

    assert_eq!(ledger.balance_of(TENANT_USER).await.unwrap(), Amount::ZERO);
    assert_eq!(
        ledger.balance_of(LANDLORD_USER).await.unwrap(),
        Amount::from_major(925)
    );
    assert!(harness.gateway.initiations().is_empty());
}

#[tokio::test]
async fn underfunded_wallet_rent_changes_nothing() {
    let harness = Harness::with_tenant(today());
    let ledger = &harness.components.ledger;
    ledger
        .credit(TENANT_USER, Amount::from_major(400))
        .await
        .unwrap();

    let err = harness
        .components
        .wallet
        .pay_rent(
            TENANT_USER,
            PayRentRequest {
                amount: Amount::from_major(1000),
                channel: PaymentChannel::Wallet,
                phone: None,
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), ErrorCode::InsufficientBalance);
    assert_eq!(
        ledger.balance_of(TENANT_USER).await.unwrap(),
        Amount::from_major(400)
    );
    assert!(ledger.balance_of(LANDLORD_USER).await.is_err());
    assert!(harness
        .store
        .list_for_tenant(TENANT_ID)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn rent_for_unknown_tenant_is_rejected() {
    let harness = Harness::new();

    let err = harness
        .components
        .wallet
        .pay_rent(
            "stranger",
            PayRentRequest {
                amount: Amount::from_major(1000),
                channel: PaymentChannel::Wallet,
                phone: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::TenantNotFound);
}

#[tokio::test]
async fn push_rent_requires_a_phone() {
    let harness = Harness::with_tenant(today());

    let err = harness
        .components
        .wallet
        .pay_rent(
            TENANT_USER,
            PayRentRequest {
                amount: Amount::from_major(1000),
                channel: PaymentChannel::GatewayPush,
                phone: Some("  ".to_string()),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err.kind,
        AppErrorKind::Validation(ValidationError::MissingField { ref field }) if field == "phone"
    ));
    assert!(harness.gateway.initiations().is_empty());
}

#[tokio::test]
async fn push_rent_records_pending_settlement_with_split() {
    let harness = Harness::with_tenant(today());

    let receipt = harness
        .components
        .wallet
        .pay_rent(
            TENANT_USER,
            PayRentRequest {
                amount: Amount::from_major(1000),
                channel: PaymentChannel::GatewayPush,
                phone: Some(PHONE.to_string()),
            },
        )
        .await
        .unwrap();

    let RentReceipt::Pending { reference, split } = receipt else {
        panic!("push rent should be pending");
    };
    assert_eq!(split.net, Amount::from_major(925));

    let settlement = SettlementRepository::find(harness.store.as_ref(), &reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settlement.state, SettlementState::Initiated);
    assert_eq!(settlement.purpose, SettlementPurpose::Rent);
    assert_eq!(settlement.payer_phone, "254712345678");
    let rent = settlement.rent.unwrap();
    assert_eq!(rent.landlord_owner_id, LANDLORD_USER);
    assert_eq!(rent.service_fee, Amount::from_major(75));

    let (job, delay) = harness.queue.pop().unwrap();
    assert_eq!(job.reference, reference);
    assert_eq!(job.attempt, 0);
    assert_eq!(delay, Duration::ZERO);

    let request = &harness.gateway.initiations()[0];
    assert_eq!(request.payer_ref, TENANT_USER);
    assert_eq!(request.amount, Amount::from_major(1000));
}

#[tokio::test]
async fn add_funds_creates_wallet_and_tracks_push() {
    let harness = Harness::new();

    let receipt = harness
        .components
        .wallet
        .add_funds("owner-9", "+254 712-345-678", Amount::from_major(250))
        .await
        .unwrap();

    assert_eq!(
        harness.components.wallet.get_balance("owner-9").await.unwrap(),
        Amount::ZERO
    );
    let settlement = SettlementRepository::find(harness.store.as_ref(), &receipt.reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settlement.purpose, SettlementPurpose::WalletTopUp);
    assert_eq!(settlement.gross_amount, Amount::from_major(250));
    assert_eq!(harness.queue.len(), 1);
}

#[tokio::test]
async fn invalid_phone_is_rejected_before_the_gateway() {
    let harness = Harness::new();

    let err = harness
        .components
        .wallet
        .add_funds("owner-9", "12345", Amount::from_major(250))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), ErrorCode::InitiationRejected);
    assert!(harness.gateway.initiations().is_empty());
    assert_eq!(harness.queue.len(), 0);
}

#[tokio::test]
async fn gateway_outage_is_retryable_and_leaves_no_settlement() {
    let harness = Harness::new();
    harness.gateway.fail_initiation_with(PaymentError::Unreachable {
        message: "connection refused".to_string(),
    });

    let err = harness
        .components
        .wallet
        .add_funds("owner-9", PHONE, Amount::from_major(250))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), ErrorCode::GatewayUnavailable);
    assert!(err.is_retryable());
    assert!(harness.store.list_live().await.unwrap().is_empty());
}

#[tokio::test]
async fn zero_amount_is_a_validation_error() {
    let harness = Harness::new();

    let err = harness
        .components
        .wallet
        .add_funds("owner-9", PHONE, Amount::ZERO)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::ValidationError);
}
