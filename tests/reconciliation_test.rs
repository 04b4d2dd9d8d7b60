//! Reconciliation worker driven job by job through a recording queue

mod common;

use chrono::Utc;
use common::*;
use rentwallet_backend::calendar::RentMonth;
use rentwallet_backend::database::posting_repository::{Confirmation, ConfirmationOutcome};
use rentwallet_backend::database::rent_payment_repository::PaymentChannel;
use rentwallet_backend::database::repository::{
    PostingRepository, RentPaymentRepository, SettlementRepository,
};
use rentwallet_backend::database::settlement_repository::{
    NewSettlement, RentTerms, SettlementState,
};
use rentwallet_backend::error::ErrorCode;
use rentwallet_backend::money::Amount;
use rentwallet_backend::payments::error::PaymentError;
use rentwallet_backend::payments::types::GatewayStatus;
use rentwallet_backend::services::wallet::{PayRentRequest, RentReceipt};
use rentwallet_backend::workers::reconciliation::JobOutcome;
use rentwallet_backend::workers::settlement_queue::SettlementJob;
use std::time::Duration;

async fn top_up(harness: &Harness, owner: &str, major: i64) -> String {
    harness
        .components
        .wallet
        .add_funds(owner, PHONE, Amount::from_major(major))
        .await
        .unwrap()
        .reference
}

async fn push_rent(harness: &Harness, major: i64) -> String {
    let receipt = harness
        .components
        .wallet
        .pay_rent(
            TENANT_USER,
            PayRentRequest {
                amount: Amount::from_major(major),
                channel: PaymentChannel::GatewayPush,
                phone: Some(PHONE.to_string()),
            },
        )
        .await
        .unwrap();
    let RentReceipt::Pending { reference, .. } = receipt else {
        panic!("push rent should be pending");
    };
    reference
}

async fn settlement(harness: &Harness, reference: &str) -> rentwallet_backend::database::settlement_repository::PendingSettlement {
    SettlementRepository::find(harness.store.as_ref(), reference)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn top_up_confirms_after_two_pending_polls() {
    let harness = Harness::new();
    harness.gateway.script([
        GatewayStatus::Pending,
        GatewayStatus::Pending,
        GatewayStatus::Success,
    ]);
    let reference = top_up(&harness, "owner-1", 500).await;

    let first = harness.run_next_job().await.unwrap();
    assert_eq!(first, JobOutcome::Rescheduled { attempt: 1 });
    let (job, delay) = harness.queue.pop().unwrap();
    assert_eq!(job, SettlementJob::new(&reference, 1));
    assert_eq!(delay, Duration::from_secs(60));
    // Nothing is credited while the gateway is still pending.
    assert_eq!(
        harness.components.ledger.balance_of("owner-1").await.unwrap(),
        Amount::ZERO
    );

    let second = harness.components.worker.process(job).await.unwrap();
    assert_eq!(second, JobOutcome::Rescheduled { attempt: 2 });
    assert_eq!(harness.drain().await, vec![JobOutcome::Confirmed]);

    assert_eq!(
        harness.components.ledger.balance_of("owner-1").await.unwrap(),
        Amount::from_major(500)
    );
    let row = settlement(&harness, &reference).await;
    assert_eq!(row.state, SettlementState::Confirmed);
    assert_eq!(row.attempt, 3);
    assert!(row.resolved_at.is_some());
    assert_eq!(harness.gateway.polls(), 3);
    assert_eq!(
        harness.notifier.resolved(),
        vec![(reference, SettlementState::Confirmed)]
    );
}

#[tokio::test]
async fn duplicate_confirmation_credits_once() {
    let harness = Harness::new();
    harness.gateway.script([GatewayStatus::Success, GatewayStatus::Success]);
    let reference = top_up(&harness, "owner-1", 500).await;

    assert_eq!(harness.drain().await, vec![JobOutcome::Confirmed]);

    // A redelivered job for the resolved reference is swallowed.
    let replay = harness
        .components
        .worker
        .process(SettlementJob::new(&reference, 1))
        .await
        .unwrap();
    assert_eq!(replay, JobOutcome::Duplicate);

    // So is a second posting against the original attempt.
    let outcome = harness
        .store
        .commit_confirmation(Confirmation {
            reference: reference.clone(),
            expected_attempt: 0,
            attempt: 1,
            credit_owner_id: "owner-1".to_string(),
            credit_amount: Amount::from_major(500),
            rent_payment: None,
        })
        .await
        .unwrap();
    assert!(matches!(outcome, ConfirmationOutcome::AlreadyResolved));

    assert_eq!(
        harness.components.ledger.balance_of("owner-1").await.unwrap(),
        Amount::from_major(500)
    );
    assert_eq!(harness.gateway.polls(), 1);
}

#[tokio::test]
async fn exhausts_after_five_inconclusive_polls_without_touching_wallet() {
    let harness = Harness::new();
    let reference = top_up(&harness, "owner-1", 500).await;

    let outcomes = harness.drain().await;
    assert_eq!(
        outcomes,
        vec![
            JobOutcome::Rescheduled { attempt: 1 },
            JobOutcome::Rescheduled { attempt: 2 },
            JobOutcome::Rescheduled { attempt: 3 },
            JobOutcome::Rescheduled { attempt: 4 },
            JobOutcome::Exhausted,
        ]
    );
    assert_eq!(harness.gateway.polls(), 5);

    let row = settlement(&harness, &reference).await;
    assert_eq!(row.state, SettlementState::Exhausted);
    assert_eq!(row.attempt, 5);
    assert_eq!(row.last_error.as_deref(), Some("pending"));
    assert_eq!(
        harness.components.ledger.balance_of("owner-1").await.unwrap(),
        Amount::ZERO
    );
    assert_eq!(
        harness.notifier.resolved(),
        vec![(reference, SettlementState::Exhausted)]
    );
}

#[tokio::test]
async fn gateway_errors_count_as_inconclusive_polls() {
    let harness = Harness::new();
    harness.gateway.script_error(PaymentError::Unreachable {
        message: "timeout".to_string(),
    });
    harness.gateway.script([GatewayStatus::Unknown("queued".to_string())]);
    harness.gateway.script([GatewayStatus::Success]);
    let reference = top_up(&harness, "owner-1", 120).await;

    assert_eq!(
        harness.drain().await,
        vec![
            JobOutcome::Rescheduled { attempt: 1 },
            JobOutcome::Rescheduled { attempt: 2 },
            JobOutcome::Confirmed,
        ]
    );
    assert_eq!(settlement(&harness, &reference).await.attempt, 3);
}

#[tokio::test]
async fn failed_payment_resolves_without_credit() {
    let harness = Harness::new();
    harness.gateway.script([GatewayStatus::Failed]);
    let reference = top_up(&harness, "owner-1", 500).await;

    assert_eq!(harness.drain().await, vec![JobOutcome::Failed]);

    let row = settlement(&harness, &reference).await;
    assert_eq!(row.state, SettlementState::Failed);
    assert_eq!(row.attempt, 1);
    assert_eq!(
        harness.components.ledger.balance_of("owner-1").await.unwrap(),
        Amount::ZERO
    );
}

#[tokio::test]
async fn stale_jobs_are_dropped() {
    let harness = Harness::new();
    let reference = top_up(&harness, "owner-1", 500).await;

    assert_eq!(
        harness.run_next_job().await,
        Some(JobOutcome::Rescheduled { attempt: 1 })
    );
    let stale = harness
        .components
        .worker
        .process(SettlementJob::new(&reference, 0))
        .await
        .unwrap();
    assert_eq!(stale, JobOutcome::Stale);
    assert_eq!(harness.gateway.polls(), 1);
}

#[tokio::test]
async fn unknown_reference_is_reported_missing() {
    let harness = Harness::new();

    let outcome = harness
        .components
        .worker
        .process(SettlementJob::new("ws_CO_unknown", 0))
        .await
        .unwrap();
    assert_eq!(outcome, JobOutcome::Missing);
}

#[tokio::test]
async fn push_rent_confirmation_credits_landlord_net_and_records_payment() {
    let harness = Harness::with_tenant(Utc::now().date_naive());
    harness.gateway.script([GatewayStatus::Success]);
    let reference = push_rent(&harness, 1000).await;

    assert_eq!(harness.drain().await, vec![JobOutcome::Confirmed]);

    assert_eq!(
        harness
            .components
            .ledger
            .balance_of(LANDLORD_USER)
            .await
            .unwrap(),
        Amount::from_major(925)
    );
    let payments = harness.store.list_for_tenant(TENANT_ID).await.unwrap();
    assert_eq!(payments.len(), 1);
    let payment = &payments[0];
    assert_eq!(payment.method, PaymentChannel::GatewayPush);
    assert_eq!(payment.external_reference.as_deref(), Some(reference.as_str()));
    assert_eq!(payment.amount, Amount::from_major(1000));
    assert_eq!(payment.service_fee, Amount::from_major(75));
    assert_eq!(payment.landlord_amount, Amount::from_major(925));
    assert_eq!(payment.month, RentMonth::of(Utc::now().date_naive()));
}

#[tokio::test]
async fn duplicate_rent_confirmation_credits_landlord_once() {
    let harness = Harness::with_tenant(Utc::now().date_naive());
    harness.gateway.script([GatewayStatus::Success, GatewayStatus::Success]);
    let reference = push_rent(&harness, 1000).await;

    assert_eq!(harness.drain().await, vec![JobOutcome::Confirmed]);

    // Redelivery of the original job after the confirmation landed.
    let replay = harness
        .components
        .worker
        .process(SettlementJob::new(&reference, 0))
        .await
        .unwrap();
    assert_eq!(replay, JobOutcome::Duplicate);

    assert_eq!(
        harness
            .components
            .ledger
            .balance_of(LANDLORD_USER)
            .await
            .unwrap(),
        Amount::from_major(925)
    );
    assert_eq!(harness.store.list_for_tenant(TENANT_ID).await.unwrap().len(), 1);
    assert_eq!(harness.gateway.polls(), 1);
    assert_eq!(
        harness.notifier.resolved(),
        vec![(reference, SettlementState::Confirmed)]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deliveries_of_one_rent_job_confirm_once() {
    let harness = Harness::with_tenant(Utc::now().date_naive());
    harness.gateway.script([
        GatewayStatus::Success,
        GatewayStatus::Success,
        GatewayStatus::Success,
    ]);
    let reference = push_rent(&harness, 1000).await;
    let (job, _delay) = harness.queue.pop().unwrap();

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let worker = harness.components.worker.clone();
            let job = job.clone();
            tokio::spawn(async move { worker.process(job).await.unwrap() })
        })
        .collect();
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    let confirmed = outcomes
        .iter()
        .filter(|o| **o == JobOutcome::Confirmed)
        .count();
    let duplicates = outcomes
        .iter()
        .filter(|o| **o == JobOutcome::Duplicate)
        .count();
    assert_eq!((confirmed, duplicates), (1, 2), "outcomes: {:?}", outcomes);

    assert_eq!(
        harness
            .components
            .ledger
            .balance_of(LANDLORD_USER)
            .await
            .unwrap(),
        Amount::from_major(925)
    );
    let payments = harness.store.list_for_tenant(TENANT_ID).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].external_reference.as_deref(), Some(reference.as_str()));
    assert_eq!(settlement(&harness, &reference).await.state, SettlementState::Confirmed);
    assert_eq!(harness.queue.len(), 0);
}

#[tokio::test]
async fn confirmed_rent_for_vanished_tenant_is_exhausted() {
    let harness = Harness::new();
    harness.gateway.script([GatewayStatus::Success]);
    harness
        .store
        .insert(NewSettlement {
            reference: "ws_CO_orphan".to_string(),
            payer_id: "gone-user".to_string(),
            payer_phone: "254712345678".to_string(),
            gross_amount: Amount::from_major(1000),
            rent: Some(RentTerms {
                tenant_id: 999,
                landlord_id: LANDLORD_ID,
                landlord_owner_id: LANDLORD_USER.to_string(),
                service_fee: Amount::from_major(75),
                net_landlord_amount: Amount::from_major(925),
            }),
        })
        .await
        .unwrap();

    let outcome = harness
        .components
        .worker
        .process(SettlementJob::new("ws_CO_orphan", 0))
        .await
        .unwrap();

    assert_eq!(outcome, JobOutcome::Exhausted);
    let row = settlement(&harness, "ws_CO_orphan").await;
    assert_eq!(row.state, SettlementState::Exhausted);
    assert!(row.last_error.unwrap().contains("tenant 999"));
    assert!(harness
        .components
        .ledger
        .balance_of(LANDLORD_USER)
        .await
        .is_err());
}

#[tokio::test]
async fn operator_retry_restarts_an_exhausted_settlement() {
    let harness = Harness::new();
    let reference = top_up(&harness, "owner-1", 300).await;
    harness.drain().await;

    let restarted = harness
        .components
        .settlements
        .retry_exhausted(&reference)
        .await
        .unwrap();
    assert_eq!(restarted.state, SettlementState::Initiated);
    assert_eq!(restarted.attempt, 0);
    assert_eq!(restarted.manual_retries, 1);

    harness.gateway.script([GatewayStatus::Success]);
    assert_eq!(harness.drain().await, vec![JobOutcome::Confirmed]);
    assert_eq!(
        harness.components.ledger.balance_of("owner-1").await.unwrap(),
        Amount::from_major(300)
    );

    let err = harness
        .components
        .settlements
        .retry_exhausted(&reference)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidSettlementState);
    assert_eq!(err.status_code(), 409);
}

#[tokio::test]
async fn status_of_unknown_settlement_is_not_found() {
    let harness = Harness::new();

    let err = harness
        .components
        .settlements
        .settlement_status("ws_CO_missing")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::SettlementNotFound);
}

#[tokio::test]
async fn stuck_listing_includes_exhausted_but_not_fresh_live_rows() {
    let harness = Harness::new();
    let exhausted = top_up(&harness, "owner-1", 100).await;
    harness.drain().await;
    let fresh = top_up(&harness, "owner-2", 100).await;

    let stuck = harness
        .components
        .settlements
        .list_stuck(Duration::from_secs(3600))
        .await
        .unwrap();
    let references: Vec<_> = stuck.iter().map(|s| s.reference.as_str()).collect();
    assert_eq!(references, vec![exhausted.as_str()]);
    assert!(!references.contains(&fresh.as_str()));

    let alerts = harness.components.stuck_monitor().scan().await.unwrap();
    assert_eq!(alerts, 1);
}

#[tokio::test]
async fn startup_recovery_requeues_live_settlements() {
    let harness = Harness::new();
    let reference = top_up(&harness, "owner-1", 100).await;
    // Simulate a restart: the in-flight job is lost.
    harness.queue.pop();

    let recovered = harness.components.worker.recover_live().await.unwrap();
    assert_eq!(recovered, 1);
    let (job, _) = harness.queue.pop().unwrap();
    assert_eq!(job, SettlementJob::new(&reference, 0));
}
