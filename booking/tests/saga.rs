//! End-to-end behaviour of the booking saga: happy path, inventory
//! exhaustion, idempotent replay and concurrency.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{Harness, request};
use seatbook::{PublisherConfig, SagaConfig};
use seatbook_core::booking::{BookingStatus, FailureKind};
use seatbook_core::error::BookingError;
use seatbook_core::inventory::LedgerReason;
use seatbook_core::types::{EventId, Money, UserId};
use seatbook_testing::ScriptedPaymentGateway;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn book_exhaust_and_replay() {
    let harness = Harness::new();
    let event_id = harness.event(10).await;
    let user = UserId::new();

    let first = harness
        .coordinator
        .create_booking(request("k1", user, event_id, 3))
        .await
        .unwrap();
    assert_eq!(first.status, BookingStatus::Confirmed);
    assert!(first.reason.is_none());
    assert_eq!(harness.available(event_id).await, 7);

    let second = harness
        .coordinator
        .create_booking(request("k2", UserId::new(), event_id, 8))
        .await
        .unwrap();
    assert_eq!(second.status, BookingStatus::InventoryInsufficient);
    let reason = second.reason.unwrap();
    assert_eq!(reason.kind, FailureKind::InsufficientInventory);
    assert_eq!(reason.detail, "7 available, 8 requested");
    assert_eq!(harness.available(event_id).await, 7);

    let replay = harness
        .coordinator
        .create_booking(request("k1", user, event_id, 3))
        .await
        .unwrap();
    assert_eq!(replay, first);

    // One charge for the confirmed booking, none for the rejected one
    let charges = harness.payments.charges();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].booking_id, first.booking_id);
    assert_eq!(charges[0].amount, Money::from_dollars(150));

    let booking = harness.coordinator.get_booking(first.booking_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.seats, 3);
    assert!(booking.payment_transaction_id.is_some());
}

#[tokio::test]
async fn confirmed_booking_is_visible_in_history_and_audit_trail() {
    let harness = Harness::new();
    let event_id = harness.event(4).await;
    let user = UserId::new();

    let result = harness
        .coordinator
        .create_booking(request("k1", user, event_id, 2))
        .await
        .unwrap();

    let mine = harness.coordinator.list_bookings_by_user(user).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].booking_id, result.booking_id);

    let history = harness.coordinator.inventory().history(event_id).await.unwrap();
    let reserve = history
        .iter()
        .find(|entry| entry.reason == LedgerReason::Reserve)
        .unwrap();
    assert_eq!(reserve.booking_id, Some(result.booking_id));
    assert_eq!(reserve.delta, -2);
}

#[tokio::test]
async fn reusing_a_key_for_a_different_request_is_rejected() {
    let harness = Harness::new();
    let event_id = harness.event(10).await;
    let user = UserId::new();

    harness
        .coordinator
        .create_booking(request("k1", user, event_id, 3))
        .await
        .unwrap();
    let err = harness
        .coordinator
        .create_booking(request("k1", user, event_id, 4))
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::IdempotencyMismatch(_)));
    assert_eq!(harness.available(event_id).await, 7);
    assert_eq!(harness.payments.charge_count(), 1);
}

#[tokio::test]
async fn invalid_requests_never_reach_the_ledger() {
    let harness = Harness::new();
    let event_id = harness.event(10).await;
    let user = UserId::new();

    let err = harness
        .coordinator
        .create_booking(request("k1", user, event_id, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));
    assert!(harness.coordinator.list_bookings_by_user(user).await.unwrap().is_empty());

    // The key was never claimed
    let ok = harness
        .coordinator
        .create_booking(request("k1", user, event_id, 1))
        .await
        .unwrap();
    assert_eq!(ok.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn unknown_event_fails_without_charging() {
    let harness = Harness::new();
    let result = harness
        .coordinator
        .create_booking(request("k1", UserId::new(), EventId::new(), 1))
        .await
        .unwrap();

    assert_eq!(result.status, BookingStatus::Failed);
    assert_eq!(result.reason.unwrap().kind, FailureKind::EventNotFound);
    assert_eq!(harness.payments.charge_count(), 0);
}

#[tokio::test]
async fn ledger_outage_before_reserving_lets_the_client_retry() {
    let harness = Harness::new();
    let event_id = harness.event(5).await;
    let user = UserId::new();

    harness.ledger.fail_appends(true);
    let err = harness
        .coordinator
        .create_booking(request("k1", user, event_id, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Ledger(_)));
    assert!(err.is_retryable());
    assert_eq!(harness.available(event_id).await, 5);

    harness.ledger.heal();
    let result = harness
        .coordinator
        .create_booking(request("k1", user, event_id, 2))
        .await
        .unwrap();
    assert_eq!(result.status, BookingStatus::Confirmed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_never_oversell() {
    let harness = Arc::new(Harness::new());
    let event_id = harness.event(5).await;

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let harness = Arc::clone(&harness);
            tokio::spawn(async move {
                harness
                    .coordinator
                    .create_booking(request(&format!("k{i}"), UserId::new(), event_id, 1))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut confirmed = 0;
    let mut insufficient = 0;
    for task in tasks {
        let result = task.await.unwrap();
        match result.status {
            BookingStatus::Confirmed => confirmed += 1,
            BookingStatus::InventoryInsufficient => insufficient += 1,
            other => panic!("unexpected terminal status {other}: {:?}", result.reason),
        }
    }

    // A lost CAS implies someone else's reservation landed, and only five
    // can, so the retry budget is never exhausted here
    assert_eq!(confirmed, 5);
    assert_eq!(insufficient, 5);
    assert_eq!(harness.available(event_id).await, 0);
    assert_eq!(harness.payments.charge_count(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_run_one_saga() {
    let payments = ScriptedPaymentGateway::new().with_latency(Duration::from_millis(20));
    let harness = Arc::new(Harness::with_payments(payments));
    let event_id = harness.event(10).await;
    let user = UserId::new();

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let harness = Arc::clone(&harness);
            tokio::spawn(async move {
                harness
                    .coordinator
                    .create_booking(request("same-key", user, event_id, 2))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }

    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(results[0].status, BookingStatus::Confirmed);
    assert_eq!(harness.payments.charge_count(), 1);
    assert_eq!(harness.available(event_id).await, 8);
}

#[tokio::test]
async fn duplicate_gives_up_when_the_original_outlives_the_wait() {
    let payments = ScriptedPaymentGateway::new().with_latency(Duration::from_millis(150));
    let harness = Arc::new(Harness::build(
        payments,
        SagaConfig::for_tests().with_duplicate_wait(Duration::from_millis(20)),
        &PublisherConfig::for_tests(),
    ));
    let event_id = harness.event(10).await;
    let user = UserId::new();

    let original = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move {
            harness
                .coordinator
                .create_booking(request("k1", user, event_id, 1))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let err = harness
        .coordinator
        .create_booking(request("k1", user, event_id, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InFlight(_)));
    assert!(err.is_retryable());

    let result = original.await.unwrap().unwrap();
    assert_eq!(result.status, BookingStatus::Confirmed);
}
