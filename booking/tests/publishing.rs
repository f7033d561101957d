//! Confirmation fan-out: publish after confirm, dead-lettering on bus
//! outages and idempotent consumption of redeliveries.

#![allow(clippy::unwrap_used)]

mod common;

use common::{Harness, request};
use seatbook::{NotificationConsumer, PublisherConfig, SagaConfig};
use seatbook_core::booking::BookingStatus;
use seatbook_core::environment::Clock;
use seatbook_core::event::{BookingConfirmed, Event};
use seatbook_core::types::UserId;
use seatbook_testing::ScriptedPaymentGateway;
use std::sync::Arc;
use std::time::Duration;

async fn wait_for_notifications(consumer: &NotificationConsumer, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while consumer.notifications().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn confirmed_bookings_are_published_once() {
    let harness = Harness::new();
    let event_id = harness.event(10).await;
    let user = UserId::new();

    let result = harness
        .coordinator
        .create_booking(request("k1", user, event_id, 3))
        .await
        .unwrap();
    // Replays must not publish again
    harness
        .coordinator
        .create_booking(request("k1", user, event_id, 3))
        .await
        .unwrap();
    harness.coordinator.publisher().flush().await;

    let published = harness.bus.published();
    assert_eq!(published.len(), 1);
    let (topic, message) = &published[0];
    assert_eq!(topic, "booking-events");
    assert_eq!(
        message.correlation_id(),
        Some(result.booking_id.to_string().as_str())
    );

    let event = BookingConfirmed::from_bytes(&message.data).unwrap();
    assert_eq!(event.booking_id, result.booking_id);
    assert_eq!(event.user_id, user);
    assert_eq!(event.seats, 3);
    assert_eq!(event.status, BookingStatus::Confirmed);
    assert_eq!(event.timestamp, harness.clock.now());
}

#[tokio::test]
async fn failed_bookings_are_not_published() {
    let harness = Harness::with_payments(ScriptedPaymentGateway::always_declining(1));
    let event_id = harness.event(10).await;

    harness
        .coordinator
        .create_booking(request("k1", UserId::new(), event_id, 3))
        .await
        .unwrap();
    harness
        .coordinator
        .create_booking(request("k2", UserId::new(), event_id, 30))
        .await
        .unwrap();
    harness.coordinator.publisher().flush().await;

    assert!(harness.bus.published().is_empty());
    assert_eq!(harness.bus.publish_attempts(), 0);
}

#[tokio::test]
async fn bus_outage_dead_letters_without_touching_the_booking() {
    let publisher = PublisherConfig {
        publish_retries: 2,
        ..PublisherConfig::for_tests()
    };
    let harness = Harness::build(ScriptedPaymentGateway::new(), SagaConfig::for_tests(), &publisher);
    let event_id = harness.event(10).await;
    harness.bus.fail_always();

    let result = harness
        .coordinator
        .create_booking(request("k1", UserId::new(), event_id, 2))
        .await
        .unwrap();
    assert_eq!(result.status, BookingStatus::Confirmed);

    harness.coordinator.publisher().flush().await;
    assert_eq!(harness.bus.publish_attempts(), 3);
    assert_eq!(harness.status_of(result.booking_id).await, BookingStatus::Confirmed);
    assert_eq!(harness.available(event_id).await, 8);

    let dead = harness.coordinator.publisher().dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead.peek().unwrap().payload.booking_id, result.booking_id);

    // Bus is back: the operator replays the queue
    harness.bus.fail_next(0);
    assert_eq!(harness.coordinator.publisher().redeliver_dead_letters().await, 1);
    assert!(dead.is_empty());
    assert_eq!(harness.bus.published().len(), 1);
}

#[tokio::test]
async fn consumer_deduplicates_redeliveries() {
    let harness = Harness::new();
    let event_id = harness.event(10).await;
    let consumer = Arc::new(NotificationConsumer::new());
    let task = Arc::clone(&consumer)
        .start(&harness.bus, harness.coordinator.publisher().topic())
        .await
        .unwrap();

    let first = harness
        .coordinator
        .create_booking(request("k1", UserId::new(), event_id, 1))
        .await
        .unwrap();
    let second = harness
        .coordinator
        .create_booking(request("k2", UserId::new(), event_id, 2))
        .await
        .unwrap();
    harness.coordinator.publisher().flush().await;
    wait_for_notifications(&consumer, 2).await;

    // At-least-once: the broker hands the first confirmation out again
    let (topic, message) = harness.bus.published()[0].clone();
    harness.bus.redeliver(&topic, message);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let notifications = consumer.notifications();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0].booking_id, first.booking_id);
    assert_eq!(notifications[1].booking_id, second.booking_id);
    assert_eq!(notifications[1].seats, 2);

    task.abort();
}
