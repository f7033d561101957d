//! Authenticated entry points: token resolution, ownership checks and
//! admin-only event registration.

#![allow(clippy::unwrap_used)]

mod common;

use common::Harness;
use seatbook::BookingApp;
use seatbook_core::booking::BookingStatus;
use seatbook_core::error::BookingError;
use seatbook_core::types::{EventId, UserId};
use seatbook_testing::{InMemoryEventCatalog, StaticAuthValidator};
use std::sync::Arc;

struct Fixture {
    app: BookingApp,
    catalog: InMemoryEventCatalog,
    user: UserId,
    other: UserId,
}

fn fixture() -> Fixture {
    let harness = Harness::new();
    let user = UserId::new();
    let other = UserId::new();
    let auth = StaticAuthValidator::new()
        .with_user("user-token", user)
        .with_user("other-token", other)
        .with_admin("admin-token", UserId::new());
    let catalog = InMemoryEventCatalog::new();
    let app = BookingApp::new(harness.coordinator, Arc::new(auth), Arc::new(catalog.clone()));
    Fixture {
        app,
        catalog,
        user,
        other,
    }
}

async fn open_event(f: &Fixture, seats: u32) -> EventId {
    let event_id = EventId::new();
    f.catalog.insert(event_id, seats);
    f.app.register_event("admin-token", event_id).await.unwrap();
    event_id
}

#[tokio::test]
async fn users_book_and_see_their_own_bookings() {
    let f = fixture();
    let event_id = open_event(&f, 10).await;

    let result = f
        .app
        .create_booking("user-token", "k1", &event_id.to_string(), 3)
        .await
        .unwrap();
    assert_eq!(result.status, BookingStatus::Confirmed);

    let booking = f
        .app
        .get_booking("user-token", &result.booking_id.to_string())
        .await
        .unwrap();
    assert_eq!(booking.user_id, f.user);

    let mine = f.app.list_my_bookings("user-token").await.unwrap();
    assert_eq!(mine.len(), 1);
    assert!(f.app.list_my_bookings("other-token").await.unwrap().is_empty());

    // Admins may look at anyone's booking
    assert!(
        f.app
            .get_booking("admin-token", &result.booking_id.to_string())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn other_users_cannot_read_a_booking() {
    let f = fixture();
    let event_id = open_event(&f, 10).await;
    let result = f
        .app
        .create_booking("user-token", "k1", &event_id.to_string(), 1)
        .await
        .unwrap();

    let err = f
        .app
        .get_booking("other-token", &result.booking_id.to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Unauthorized(_)));
    assert_ne!(f.other, f.user);
}

#[tokio::test]
async fn bad_tokens_and_malformed_input_are_rejected() {
    let f = fixture();
    let event_id = open_event(&f, 10).await;

    let err = f
        .app
        .create_booking("forged", "k1", &event_id.to_string(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Unauthorized(_)));

    let err = f
        .app
        .create_booking("user-token", "k1", "not-a-uuid", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));

    let err = f
        .app
        .create_booking("user-token", "", &event_id.to_string(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));

    let err = f.app.get_booking("user-token", "nope").await.unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));

    let err = f
        .app
        .get_booking("user-token", &seatbook_core::types::BookingId::new().to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::NotFound(_)));
}

#[tokio::test]
async fn only_admins_register_events() {
    let f = fixture();
    let event_id = EventId::new();
    f.catalog.insert(event_id, 5);

    let err = f.app.register_event("user-token", event_id).await.unwrap_err();
    assert!(matches!(err, BookingError::Unauthorized(_)));

    let inventory = f.app.register_event("admin-token", event_id).await.unwrap();
    assert_eq!(inventory.total_seats, 5);
    assert_eq!(inventory.available_seats, 5);

    // Twice is an error, not a reset
    let err = f.app.register_event("admin-token", event_id).await.unwrap_err();
    assert!(matches!(err, BookingError::Inventory(_)));

    let unknown = f
        .app
        .register_event("admin-token", EventId::new())
        .await
        .unwrap_err();
    assert!(matches!(unknown, BookingError::NotFound(_)));

    f.catalog.set_unavailable(true);
    let err = f
        .app
        .register_event("admin-token", EventId::new())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}
