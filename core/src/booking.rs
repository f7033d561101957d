//! Booking records and the saga state machine they move through.

use crate::types::{BookingId, EventId, IdempotencyKey, TransactionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Saga state of a booking.
///
/// ```text
/// Created → ReservingSeats → PaymentPending → SeatsReserved → Confirmed
///                  │               │                │
///                  │               └→ PaymentFailed → Failed
///                  ├→ InventoryInsufficient          └→ Compensated
///                  └→ Failed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    /// Request accepted, nothing reserved yet
    Created,
    /// Inventory reservation in progress
    ReservingSeats,
    /// Seats held, charge in progress
    PaymentPending,
    /// Seats held and charge captured, confirmation not yet recorded
    SeatsReserved,
    /// Booking complete
    Confirmed,
    /// Charge failed, compensation pending
    PaymentFailed,
    /// Not enough seats were available
    InventoryInsufficient,
    /// Saga failed (seats released if they had been held)
    Failed,
    /// Charge refunded and seats released after a late failure
    Compensated,
}

impl BookingStatus {
    /// Stable lowercase name for logs, metrics labels and wire formats
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ReservingSeats => "reserving_seats",
            Self::PaymentPending => "payment_pending",
            Self::SeatsReserved => "seats_reserved",
            Self::Confirmed => "confirmed",
            Self::PaymentFailed => "payment_failed",
            Self::InventoryInsufficient => "inventory_insufficient",
            Self::Failed => "failed",
            Self::Compensated => "compensated",
        }
    }

    /// Terminal states never change again
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::Failed | Self::InventoryInsufficient | Self::Compensated
        )
    }

    /// Whether a saga may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        use BookingStatus::{
            Compensated, Confirmed, Created, Failed, InventoryInsufficient, PaymentFailed,
            PaymentPending, ReservingSeats, SeatsReserved,
        };
        matches!(
            (self, next),
            (Created, ReservingSeats | Failed)
                | (ReservingSeats, PaymentPending | InventoryInsufficient | Failed)
                | (PaymentPending, SeatsReserved | PaymentFailed | Failed | Compensated)
                | (SeatsReserved, Confirmed | Compensated)
                | (PaymentFailed, Failed)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A booking attempt and its outcome. Rows are never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Unique booking identifier
    pub booking_id: BookingId,
    /// Caller-supplied deduplication key (unique across bookings)
    pub idempotency_key: IdempotencyKey,
    /// Who is booking
    pub user_id: UserId,
    /// Which event
    pub event_id: EventId,
    /// Number of seats (at least one)
    pub seats: u32,
    /// Current saga state
    pub status: BookingStatus,
    /// Gateway transaction, once a charge succeeded
    pub payment_transaction_id: Option<TransactionId>,
    /// Why the booking did not confirm, for non-confirmed terminal states
    pub failure: Option<FailureReason>,
    /// When the request entered the saga
    pub created_at: DateTime<Utc>,
    /// Last state change
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Creates a new booking in the `Created` state
    #[must_use]
    pub const fn new(
        booking_id: BookingId,
        idempotency_key: IdempotencyKey,
        user_id: UserId,
        event_id: EventId,
        seats: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            booking_id,
            idempotency_key,
            user_id,
            event_id,
            seats,
            status: BookingStatus::Created,
            payment_transaction_id: None,
            failure: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// The request this booking was created from
    #[must_use]
    pub fn request(&self) -> BookingRequest {
        BookingRequest::new(
            self.idempotency_key.clone(),
            self.user_id,
            self.event_id,
            self.seats,
        )
    }

    /// The caller-facing view of this booking
    #[must_use]
    pub fn result(&self) -> BookingResult {
        BookingResult {
            booking_id: self.booking_id,
            status: self.status,
            reason: self.failure.clone(),
        }
    }
}

/// A booking request after authentication, before validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Deduplication key
    pub idempotency_key: IdempotencyKey,
    /// Resolved user
    pub user_id: UserId,
    /// Event to book
    pub event_id: EventId,
    /// Requested seat count
    pub seats: u32,
}

impl BookingRequest {
    /// Creates a new `BookingRequest`
    #[must_use]
    pub const fn new(
        idempotency_key: IdempotencyKey,
        user_id: UserId,
        event_id: EventId,
        seats: u32,
    ) -> Self {
        Self {
            idempotency_key,
            user_id,
            event_id,
            seats,
        }
    }

    /// Fingerprint of the payload, used to detect key reuse with a different request
    #[must_use]
    pub fn fingerprint(&self) -> String {
        format!("{}:{}:{}", self.user_id, self.event_id, self.seats)
    }
}

/// Outcome of `CreateBooking` as returned to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingResult {
    /// The booking this request resolved to
    pub booking_id: BookingId,
    /// Terminal status
    pub status: BookingStatus,
    /// Present for every non-confirmed terminal status
    pub reason: Option<FailureReason>,
}

impl BookingResult {
    /// Whether the booking was confirmed
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }
}

/// Stable classification of why a booking did not confirm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Fewer seats available than requested
    InsufficientInventory,
    /// Gateway declined the charge
    PaymentDeclined,
    /// Gateway kept failing with retryable errors
    PaymentUnavailable,
    /// Inventory kept changing under the request
    ConcurrencyConflict,
    /// The event is not registered
    EventNotFound,
    /// A step exceeded its deadline
    Timeout,
    /// The caller cancelled the request
    Cancelled,
    /// The booking record could not be written after payment
    PersistenceFailed,
}

impl FailureKind {
    /// Stable machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InsufficientInventory => "insufficient_inventory",
            Self::PaymentDeclined => "payment_declined",
            Self::PaymentUnavailable => "payment_unavailable",
            Self::ConcurrencyConflict => "concurrency_conflict",
            Self::EventNotFound => "event_not_found",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::PersistenceFailed => "persistence_failed",
        }
    }

    /// Whether resubmitting the whole request (with a new key) may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PaymentUnavailable
                | Self::ConcurrencyConflict
                | Self::Timeout
                | Self::PersistenceFailed
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Failure classification plus human-readable detail.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FailureReason {
    /// Stable classification
    pub kind: FailureKind,
    /// Detail such as `"7 available, 8 requested"`
    pub detail: String,
}

impl FailureReason {
    /// Creates a new `FailureReason`
    #[must_use]
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Not enough seats
    #[must_use]
    pub fn insufficient(available: u32, requested: u32) -> Self {
        Self::new(
            FailureKind::InsufficientInventory,
            format!("{available} available, {requested} requested"),
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}
