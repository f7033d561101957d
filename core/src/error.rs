//! Error taxonomy for the booking core.
//!
//! Component errors ([`InventoryError`], [`LedgerError`]) describe what went wrong
//! inside one component. [`BookingError`] is what callers of the coordinator see
//! when a request is rejected before the saga produces any side effect.

use crate::booking::BookingStatus;
use crate::environment::{CatalogError, Unauthorized};
use crate::event_bus::EventBusError;
use crate::payment::PaymentError;
use crate::types::{BookingId, EventId, IdempotencyKey};
use thiserror::Error;

/// Errors from the seat inventory store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// No inventory registered for this event
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// Inventory already registered
    #[error("Inventory already registered for event {0}")]
    AlreadyRegistered(EventId),

    /// Capacity must be at least one seat
    #[error("Invalid capacity {total_seats} for event {event_id}")]
    InvalidCapacity {
        /// Event being registered
        event_id: EventId,
        /// Rejected capacity
        total_seats: u32,
    },

    /// Not enough seats
    #[error("Insufficient inventory for event {event_id}: {available} available, {requested} requested")]
    Insufficient {
        /// Event
        event_id: EventId,
        /// Seats available when the request was evaluated
        available: u32,
        /// Seats requested
        requested: u32,
    },

    /// Compare-and-swap lost against a concurrent writer
    #[error("Version conflict for event {event_id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Event
        event_id: EventId,
        /// Version the writer read
        expected: u64,
        /// Version found at write time
        actual: u64,
    },

    /// Bounded CAS retries exhausted
    #[error("Concurrency conflict for event {event_id} after {attempts} attempts")]
    ConcurrencyConflict {
        /// Event
        event_id: EventId,
        /// Attempts made
        attempts: usize,
    },

    /// Release would push available seats above capacity
    #[error("Release of {seats} seats for event {event_id} would exceed capacity ({available}/{total_seats} available)")]
    OverRelease {
        /// Event
        event_id: EventId,
        /// Seats being released
        seats: u32,
        /// Available before the release
        available: u32,
        /// Capacity
        total_seats: u32,
    },

    /// Booking already released its seats
    #[error("Seats for booking {booking_id} on event {event_id} were already released")]
    DoubleRelease {
        /// Event
        event_id: EventId,
        /// Booking
        booking_id: BookingId,
    },

    /// Release for a booking that never reserved (or reserved a different count)
    #[error("Booking {booking_id} holds {held} seats on event {event_id}, cannot release {seats}")]
    NoReservation {
        /// Event
        event_id: EventId,
        /// Booking
        booking_id: BookingId,
        /// Seats the ledger says the booking holds
        held: u32,
        /// Seats the caller tried to release
        seats: u32,
    },
}

/// Errors from the booking ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A different booking is already recorded under this key
    #[error("Idempotency key {key} already recorded for booking {existing}")]
    DuplicateKey {
        /// Conflicting key
        key: IdempotencyKey,
        /// Booking already holding the key
        existing: BookingId,
    },

    /// No such booking
    #[error("Booking not found: {0}")]
    NotFound(BookingId),

    /// Status change not permitted by the saga state machine
    #[error("Invalid transition for booking {booking_id}: {from} -> {to}")]
    InvalidTransition {
        /// Booking
        booking_id: BookingId,
        /// Current status
        from: BookingStatus,
        /// Requested status
        to: BookingStatus,
    },

    /// Storage could not be reached
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced to callers of the reservation coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Malformed request, never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown entity
    #[error("Not found: {0}")]
    NotFound(String),

    /// Not enough seats
    #[error("Insufficient inventory: {available} available, {requested} requested")]
    InsufficientInventory {
        /// Seats available
        available: u32,
        /// Seats requested
        requested: u32,
    },

    /// Payment failed
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Inventory kept changing underneath the request
    #[error("Concurrency conflict on event {event_id} after {attempts} attempts")]
    ConcurrencyConflict {
        /// Event
        event_id: EventId,
        /// Attempts made
        attempts: usize,
    },

    /// Publishing failed (logged only, never returned from `CreateBooking`)
    #[error("Publish error: {0}")]
    Publish(#[from] EventBusError),

    /// A request with the same key is still running
    #[error("Request {0} is still in flight, retry shortly")]
    InFlight(IdempotencyKey),

    /// Same key reused with a different payload
    #[error("Idempotency key {0} was already used for a different request")]
    IdempotencyMismatch(IdempotencyKey),

    /// Caller cancelled before the saga produced any side effect
    #[error("Request cancelled before any seats were reserved")]
    Cancelled,

    /// Token rejected
    #[error(transparent)]
    Unauthorized(#[from] Unauthorized),

    /// Inventory invariant violation (compensation bug)
    #[error("Inventory error: {0}")]
    Inventory(InventoryError),

    /// Ledger failure
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A dependency could not be reached before the saga started
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl BookingError {
    /// Whether the caller may retry the same request
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Payment(e) => e.retryable,
            Self::ConcurrencyConflict { .. } | Self::InFlight(_) | Self::Unavailable(_) => true,
            Self::Ledger(LedgerError::Unavailable(_)) => true,
            _ => false,
        }
    }
}

impl From<InventoryError> for BookingError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::EventNotFound(event_id) => Self::NotFound(format!("event {event_id}")),
            InventoryError::Insufficient {
                available,
                requested,
                ..
            } => Self::InsufficientInventory {
                available,
                requested,
            },
            InventoryError::ConcurrencyConflict { event_id, attempts } => {
                Self::ConcurrencyConflict { event_id, attempts }
            }
            other => Self::Inventory(other),
        }
    }
}

impl From<CatalogError> for BookingError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(event_id) => Self::NotFound(format!("event {event_id}")),
            CatalogError::Unavailable(reason) => Self::Unavailable(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_errors_map_to_taxonomy() {
        let event_id = EventId::new();
        let err: BookingError = InventoryError::Insufficient {
            event_id,
            available: 7,
            requested: 8,
        }
        .into();
        assert_eq!(
            err,
            BookingError::InsufficientInventory {
                available: 7,
                requested: 8
            }
        );
        assert!(!err.is_retryable());

        let err: BookingError = InventoryError::ConcurrencyConflict {
            event_id,
            attempts: 5,
        }
        .into();
        assert!(err.is_retryable());

        let err: BookingError = InventoryError::EventNotFound(event_id).into();
        assert!(matches!(err, BookingError::NotFound(_)));
    }

    #[test]
    fn payment_retryability_is_preserved() {
        assert!(BookingError::from(PaymentError::transient("gateway timeout")).is_retryable());
        assert!(!BookingError::from(PaymentError::declined("card declined")).is_retryable());
    }

    #[test]
    fn publish_errors_compare_by_value() {
        let err: BookingError = EventBusError::ConnectionFailed("broker down".to_string()).into();
        assert_eq!(
            err,
            BookingError::Publish(EventBusError::ConnectionFailed("broker down".to_string()))
        );
        assert_ne!(
            err,
            BookingError::Publish(EventBusError::ConnectionFailed("timeout".to_string()))
        );
        assert!(!err.is_retryable());
    }
}
