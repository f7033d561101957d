//! Persistence seams for inventory counters and booking records.
//!
//! Both traits describe storage primitives only. Sequencing (retry loops,
//! compensation, state machine checks beyond a single row) lives in the
//! components that own them.

use crate::booking::Booking;
use crate::error::{InventoryError, LedgerError};
use crate::inventory::{EventInventory, InventoryLedgerEntry};
use crate::types::{BookingId, EventId, UserId};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by store methods
pub type StoreFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Versioned seat counters plus their append-only audit trail.
///
/// Implementations must apply a successful [`compare_and_set`] and its ledger
/// entry atomically: an observer never sees one without the other.
///
/// [`compare_and_set`]: InventoryStore::compare_and_set
pub trait InventoryStore: Send + Sync {
    /// Current counters, or `None` if the event was never registered.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn load(&self, event_id: EventId) -> StoreFuture<'_, Option<EventInventory>, InventoryError>;

    /// Create counters for a new event together with its opening ledger entry.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::AlreadyRegistered`] if counters exist.
    fn insert(
        &self,
        inventory: EventInventory,
        entry: InventoryLedgerEntry,
    ) -> StoreFuture<'_, (), InventoryError>;

    /// Set `available_seats` to `new_available` if the stored version still
    /// equals `expected_version`, bumping the version by one and appending
    /// `entry` (whose `version` is overwritten with the new version).
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::VersionConflict`] if another writer got there
    /// first, [`InventoryError::EventNotFound`] for unknown events.
    fn compare_and_set(
        &self,
        event_id: EventId,
        expected_version: u64,
        new_available: u32,
        entry: InventoryLedgerEntry,
    ) -> StoreFuture<'_, EventInventory, InventoryError>;

    /// Ledger entries for an event, oldest first.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn entries(
        &self,
        event_id: EventId,
    ) -> StoreFuture<'_, Vec<InventoryLedgerEntry>, InventoryError>;
}

/// Result of an insert-once append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Row written
    Inserted,
    /// An identical row was already recorded under the key
    AlreadyRecorded,
}

/// Durable booking records, unique by idempotency key.
pub trait BookingLedger: Send + Sync {
    /// Insert `booking` once, keyed by its idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateKey`] if a different booking already
    /// holds the key.
    fn append(&self, booking: &Booking) -> StoreFuture<'_, AppendOutcome, LedgerError>;

    /// Replace the stored row for `booking.booking_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTransition`] if the status change is not
    /// permitted, [`LedgerError::NotFound`] for unknown bookings.
    fn update(&self, booking: &Booking) -> StoreFuture<'_, (), LedgerError>;

    /// Look up a booking.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] for unknown bookings.
    fn find_by_id(&self, booking_id: BookingId) -> StoreFuture<'_, Booking, LedgerError>;

    /// Bookings for a user, most recent first.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn find_by_user(&self, user_id: UserId) -> StoreFuture<'_, Vec<Booking>, LedgerError>;

    /// Bookings not yet in a terminal status, oldest first.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    fn find_in_flight(&self) -> StoreFuture<'_, Vec<Booking>, LedgerError>;
}
