//! Seat counters and the inventory audit trail.

use crate::types::{BookingId, EventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authoritative seat counters for one event.
///
/// `available_seats` only changes through a versioned compare-and-swap; every
/// successful swap bumps `version` by exactly one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInventory {
    /// Event these counters belong to
    pub event_id: EventId,
    /// Capacity, fixed at registration
    pub total_seats: u32,
    /// Seats not held by any booking
    pub available_seats: u32,
    /// Optimistic concurrency counter
    pub version: u64,
}

impl EventInventory {
    /// Creates a fresh inventory with every seat available
    #[must_use]
    pub const fn new(event_id: EventId, total_seats: u32) -> Self {
        Self {
            event_id,
            total_seats,
            available_seats: total_seats,
            version: 0,
        }
    }

    /// Seats currently held by bookings
    #[must_use]
    pub const fn held_seats(&self) -> u32 {
        self.total_seats - self.available_seats
    }

    /// Checks if the requested quantity is available
    #[must_use]
    pub const fn has_availability(&self, seats: u32) -> bool {
        self.available_seats >= seats
    }
}

/// Why the inventory changed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerReason {
    /// Seats taken by a booking
    Reserve,
    /// Seats returned by compensation
    Release,
    /// Capacity set by an administrator (event registration)
    AdminAdjust,
}

impl fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserve => f.write_str("reserve"),
            Self::Release => f.write_str("release"),
            Self::AdminAdjust => f.write_str("admin_adjust"),
        }
    }
}

/// Append-only audit record of a seat-count change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLedgerEntry {
    /// Event whose counters changed
    pub event_id: EventId,
    /// Signed change applied to `available_seats`
    pub delta: i64,
    /// Why
    pub reason: LedgerReason,
    /// Booking responsible (absent for admin adjustments)
    pub booking_id: Option<BookingId>,
    /// Inventory version after the change
    pub version: u64,
    /// When
    pub timestamp: DateTime<Utc>,
}

/// Net seats held by a booking according to a ledger slice.
///
/// Returns the reserved count if the booking has a `Reserve` entry without a
/// matching `Release`, otherwise zero.
#[must_use]
pub fn seats_held_by(entries: &[InventoryLedgerEntry], booking_id: BookingId) -> u32 {
    let net: i64 = entries
        .iter()
        .filter(|e| e.booking_id == Some(booking_id))
        .map(|e| -e.delta)
        .sum();
    u32::try_from(net.max(0)).unwrap_or(u32::MAX)
}
