//! # Seatbook Core
//!
//! Domain types and capability traits for the seat-reservation saga.
//!
//! This crate has no opinion about storage or transport. It defines:
//!
//! - **Identifiers and values**: [`types`] (`EventId`, `BookingId`, `Money`, ...)
//! - **Bookings**: [`booking`] (the saga state machine and caller-facing results)
//! - **Inventory**: [`inventory`] (versioned seat counters and their audit trail)
//! - **Errors**: [`error`] (component errors and the caller-facing taxonomy)
//! - **Messages**: [`event`] and [`event_bus`] (`BookingConfirmed` and its transport)
//! - **Capabilities**: [`payment`] and [`environment`] (gateway, clock, auth, catalog)
//! - **Storage**: [`store`] (inventory and booking persistence seams)
//!
//! ## Invariants
//!
//! For every event, at all times:
//!
//! ```text
//! 0 <= available_seats <= total_seats
//! available_seats + Σ seats(bookings holding seats) == total_seats
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod booking;
pub mod environment;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod inventory;
pub mod payment;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub use booking::{
    Booking, BookingRequest, BookingResult, BookingStatus, FailureKind, FailureReason,
};
pub use environment::{AuthValidator, Clock, EventCatalog, Principal, Role, SystemClock};
pub use error::{BookingError, InventoryError, LedgerError};
pub use event::{BookingConfirmed, Event, SerializedEvent};
pub use event_bus::{EventBus, EventBusError, EventStream};
pub use inventory::{EventInventory, InventoryLedgerEntry, LedgerReason};
pub use payment::{ChargeMetadata, PaymentError, PaymentGateway};
pub use store::{AppendOutcome, BookingLedger, InventoryStore};
pub use types::{BookingId, Currency, EventId, IdempotencyKey, Money, TransactionId, UserId};
