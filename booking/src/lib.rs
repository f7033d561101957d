//! # Seatbook
//!
//! Idempotent seat reservations as a saga over three independently failing
//! dependencies: seat inventory, a payment gateway and the booking ledger.
//!
//! ## Components
//!
//! - [`inventory`]: versioned seat counters with an audit trail
//! - [`idempotency`]: one saga per idempotency key, replayed results for duplicates
//! - [`ledger`]: durable booking records, forward-only status changes
//! - [`coordinator`]: the saga itself, with compensation and startup recovery
//! - [`publisher`]: at-least-once `BookingConfirmed` fan-out with a dead-letter queue
//! - [`notification`]: idempotent consumer of confirmations
//! - [`bus`]: in-process event bus for single-node deployments
//! - [`app`]: token-authenticated entry points
//!
//! ## Quick start
//!
//! ```no_run
//! use seatbook::{BookingEnvironment, Config, InMemoryBookingLedger, InMemoryInventoryStore,
//!     LocalEventBus, MockPaymentGateway, ReservationCoordinator};
//! use seatbook_core::{BookingRequest, EventId, IdempotencyKey, SystemClock, UserId};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env();
//! let coordinator = ReservationCoordinator::new(
//!     BookingEnvironment {
//!         inventory: Arc::new(InMemoryInventoryStore::new()),
//!         ledger: Arc::new(InMemoryBookingLedger::new()),
//!         payments: MockPaymentGateway::shared(),
//!         bus: Arc::new(LocalEventBus::new()),
//!         clock: Arc::new(SystemClock),
//!     },
//!     config.saga,
//!     &config.publisher,
//! );
//!
//! let event_id = EventId::new();
//! coordinator.inventory().register(event_id, 10).await?;
//!
//! let request = BookingRequest::new(IdempotencyKey::new("k1")?, UserId::new(), event_id, 3);
//! let result = coordinator.create_booking(request).await?;
//! println!("{} -> {}", result.booking_id, result.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! Everything logs through `tracing`; each saga runs inside a `booking_saga`
//! span carrying `booking_id`, `event_id` and `seats`. `RUST_LOG=seatbook=info`
//! shows one line per saga step.

pub mod app;
pub mod bus;
pub mod config;
pub mod coordinator;
pub mod idempotency;
pub mod inventory;
pub mod ledger;
pub mod notification;
pub mod payment;
pub mod publisher;

pub use app::BookingApp;
pub use bus::LocalEventBus;
pub use config::{Config, PublisherConfig, SagaConfig, ServerConfig};
pub use coordinator::{
    BookingEnvironment, CancelHandle, CancelSignal, RecoveryReport, ReservationCoordinator,
};
pub use idempotency::{Begin, IdempotencyGuard};
pub use inventory::{InMemoryInventoryStore, Reservation, SeatInventory};
pub use ledger::InMemoryBookingLedger;
pub use notification::{Notification, NotificationConsumer};
pub use payment::MockPaymentGateway;
pub use publisher::EventPublisher;
