//! Shared fixtures for the saga integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use seatbook::{
    BookingEnvironment, InMemoryBookingLedger, InMemoryInventoryStore, PublisherConfig,
    ReservationCoordinator, SagaConfig,
};
use seatbook_core::booking::{Booking, BookingRequest, BookingStatus};
use seatbook_core::error::{InventoryError, LedgerError};
use seatbook_core::inventory::{EventInventory, InventoryLedgerEntry};
use seatbook_core::store::{AppendOutcome, BookingLedger, InventoryStore, StoreFuture};
use seatbook_core::types::{BookingId, EventId, IdempotencyKey, UserId};
use seatbook_testing::{FixedClock, InMemoryEventBus, ScriptedPaymentGateway, test_clock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Ledger that can be told to fail specific writes.
#[derive(Debug, Default)]
pub struct FlakyLedger {
    inner: InMemoryBookingLedger,
    failing_status: Mutex<Option<BookingStatus>>,
    failing_appends: Mutex<bool>,
}

impl FlakyLedger {
    pub fn fail_updates_to(&self, status: BookingStatus) {
        *self.failing_status.lock().unwrap() = Some(status);
    }

    pub fn fail_appends(&self, fail: bool) {
        *self.failing_appends.lock().unwrap() = fail;
    }

    pub fn heal(&self) {
        *self.failing_status.lock().unwrap() = None;
        self.fail_appends(false);
    }

    fn update_fails(&self, status: BookingStatus) -> bool {
        *self
            .failing_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            == Some(status)
    }
}

impl BookingLedger for FlakyLedger {
    fn append(&self, booking: &Booking) -> StoreFuture<'_, AppendOutcome, LedgerError> {
        if *self.failing_appends.lock().unwrap_or_else(PoisonError::into_inner) {
            return Box::pin(async { Err(LedgerError::Unavailable("connection reset".to_string())) });
        }
        self.inner.append(booking)
    }

    fn update(&self, booking: &Booking) -> StoreFuture<'_, (), LedgerError> {
        if self.update_fails(booking.status) {
            let status = booking.status;
            return Box::pin(async move {
                Err(LedgerError::Unavailable(format!("write of {status} rejected")))
            });
        }
        self.inner.update(booking)
    }

    fn find_by_id(&self, booking_id: BookingId) -> StoreFuture<'_, Booking, LedgerError> {
        self.inner.find_by_id(booking_id)
    }

    fn find_by_user(&self, user_id: UserId) -> StoreFuture<'_, Vec<Booking>, LedgerError> {
        self.inner.find_by_user(user_id)
    }

    fn find_in_flight(&self) -> StoreFuture<'_, Vec<Booking>, LedgerError> {
        self.inner.find_in_flight()
    }
}

#[derive(Debug, Clone, Copy)]
struct Stall {
    delay: Duration,
    then_refuse: bool,
}

/// Inventory store whose swaps can be slowed down or refused.
#[derive(Debug, Default)]
pub struct StallingInventory {
    inner: InMemoryInventoryStore,
    next_stall: Mutex<Option<Stall>>,
    refusing: AtomicBool,
}

impl StallingInventory {
    /// Apply the next swap, then hold its response for `delay`.
    pub fn stall_next_swap(&self, delay: Duration) {
        *self.next_stall.lock().unwrap() = Some(Stall {
            delay,
            then_refuse: false,
        });
    }

    /// Apply the next swap, hang, and lose every later swap until [`heal`].
    ///
    /// [`heal`]: StallingInventory::heal
    pub fn wedge_after_next_swap(&self) {
        *self.next_stall.lock().unwrap() = Some(Stall {
            delay: Duration::from_secs(30),
            then_refuse: true,
        });
    }

    pub fn heal(&self) {
        *self.next_stall.lock().unwrap() = None;
        self.refusing.store(false, Ordering::SeqCst);
    }
}

impl InventoryStore for StallingInventory {
    fn load(&self, event_id: EventId) -> StoreFuture<'_, Option<EventInventory>, InventoryError> {
        self.inner.load(event_id)
    }

    fn insert(
        &self,
        inventory: EventInventory,
        entry: InventoryLedgerEntry,
    ) -> StoreFuture<'_, (), InventoryError> {
        self.inner.insert(inventory, entry)
    }

    fn compare_and_set(
        &self,
        event_id: EventId,
        expected_version: u64,
        new_available: u32,
        entry: InventoryLedgerEntry,
    ) -> StoreFuture<'_, EventInventory, InventoryError> {
        if self.refusing.load(Ordering::SeqCst) {
            return Box::pin(async move {
                Err(InventoryError::VersionConflict {
                    event_id,
                    expected: expected_version,
                    actual: expected_version + 1,
                })
            });
        }

        let stall = self
            .next_stall
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if stall.is_some_and(|s| s.then_refuse) {
            self.refusing.store(true, Ordering::SeqCst);
        }

        let swap = self
            .inner
            .compare_and_set(event_id, expected_version, new_available, entry);
        Box::pin(async move {
            let result = swap.await;
            if let Some(stall) = stall {
                tokio::time::sleep(stall.delay).await;
            }
            result
        })
    }

    fn entries(
        &self,
        event_id: EventId,
    ) -> StoreFuture<'_, Vec<InventoryLedgerEntry>, InventoryError> {
        self.inner.entries(event_id)
    }
}

/// A coordinator wired to in-memory stores and scripted collaborators.
pub struct Harness {
    pub coordinator: ReservationCoordinator,
    pub ledger: Arc<FlakyLedger>,
    pub inventory: Arc<StallingInventory>,
    pub payments: ScriptedPaymentGateway,
    pub bus: InMemoryEventBus,
    pub clock: FixedClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_payments(ScriptedPaymentGateway::new())
    }

    pub fn with_payments(payments: ScriptedPaymentGateway) -> Self {
        Self::build(payments, SagaConfig::for_tests(), &PublisherConfig::for_tests())
    }

    pub fn build(
        payments: ScriptedPaymentGateway,
        saga: SagaConfig,
        publisher: &PublisherConfig,
    ) -> Self {
        let ledger = Arc::new(FlakyLedger::default());
        let inventory = Arc::new(StallingInventory::default());
        let bus = InMemoryEventBus::new();
        let clock = test_clock();
        let coordinator = ReservationCoordinator::new(
            BookingEnvironment {
                inventory: Arc::clone(&inventory) as _,
                ledger: Arc::clone(&ledger) as _,
                payments: Arc::new(payments.clone()),
                bus: Arc::new(bus.clone()),
                clock: Arc::new(clock.clone()),
            },
            saga,
            publisher,
        );
        Self {
            coordinator,
            ledger,
            inventory,
            payments,
            bus,
            clock,
        }
    }

    /// Register a fresh event with `seats` seats
    pub async fn event(&self, seats: u32) -> EventId {
        let event_id = EventId::new();
        self.coordinator
            .inventory()
            .register(event_id, seats)
            .await
            .unwrap();
        event_id
    }

    pub async fn available(&self, event_id: EventId) -> u32 {
        self.coordinator.get_available(event_id).await.unwrap()
    }

    pub async fn status_of(&self, booking_id: BookingId) -> BookingStatus {
        self.coordinator.get_booking(booking_id).await.unwrap().status
    }
}

pub fn request(key: &str, user_id: UserId, event_id: EventId, seats: u32) -> BookingRequest {
    BookingRequest::new(IdempotencyKey::new(key).unwrap(), user_id, event_id, seats)
}
