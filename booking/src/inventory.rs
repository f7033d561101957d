//! Seat Inventory Store.
//!
//! [`SeatInventory`] is the only writer of seat counts. Every change is a
//! versioned compare-and-swap against an [`InventoryStore`]; losers re-read and
//! retry a bounded number of times before a
//! [`InventoryError::ConcurrencyConflict`] surfaces to the saga. Events are
//! independent: each has its own version and lock, nothing is global.
//!
//! [`InMemoryInventoryStore`] is the bundled store. Its per-event mutex only
//! guards the swap itself; reads and the availability decision happen outside
//! it, so contention shows up as version conflicts exactly as it would against
//! a database row.

use seatbook_core::environment::Clock;
use seatbook_core::error::InventoryError;
use seatbook_core::inventory::{EventInventory, InventoryLedgerEntry, LedgerReason, seats_held_by};
use seatbook_core::store::{InventoryStore, StoreFuture};
use seatbook_core::types::{BookingId, EventId};
use seatbook_runtime::metrics::SagaMetrics;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Outcome of a successful reservation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reservation {
    /// Seats left after the reservation
    pub available: u32,
    /// Inventory version written by the reservation
    pub version: u64,
}

/// Seat counters with bounded optimistic retries.
#[derive(Clone)]
pub struct SeatInventory {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    cas_retries: usize,
}

impl SeatInventory {
    /// Creates a new `SeatInventory`. `cas_retries` is clamped to at least one.
    #[must_use]
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>, cas_retries: usize) -> Self {
        Self {
            store,
            clock,
            cas_retries: cas_retries.max(1),
        }
    }

    /// Initialize counters for an event with every seat available.
    ///
    /// # Errors
    ///
    /// [`InventoryError::InvalidCapacity`] for zero seats,
    /// [`InventoryError::AlreadyRegistered`] if the event has counters.
    pub async fn register(
        &self,
        event_id: EventId,
        total_seats: u32,
    ) -> Result<EventInventory, InventoryError> {
        if total_seats == 0 {
            return Err(InventoryError::InvalidCapacity {
                event_id,
                total_seats,
            });
        }

        let inventory = EventInventory::new(event_id, total_seats);
        let entry = InventoryLedgerEntry {
            event_id,
            delta: i64::from(total_seats),
            reason: LedgerReason::AdminAdjust,
            booking_id: None,
            version: inventory.version,
            timestamp: self.clock.now(),
        };
        self.store.insert(inventory.clone(), entry).await?;

        tracing::info!(%event_id, total_seats, "Event inventory registered");
        Ok(inventory)
    }

    /// Atomically take `seats` for `booking_id` if enough are available.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::Insufficient`] with the available count observed
    /// - [`InventoryError::EventNotFound`] for unregistered events
    /// - [`InventoryError::ConcurrencyConflict`] once CAS retries are exhausted
    pub async fn try_reserve(
        &self,
        event_id: EventId,
        booking_id: BookingId,
        seats: u32,
    ) -> Result<Reservation, InventoryError> {
        for attempt in 1..=self.cas_retries {
            let inventory = self.load(event_id).await?;
            if !inventory.has_availability(seats) {
                return Err(InventoryError::Insufficient {
                    event_id,
                    available: inventory.available_seats,
                    requested: seats,
                });
            }

            let entry = self.entry(event_id, booking_id, -i64::from(seats), LedgerReason::Reserve);
            match self
                .store
                .compare_and_set(
                    event_id,
                    inventory.version,
                    inventory.available_seats - seats,
                    entry,
                )
                .await
            {
                Ok(updated) => {
                    tracing::debug!(
                        %event_id,
                        %booking_id,
                        seats,
                        available = updated.available_seats,
                        version = updated.version,
                        "Seats reserved"
                    );
                    return Ok(Reservation {
                        available: updated.available_seats,
                        version: updated.version,
                    });
                }
                Err(InventoryError::VersionConflict { .. }) => {
                    SagaMetrics::record_cas_conflict();
                    tracing::debug!(%event_id, %booking_id, attempt, "Reserve lost CAS race, re-reading");
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(InventoryError::ConcurrencyConflict {
            event_id,
            attempts: self.cas_retries,
        })
    }

    /// Return the seats held by `booking_id`.
    ///
    /// Keyed by booking: the ledger must show a reservation of exactly `seats`
    /// with no prior release. A release that would push availability above
    /// capacity is reported, never clamped.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::DoubleRelease`] if the booking already released
    /// - [`InventoryError::NoReservation`] if the booking holds a different count
    /// - [`InventoryError::OverRelease`] if counters and ledger disagree
    /// - [`InventoryError::ConcurrencyConflict`] once CAS retries are exhausted
    pub async fn release(
        &self,
        event_id: EventId,
        booking_id: BookingId,
        seats: u32,
    ) -> Result<u32, InventoryError> {
        for attempt in 1..=self.cas_retries {
            // Counters before ledger: a concurrent release that lands after this
            // load bumps the version and fails our swap below.
            let inventory = self.load(event_id).await?;
            let entries = self.store.entries(event_id).await?;

            let already_released = entries
                .iter()
                .any(|e| e.booking_id == Some(booking_id) && e.reason == LedgerReason::Release);
            if already_released {
                tracing::error!(%event_id, %booking_id, "Double compensation rejected");
                return Err(InventoryError::DoubleRelease {
                    event_id,
                    booking_id,
                });
            }

            let held = seats_held_by(&entries, booking_id);
            if held != seats {
                return Err(InventoryError::NoReservation {
                    event_id,
                    booking_id,
                    held,
                    seats,
                });
            }

            let new_available = inventory.available_seats.saturating_add(seats);
            if new_available > inventory.total_seats {
                tracing::error!(
                    %event_id,
                    %booking_id,
                    seats,
                    available = inventory.available_seats,
                    total = inventory.total_seats,
                    "Release would exceed capacity"
                );
                return Err(InventoryError::OverRelease {
                    event_id,
                    seats,
                    available: inventory.available_seats,
                    total_seats: inventory.total_seats,
                });
            }

            let entry = self.entry(event_id, booking_id, i64::from(seats), LedgerReason::Release);
            match self
                .store
                .compare_and_set(event_id, inventory.version, new_available, entry)
                .await
            {
                Ok(updated) => {
                    tracing::info!(
                        %event_id,
                        %booking_id,
                        seats,
                        available = updated.available_seats,
                        "Seats released"
                    );
                    return Ok(updated.available_seats);
                }
                Err(InventoryError::VersionConflict { .. }) => {
                    SagaMetrics::record_cas_conflict();
                    tracing::debug!(%event_id, %booking_id, attempt, "Release lost CAS race, re-reading");
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(InventoryError::ConcurrencyConflict {
            event_id,
            attempts: self.cas_retries,
        })
    }

    /// Available seats. May be stale under concurrent writers; never treat it
    /// as a reservation.
    ///
    /// # Errors
    ///
    /// [`InventoryError::EventNotFound`] for unregistered events.
    pub async fn get_available(&self, event_id: EventId) -> Result<u32, InventoryError> {
        Ok(self.load(event_id).await?.available_seats)
    }

    /// Full counters for an event.
    ///
    /// # Errors
    ///
    /// [`InventoryError::EventNotFound`] for unregistered events.
    pub async fn snapshot(&self, event_id: EventId) -> Result<EventInventory, InventoryError> {
        self.load(event_id).await
    }

    /// Seats the ledger says `booking_id` currently holds.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    pub async fn seats_held(
        &self,
        event_id: EventId,
        booking_id: BookingId,
    ) -> Result<u32, InventoryError> {
        let entries = self.store.entries(event_id).await?;
        Ok(seats_held_by(&entries, booking_id))
    }

    /// Inventory audit trail, oldest first.
    ///
    /// # Errors
    ///
    /// Storage failures only.
    pub async fn history(
        &self,
        event_id: EventId,
    ) -> Result<Vec<InventoryLedgerEntry>, InventoryError> {
        self.store.entries(event_id).await
    }

    async fn load(&self, event_id: EventId) -> Result<EventInventory, InventoryError> {
        self.store
            .load(event_id)
            .await?
            .ok_or(InventoryError::EventNotFound(event_id))
    }

    fn entry(
        &self,
        event_id: EventId,
        booking_id: BookingId,
        delta: i64,
        reason: LedgerReason,
    ) -> InventoryLedgerEntry {
        InventoryLedgerEntry {
            event_id,
            delta,
            reason,
            booking_id: Some(booking_id),
            version: 0,
            timestamp: self.clock.now(),
        }
    }
}

#[derive(Debug)]
struct EventSlot {
    inventory: EventInventory,
    entries: Vec<InventoryLedgerEntry>,
}

/// In-process [`InventoryStore`] with one lock per event.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    events: RwLock<HashMap<EventId, Arc<Mutex<EventSlot>>>>,
}

impl InMemoryInventoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, event_id: EventId) -> Option<Arc<Mutex<EventSlot>>> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event_id)
            .cloned()
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn load(&self, event_id: EventId) -> StoreFuture<'_, Option<EventInventory>, InventoryError> {
        let inventory = self.slot(event_id).map(|slot| {
            let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
            slot.inventory.clone()
        });
        Box::pin(async move { Ok(inventory) })
    }

    fn insert(
        &self,
        inventory: EventInventory,
        entry: InventoryLedgerEntry,
    ) -> StoreFuture<'_, (), InventoryError> {
        let result = {
            let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
            let event_id = inventory.event_id;
            if events.contains_key(&event_id) {
                Err(InventoryError::AlreadyRegistered(event_id))
            } else {
                events.insert(
                    event_id,
                    Arc::new(Mutex::new(EventSlot {
                        inventory,
                        entries: vec![entry],
                    })),
                );
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn compare_and_set(
        &self,
        event_id: EventId,
        expected_version: u64,
        new_available: u32,
        mut entry: InventoryLedgerEntry,
    ) -> StoreFuture<'_, EventInventory, InventoryError> {
        let result = self
            .slot(event_id)
            .ok_or(InventoryError::EventNotFound(event_id))
            .and_then(|slot| {
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.inventory.version != expected_version {
                    return Err(InventoryError::VersionConflict {
                        event_id,
                        expected: expected_version,
                        actual: slot.inventory.version,
                    });
                }
                slot.inventory.available_seats = new_available;
                slot.inventory.version += 1;
                entry.version = slot.inventory.version;
                slot.entries.push(entry);
                Ok(slot.inventory.clone())
            });
        Box::pin(async move { result })
    }

    fn entries(
        &self,
        event_id: EventId,
    ) -> StoreFuture<'_, Vec<InventoryLedgerEntry>, InventoryError> {
        let entries = self
            .slot(event_id)
            .map(|slot| {
                let slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                slot.entries.clone()
            })
            .unwrap_or_default();
        Box::pin(async move { Ok(entries) })
    }
}
