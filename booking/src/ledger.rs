//! Booking Ledger.
//!
//! Durable record of every booking attempt. Rows are inserted once per
//! idempotency key and then only move forward through the saga state machine;
//! nothing is ever deleted.

use seatbook_core::booking::Booking;
use seatbook_core::error::LedgerError;
use seatbook_core::store::{AppendOutcome, BookingLedger, StoreFuture};
use seatbook_core::types::{BookingId, IdempotencyKey, UserId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
struct LedgerState {
    rows: HashMap<BookingId, (u64, Booking)>,
    keys: HashMap<IdempotencyKey, BookingId>,
    next_seq: u64,
}

/// In-process [`BookingLedger`].
///
/// The key index plays the role of a unique constraint: the check and the
/// insert happen under one write lock.
#[derive(Debug, Default)]
pub struct InMemoryBookingLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryBookingLedger {
    /// Empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn append_sync(&self, booking: &Booking) -> Result<AppendOutcome, LedgerError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = state.keys.get(&booking.idempotency_key).copied() {
            let same_row = state
                .rows
                .get(&existing)
                .is_some_and(|(_, row)| row == booking);
            return if same_row {
                Ok(AppendOutcome::AlreadyRecorded)
            } else {
                Err(LedgerError::DuplicateKey {
                    key: booking.idempotency_key.clone(),
                    existing,
                })
            };
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .keys
            .insert(booking.idempotency_key.clone(), booking.booking_id);
        state
            .rows
            .insert(booking.booking_id, (seq, booking.clone()));
        Ok(AppendOutcome::Inserted)
    }

    fn update_sync(&self, booking: &Booking) -> Result<(), LedgerError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let (_, row) = state
            .rows
            .get_mut(&booking.booking_id)
            .ok_or(LedgerError::NotFound(booking.booking_id))?;

        if row.status != booking.status && !row.status.can_transition_to(booking.status) {
            return Err(LedgerError::InvalidTransition {
                booking_id: booking.booking_id,
                from: row.status,
                to: booking.status,
            });
        }

        // Identity columns never change
        let mut updated = booking.clone();
        updated.idempotency_key = row.idempotency_key.clone();
        updated.created_at = row.created_at;
        *row = updated;
        Ok(())
    }
}

impl BookingLedger for InMemoryBookingLedger {
    fn append(&self, booking: &Booking) -> StoreFuture<'_, AppendOutcome, LedgerError> {
        let result = self.append_sync(booking);
        Box::pin(async move { result })
    }

    fn update(&self, booking: &Booking) -> StoreFuture<'_, (), LedgerError> {
        let result = self.update_sync(booking);
        Box::pin(async move { result })
    }

    fn find_by_id(&self, booking_id: BookingId) -> StoreFuture<'_, Booking, LedgerError> {
        let result = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .get(&booking_id)
            .map(|(_, row)| row.clone())
            .ok_or(LedgerError::NotFound(booking_id));
        Box::pin(async move { result })
    }

    fn find_by_user(&self, user_id: UserId) -> StoreFuture<'_, Vec<Booking>, LedgerError> {
        let mut rows: Vec<(u64, Booking)> = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .values()
            .filter(|(_, row)| row.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });
        let bookings = rows.into_iter().map(|(_, row)| row).collect();
        Box::pin(async move { Ok(bookings) })
    }

    fn find_in_flight(&self) -> StoreFuture<'_, Vec<Booking>, LedgerError> {
        let mut rows: Vec<(u64, Booking)> = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .values()
            .filter(|(_, row)| !row.status.is_terminal())
            .cloned()
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        let bookings = rows.into_iter().map(|(_, row)| row).collect();
        Box::pin(async move { Ok(bookings) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use seatbook_core::booking::BookingStatus;
    use seatbook_core::environment::Clock;
    use seatbook_core::types::EventId;
    use seatbook_testing::test_clock;

    fn booking(key: &str, user_id: UserId) -> Booking {
        Booking::new(
            BookingId::new(),
            IdempotencyKey::new(key).unwrap(),
            user_id,
            EventId::new(),
            2,
            test_clock().now(),
        )
    }

    #[tokio::test]
    async fn append_is_insert_once_by_key() {
        let ledger = InMemoryBookingLedger::new();
        let first = booking("k1", UserId::new());

        assert_eq!(ledger.append(&first).await.unwrap(), AppendOutcome::Inserted);
        assert_eq!(ledger.append(&first).await.unwrap(), AppendOutcome::AlreadyRecorded);

        let mut other = booking("k1", first.user_id);
        other.seats = 5;
        assert_eq!(
            ledger.append(&other).await,
            Err(LedgerError::DuplicateKey {
                key: first.idempotency_key.clone(),
                existing: first.booking_id
            })
        );
    }

    #[tokio::test]
    async fn updates_follow_the_state_machine() {
        let ledger = InMemoryBookingLedger::new();
        let mut row = booking("k1", UserId::new());
        ledger.append(&row).await.unwrap();

        row.status = BookingStatus::ReservingSeats;
        ledger.update(&row).await.unwrap();
        // Rewriting the same status is allowed
        ledger.update(&row).await.unwrap();

        row.status = BookingStatus::Confirmed;
        assert_eq!(
            ledger.update(&row).await,
            Err(LedgerError::InvalidTransition {
                booking_id: row.booking_id,
                from: BookingStatus::ReservingSeats,
                to: BookingStatus::Confirmed
            })
        );

        row.status = BookingStatus::InventoryInsufficient;
        ledger.update(&row).await.unwrap();
        assert_eq!(
            ledger.find_by_id(row.booking_id).await.unwrap().status,
            BookingStatus::InventoryInsufficient
        );
        assert!(ledger.find_in_flight().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_by_user_is_most_recent_first() {
        let ledger = InMemoryBookingLedger::new();
        let user = UserId::new();
        let older = booking("a", user);
        let mut newer = booking("b", user);
        newer.created_at += Duration::minutes(5);
        let same_time = booking("c", user);

        ledger.append(&older).await.unwrap();
        ledger.append(&newer).await.unwrap();
        ledger.append(&same_time).await.unwrap();
        ledger.append(&booking("d", UserId::new())).await.unwrap();

        let ids: Vec<_> = ledger
            .find_by_user(user)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.booking_id)
            .collect();
        assert_eq!(ids, vec![newer.booking_id, same_time.booking_id, older.booking_id]);
    }

    #[tokio::test]
    async fn unknown_booking_is_not_found() {
        let ledger = InMemoryBookingLedger::new();
        let id = BookingId::new();
        assert_eq!(ledger.find_by_id(id).await, Err(LedgerError::NotFound(id)));
    }
}
