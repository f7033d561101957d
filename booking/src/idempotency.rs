//! Idempotency Guard.
//!
//! Deduplicates retried booking requests by their caller-supplied key. The
//! first request to claim a key owns the saga; later requests with the same
//! key either replay the recorded terminal result or, while the owner is still
//! running, wait briefly for it.
//!
//! Claiming is a single insert into a keyed map under a lock (the in-process
//! equivalent of a unique index), so two concurrent requests can never both
//! see themselves as new.

use chrono::{DateTime, Utc};
use seatbook_core::booking::BookingResult;
use seatbook_core::environment::Clock;
use seatbook_core::error::BookingError;
use seatbook_core::types::{BookingId, IdempotencyKey};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// Outcome of [`IdempotencyGuard::begin`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Begin {
    /// The key was unclaimed; the caller now owns it
    New,
    /// Another request already owns the key
    Existing {
        /// Booking the key resolved to
        booking_id: BookingId,
    },
}

impl Begin {
    /// Whether the caller should run the saga
    #[must_use]
    pub const fn is_new(&self) -> bool {
        matches!(self, Self::New)
    }
}

#[derive(Debug)]
enum RecordState {
    InFlight(watch::Sender<Option<BookingResult>>),
    Completed {
        result: BookingResult,
        completed_at: DateTime<Utc>,
    },
}

#[derive(Debug)]
struct IdempotencyRecord {
    booking_id: BookingId,
    fingerprint: String,
    state: RecordState,
}

/// Key → booking map with cached terminal results.
pub struct IdempotencyGuard {
    records: Mutex<HashMap<IdempotencyKey, IdempotencyRecord>>,
    clock: Arc<dyn Clock>,
    duplicate_wait: Duration,
    retention: Duration,
}

impl IdempotencyGuard {
    /// Creates a new `IdempotencyGuard`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, duplicate_wait: Duration, retention: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
            duplicate_wait,
            retention,
        }
    }

    /// Atomically claim `key` for `booking_id`, or report who holds it.
    ///
    /// `fingerprint` identifies the request payload; reusing a key for a
    /// different payload is rejected.
    ///
    /// # Errors
    ///
    /// [`BookingError::IdempotencyMismatch`] if the key was claimed with a
    /// different fingerprint.
    pub fn begin(
        &self,
        key: &IdempotencyKey,
        fingerprint: &str,
        booking_id: BookingId,
    ) -> Result<Begin, BookingError> {
        let mut records = self.lock();
        match records.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(IdempotencyRecord {
                    booking_id,
                    fingerprint: fingerprint.to_string(),
                    state: RecordState::InFlight(watch::channel(None).0),
                });
                Ok(Begin::New)
            }
            Entry::Occupied(existing) => {
                let record = existing.get();
                if record.fingerprint != fingerprint {
                    tracing::warn!(key = %key, "Idempotency key reused with a different payload");
                    return Err(BookingError::IdempotencyMismatch(key.clone()));
                }
                Ok(Begin::Existing {
                    booking_id: record.booking_id,
                })
            }
        }
    }

    /// Terminal result for `key`, waiting up to the configured duplicate wait
    /// if the owner is still running.
    ///
    /// # Errors
    ///
    /// [`BookingError::InFlight`] if no terminal result arrived in time.
    pub async fn wait_for_result(&self, key: &IdempotencyKey) -> Result<BookingResult, BookingError> {
        let mut rx = {
            let records = self.lock();
            match records.get(key).map(|r| &r.state) {
                Some(RecordState::Completed { result, .. }) => return Ok(result.clone()),
                Some(RecordState::InFlight(tx)) => tx.subscribe(),
                None => return Err(BookingError::InFlight(key.clone())),
            }
        };

        let waited = tokio::time::timeout(self.duplicate_wait, rx.wait_for(Option::is_some)).await;
        match waited {
            Ok(Ok(result)) => result
                .clone()
                .ok_or_else(|| BookingError::InFlight(key.clone())),
            // Timed out, or the owner abandoned the key
            Ok(Err(_)) | Err(_) => {
                tracing::debug!(key = %key, "Duplicate request gave up waiting for the original");
                Err(BookingError::InFlight(key.clone()))
            }
        }
    }

    /// Record the terminal outcome for replay and wake any waiting duplicates.
    ///
    /// Also used by recovery, when the in-flight record may be gone; hence the
    /// fingerprint is passed again rather than read back.
    pub fn complete(
        &self,
        key: &IdempotencyKey,
        fingerprint: &str,
        booking_id: BookingId,
        result: BookingResult,
    ) {
        let completed_at = self.clock.now();
        let previous = self.lock().insert(
            key.clone(),
            IdempotencyRecord {
                booking_id,
                fingerprint: fingerprint.to_string(),
                state: RecordState::Completed {
                    result: result.clone(),
                    completed_at,
                },
            },
        );
        if let Some(IdempotencyRecord {
            state: RecordState::InFlight(tx),
            ..
        }) = previous
        {
            tx.send_replace(Some(result));
        }
    }

    /// Release a claim that never produced a booking, so the key can be
    /// retried.
    pub fn abandon(&self, key: &IdempotencyKey) {
        let mut records = self.lock();
        if matches!(
            records.get(key).map(|r| &r.state),
            Some(RecordState::InFlight(_))
        ) {
            records.remove(key);
            tracing::debug!(key = %key, "Idempotency claim abandoned");
        }
    }

    /// Drop completed records older than the retention window. In-flight
    /// records are never purged. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let retention = chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::MAX);
        let mut records = self.lock();
        let before = records.len();
        records.retain(|_, record| match &record.state {
            RecordState::InFlight(_) => true,
            RecordState::Completed { completed_at, .. } => {
                completed_at.checked_add_signed(retention).is_none_or(|expiry| expiry > now)
            }
        });
        let purged = before - records.len();
        if purged > 0 {
            tracing::info!(purged, "Purged expired idempotency records");
        }
        purged
    }

    /// Number of records held
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no records are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<IdempotencyKey, IdempotencyRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
