//! Reservation Coordinator: the booking saga.
//!
//! ```text
//! Created
//!   → ReservingSeats        TryReserve (bounded CAS + saga retries, deadline)
//!       insufficient        → InventoryInsufficient
//!       conflict / timeout  → Failed
//!   → PaymentPending        Charge (bounded retries, per-attempt deadline)
//!       success             → SeatsReserved → Confirmed → publish
//!       declined / exhausted→ PaymentFailed → Release → Failed
//!   ledger write fails after charge → Refund + Release → Compensated
//! ```
//!
//! Every terminal status is written to the ledger before it is returned and
//! before the idempotency record is completed. The saga body runs on its own
//! task, so a caller that stops waiting cannot strand a reservation halfway.

use crate::config::{PublisherConfig, SagaConfig};
use crate::idempotency::{Begin, IdempotencyGuard};
use crate::inventory::SeatInventory;
use crate::publisher::EventPublisher;
use seatbook_core::booking::{
    Booking, BookingRequest, BookingResult, BookingStatus, FailureKind, FailureReason,
};
use seatbook_core::environment::Clock;
use seatbook_core::error::{BookingError, InventoryError, LedgerError};
use seatbook_core::event::BookingConfirmed;
use seatbook_core::event_bus::EventBus;
use seatbook_core::payment::{ChargeMetadata, PaymentError, PaymentGateway};
use seatbook_core::store::{BookingLedger, InventoryStore};
use seatbook_core::types::{BookingId, EventId, Money, TransactionId, UserId};
use seatbook_runtime::metrics::SagaMetrics;
use seatbook_runtime::retry::retry_with_predicate;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::Instrument;

/// Cancels an in-flight `CreateBooking`.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Request cancellation. Seats already reserved are released; a charge
    /// already captured is refunded.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Observed by the saga between steps.
#[derive(Clone, Debug)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    /// A linked handle/signal pair
    #[must_use]
    pub fn pair() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle(tx), Self(rx))
    }

    /// A signal that never fires
    #[must_use]
    pub fn never() -> Self {
        Self(watch::channel(false).1)
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

impl From<watch::Receiver<bool>> for CancelSignal {
    fn from(rx: watch::Receiver<bool>) -> Self {
        Self(rx)
    }
}

/// Collaborators the coordinator drives.
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Seat counters
    pub inventory: Arc<dyn InventoryStore>,
    /// Booking records
    pub ledger: Arc<dyn BookingLedger>,
    /// Payment capability
    pub payments: Arc<dyn PaymentGateway>,
    /// Confirmation fan-out
    pub bus: Arc<dyn EventBus>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// Outcome of [`ReservationCoordinator::recover_in_flight`]
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Bookings driven to a terminal status
    pub recovered: Vec<BookingResult>,
    /// Bookings that could not be settled this time
    pub failed: Vec<(BookingId, BookingError)>,
}

enum ChargeError {
    Gateway(PaymentError),
    Cancelled,
}

impl fmt::Display for ChargeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gateway(e) => write!(f, "{e}"),
            Self::Cancelled => f.write_str("cancelled by caller"),
        }
    }
}

struct Saga {
    inventory: SeatInventory,
    guard: IdempotencyGuard,
    ledger: Arc<dyn BookingLedger>,
    payments: Arc<dyn PaymentGateway>,
    publisher: EventPublisher,
    clock: Arc<dyn Clock>,
    config: SagaConfig,
}

/// Orchestrates inventory, payment and ledger into one booking operation.
#[derive(Clone)]
pub struct ReservationCoordinator {
    saga: Arc<Saga>,
}

impl ReservationCoordinator {
    /// Creates a new `ReservationCoordinator`
    #[must_use]
    pub fn new(env: BookingEnvironment, config: SagaConfig, publisher: &PublisherConfig) -> Self {
        let inventory = SeatInventory::new(env.inventory, Arc::clone(&env.clock), config.cas_retries);
        let guard = IdempotencyGuard::new(
            Arc::clone(&env.clock),
            config.duplicate_wait,
            config.idempotency_retention,
        );
        Self {
            saga: Arc::new(Saga {
                inventory,
                guard,
                ledger: env.ledger,
                payments: env.payments,
                publisher: EventPublisher::new(env.bus, publisher),
                clock: env.clock,
                config,
            }),
        }
    }

    /// Seat inventory (registration, availability, audit trail)
    #[must_use]
    pub fn inventory(&self) -> &SeatInventory {
        &self.saga.inventory
    }

    /// Confirmation publisher
    #[must_use]
    pub fn publisher(&self) -> &EventPublisher {
        &self.saga.publisher
    }

    /// `CreateBooking`.
    ///
    /// Returns `Ok` with the terminal result for every request that entered
    /// the saga, including failed ones.
    ///
    /// # Errors
    ///
    /// Rejections that happen before any side effect: validation, idempotency
    /// mismatch, a duplicate still in flight, or an unreachable ledger.
    pub async fn create_booking(&self, request: BookingRequest) -> Result<BookingResult, BookingError> {
        self.create_booking_with_cancel(request, CancelSignal::never())
            .await
    }

    /// `CreateBooking` observing a caller cancellation signal.
    ///
    /// Cancelling before the saga starts aborts with
    /// [`BookingError::Cancelled`]; cancelling later runs compensation.
    ///
    /// # Errors
    ///
    /// As [`create_booking`](Self::create_booking), plus
    /// [`BookingError::Cancelled`].
    pub async fn create_booking_with_cancel(
        &self,
        request: BookingRequest,
        cancel: CancelSignal,
    ) -> Result<BookingResult, BookingError> {
        self.saga.validate(&request)?;
        if cancel.is_cancelled() {
            return Err(BookingError::Cancelled);
        }

        let booking_id = BookingId::new();
        let begin = self
            .saga
            .guard
            .begin(&request.idempotency_key, &request.fingerprint(), booking_id)?;
        if let Begin::Existing { booking_id } = begin {
            tracing::debug!(key = %request.idempotency_key, %booking_id, "Duplicate request, replaying");
            return self.saga.guard.wait_for_result(&request.idempotency_key).await;
        }

        let span = tracing::info_span!(
            "booking_saga",
            %booking_id,
            event_id = %request.event_id,
            seats = request.seats
        );
        let saga = Arc::clone(&self.saga);
        let key = request.idempotency_key.clone();
        let task = tokio::spawn(async move { saga.run(request, booking_id, cancel).await }.instrument(span));

        task.await.unwrap_or_else(|e| {
            tracing::error!(%booking_id, error = %e, "Saga task aborted");
            self.saga.guard.abandon(&key);
            Err(BookingError::Unavailable(format!("saga task aborted: {e}")))
        })
    }

    /// `GetBooking`.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for unknown bookings.
    pub async fn get_booking(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.saga
            .ledger
            .find_by_id(booking_id)
            .await
            .map_err(|e| match e {
                LedgerError::NotFound(id) => BookingError::NotFound(format!("booking {id}")),
                other => BookingError::Ledger(other),
            })
    }

    /// `ListBookingsByUser`, most recent first.
    ///
    /// # Errors
    ///
    /// Ledger failures.
    pub async fn list_bookings_by_user(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError> {
        Ok(self.saga.ledger.find_by_user(user_id).await?)
    }

    /// Available seats for an event (may be briefly stale).
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for unregistered events.
    pub async fn get_available(&self, event_id: EventId) -> Result<u32, BookingError> {
        Ok(self.saga.inventory.get_available(event_id).await?)
    }

    /// Drop expired idempotency records. Returns how many were dropped.
    pub fn purge_idempotency_records(&self) -> usize {
        self.saga.guard.purge_expired()
    }

    /// Drive every non-terminal booking to a terminal status by compensation.
    ///
    /// Meant to run at startup, before traffic is accepted: bookings found
    /// mid-saga are assumed to belong to a process that no longer exists.
    ///
    /// # Errors
    ///
    /// Ledger failures while listing bookings. Per-booking failures are
    /// collected in the report instead.
    pub async fn recover_in_flight(&self) -> Result<RecoveryReport, BookingError> {
        let in_flight = self.saga.ledger.find_in_flight().await?;
        tracing::info!(count = in_flight.len(), "Recovering interrupted bookings");

        let mut report = RecoveryReport::default();
        for booking in in_flight {
            let booking_id = booking.booking_id;
            match self.saga.recover(booking).await {
                Ok(result) => report.recovered.push(result),
                Err(e) => {
                    tracing::error!(%booking_id, error = %e, "Booking recovery failed");
                    report.failed.push((booking_id, e));
                }
            }
        }
        Ok(report)
    }
}

impl Saga {
    fn validate(&self, request: &BookingRequest) -> Result<Money, BookingError> {
        if request.seats == 0 {
            return Err(BookingError::Validation(
                "seats must be at least 1".to_string(),
            ));
        }
        self.config
            .unit_price
            .checked_mul(request.seats)
            .ok_or_else(|| BookingError::Validation(format!("{} seats overflow the charge amount", request.seats)))
    }

    async fn run(
        &self,
        request: BookingRequest,
        booking_id: BookingId,
        cancel: CancelSignal,
    ) -> Result<BookingResult, BookingError> {
        let started = Instant::now();
        let amount = self.validate(&request)?;
        let mut booking = Booking::new(
            booking_id,
            request.idempotency_key.clone(),
            request.user_id,
            request.event_id,
            request.seats,
            self.clock.now(),
        );

        match self.ledger.append(&booking).await {
            Ok(_) => {}
            Err(LedgerError::DuplicateKey { existing, .. }) => {
                return self.resolve_recorded(&request, existing).await;
            }
            Err(e) => {
                self.guard.abandon(&request.idempotency_key);
                return Err(e.into());
            }
        }
        SagaMetrics::record_started();
        tracing::info!(user_id = %request.user_id, "Booking saga started");

        if cancel.is_cancelled() {
            return self
                .finish(&mut booking, BookingStatus::Failed, Some(cancelled()), started)
                .await;
        }

        // ReservingSeats
        if let Err(e) = self.advance(&mut booking, BookingStatus::ReservingSeats).await {
            return self.abort_before_side_effects(&booking, e);
        }
        if let Some((status, reason)) = self.reserve(&booking).await? {
            return self.finish(&mut booking, status, Some(reason), started).await;
        }

        if cancel.is_cancelled() {
            self.release_held(&booking).await?;
            return self
                .finish(&mut booking, BookingStatus::Failed, Some(cancelled()), started)
                .await;
        }

        // PaymentPending
        if let Err(e) = self.advance(&mut booking, BookingStatus::PaymentPending).await {
            tracing::error!(error = %e, "Could not record PaymentPending, releasing seats");
            self.release_held(&booking).await?;
            return self
                .finish(
                    &mut booking,
                    BookingStatus::Failed,
                    Some(FailureReason::new(FailureKind::PersistenceFailed, e.to_string())),
                    started,
                )
                .await;
        }

        match self.charge(&booking, amount, &cancel).await {
            Ok(transaction_id) => self.settle(booking, transaction_id, &cancel, started).await,
            Err(ChargeError::Cancelled) => {
                self.release_held(&booking).await?;
                self.finish(&mut booking, BookingStatus::Failed, Some(cancelled()), started)
                    .await
            }
            Err(ChargeError::Gateway(e)) => {
                let kind = if e.retryable {
                    FailureKind::PaymentUnavailable
                } else {
                    FailureKind::PaymentDeclined
                };
                tracing::warn!(error = %e, retryable = e.retryable, "Payment failed, compensating");
                if let Err(le) = self.advance(&mut booking, BookingStatus::PaymentFailed).await {
                    tracing::warn!(error = %le, "Could not record PaymentFailed");
                }
                self.release_held(&booking).await?;
                self.finish(
                    &mut booking,
                    BookingStatus::Failed,
                    Some(FailureReason::new(kind, e.reason)),
                    started,
                )
                .await
            }
        }
    }

    /// Reserve step. Returns the terminal status to finish with on failure.
    ///
    /// Errors only when seats from a timed out attempt could not be released;
    /// the booking then stays in flight for recovery.
    async fn reserve(
        &self,
        booking: &Booking,
    ) -> Result<Option<(BookingStatus, FailureReason)>, BookingError> {
        let attempt = retry_with_predicate(
            self.config.reserve_policy(),
            || self
                .inventory
                .try_reserve(booking.event_id, booking.booking_id, booking.seats),
            |e| matches!(e, InventoryError::ConcurrencyConflict { .. }),
        );

        let outcome = match tokio::time::timeout(self.config.reserve_timeout, attempt).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(timeout_ms = duration_ms(self.config.reserve_timeout), "Reserve step timed out");
                // The abandoned attempt may still have landed
                self.release_held(booking).await?;
                return Ok(Some((
                    BookingStatus::Failed,
                    FailureReason::new(FailureKind::Timeout, "seat reservation timed out"),
                )));
            }
        };

        let failure = match outcome {
            Ok(reservation) => {
                tracing::info!(available = reservation.available, "Seats reserved");
                None
            }
            Err(InventoryError::Insufficient {
                available,
                requested,
                ..
            }) => {
                tracing::info!(available, requested, "Not enough seats");
                Some((
                    BookingStatus::InventoryInsufficient,
                    FailureReason::insufficient(available, requested),
                ))
            }
            Err(InventoryError::EventNotFound(event_id)) => Some((
                BookingStatus::Failed,
                FailureReason::new(
                    FailureKind::EventNotFound,
                    format!("event {event_id} is not registered"),
                ),
            )),
            Err(e @ InventoryError::ConcurrencyConflict { .. }) => {
                tracing::warn!(error = %e, "Inventory contention, giving up");
                Some((
                    BookingStatus::Failed,
                    FailureReason::new(FailureKind::ConcurrencyConflict, e.to_string()),
                ))
            }
            Err(e) => {
                tracing::error!(error = %e, "Inventory failure during reserve");
                Some((
                    BookingStatus::Failed,
                    FailureReason::new(FailureKind::PersistenceFailed, e.to_string()),
                ))
            }
        };
        Ok(failure)
    }

    async fn charge(
        &self,
        booking: &Booking,
        amount: Money,
        cancel: &CancelSignal,
    ) -> Result<TransactionId, ChargeError> {
        let metadata = ChargeMetadata {
            booking_id: booking.booking_id,
            user_id: booking.user_id,
            event_id: booking.event_id,
        };
        let metadata = &metadata;
        let timeout = self.config.payment_timeout;

        retry_with_predicate(
            self.config.payment_policy(),
            || async move {
                if cancel.is_cancelled() {
                    return Err(ChargeError::Cancelled);
                }
                SagaMetrics::record_payment_attempt();
                tokio::time::timeout(
                    timeout,
                    self.payments.charge(amount, &self.config.currency, &metadata),
                )
                .await
                .unwrap_or_else(|_| {
                    Err(PaymentError::transient(format!(
                        "charge timed out after {}ms",
                        duration_ms(timeout)
                    )))
                })
                .map_err(ChargeError::Gateway)
            },
            |e| matches!(e, ChargeError::Gateway(p) if p.retryable),
        )
        .await
    }

    /// Record the successful charge and confirm, compensating if either write
    /// fails or the caller cancelled while the charge was in flight.
    async fn settle(
        &self,
        mut booking: Booking,
        transaction_id: TransactionId,
        cancel: &CancelSignal,
        started: Instant,
    ) -> Result<BookingResult, BookingError> {
        tracing::info!(%transaction_id, "Payment captured");
        booking.payment_transaction_id = Some(transaction_id);

        // Record the capture first so recovery can refund it
        if let Err(e) = self.advance(&mut booking, BookingStatus::PaymentPending).await {
            tracing::error!(error = %e, "Could not record transaction id, compensating");
            let reason = FailureReason::new(FailureKind::PersistenceFailed, e.to_string());
            return self.compensate_charge(booking, reason, started).await;
        }

        if cancel.is_cancelled() {
            return self.compensate_charge(booking, cancelled(), started).await;
        }

        for status in [BookingStatus::SeatsReserved, BookingStatus::Confirmed] {
            if let Err(e) = self.advance(&mut booking, status).await {
                tracing::error!(error = %e, %status, "Ledger write failed after payment, compensating");
                let reason = FailureReason::new(FailureKind::PersistenceFailed, e.to_string());
                return self.compensate_charge(booking, reason, started).await;
            }
        }

        let result = self.complete(&booking, started);
        self.publisher.publish(BookingConfirmed {
            booking_id: booking.booking_id,
            user_id: booking.user_id,
            event_id: booking.event_id,
            seats: booking.seats,
            status: booking.status,
            timestamp: booking.updated_at,
        });
        Ok(result)
    }

    async fn compensate_charge(
        &self,
        mut booking: Booking,
        reason: FailureReason,
        started: Instant,
    ) -> Result<BookingResult, BookingError> {
        self.refund(&booking).await?;
        self.release_held(&booking).await?;
        self.finish(&mut booking, BookingStatus::Compensated, Some(reason), started)
            .await
    }

    async fn refund(&self, booking: &Booking) -> Result<(), BookingError> {
        let Some(transaction_id) = booking.payment_transaction_id.as_ref() else {
            return Ok(());
        };

        retry_with_predicate(
            self.config.payment_policy(),
            || self.payments.refund(transaction_id),
            |e: &PaymentError| e.retryable,
        )
        .await
        .map_err(|e| {
            tracing::error!(%transaction_id, error = %e, "Refund failed, booking left for recovery");
            self.guard.abandon(&booking.idempotency_key);
            BookingError::Payment(e)
        })?;

        SagaMetrics::record_compensation("refund");
        tracing::info!(%transaction_id, "Charge refunded");
        Ok(())
    }

    /// Release whatever the inventory ledger says this booking still holds.
    async fn release_held(&self, booking: &Booking) -> Result<(), BookingError> {
        let held = self
            .inventory
            .seats_held(booking.event_id, booking.booking_id)
            .await
            .map_err(|e| self.leave_for_recovery(booking, e))?;
        if held == 0 {
            return Ok(());
        }

        retry_with_predicate(
            self.config.reserve_policy(),
            || self.inventory.release(booking.event_id, booking.booking_id, held),
            |e| matches!(e, InventoryError::ConcurrencyConflict { .. }),
        )
        .await
        .map_err(|e| self.leave_for_recovery(booking, e))?;

        SagaMetrics::record_compensation("release");
        Ok(())
    }

    fn leave_for_recovery(&self, booking: &Booking, error: InventoryError) -> BookingError {
        tracing::error!(
            booking_id = %booking.booking_id,
            error = %error,
            "Seat release failed, booking left for recovery"
        );
        self.guard.abandon(&booking.idempotency_key);
        error.into()
    }

    async fn advance(&self, booking: &mut Booking, status: BookingStatus) -> Result<(), LedgerError> {
        let mut next = booking.clone();
        next.status = status;
        next.updated_at = self.clock.now();
        self.ledger.update(&next).await?;
        tracing::debug!(from = %booking.status, to = %status, "Booking advanced");
        *booking = next;
        Ok(())
    }

    fn abort_before_side_effects(
        &self,
        booking: &Booking,
        error: LedgerError,
    ) -> Result<BookingResult, BookingError> {
        tracing::error!(error = %error, "Ledger unavailable before reserving, aborting");
        self.guard.abandon(&booking.idempotency_key);
        Err(error.into())
    }

    /// Persist a non-confirmed terminal status, then complete the
    /// idempotency record.
    async fn finish(
        &self,
        booking: &mut Booking,
        status: BookingStatus,
        reason: Option<FailureReason>,
        started: Instant,
    ) -> Result<BookingResult, BookingError> {
        let mut next = booking.clone();
        next.status = status;
        next.failure = reason;
        next.updated_at = self.clock.now();

        if let Err(e) = self.ledger.update(&next).await {
            tracing::error!(error = %e, %status, "Terminal status could not be recorded");
            self.guard.abandon(&booking.idempotency_key);
            return Err(e.into());
        }
        *booking = next;
        Ok(self.complete(booking, started))
    }

    fn complete(&self, booking: &Booking, started: Instant) -> BookingResult {
        let result = booking.result();
        self.guard.complete(
            &booking.idempotency_key,
            &booking.request().fingerprint(),
            booking.booking_id,
            result.clone(),
        );
        SagaMetrics::record_completed(booking.status.as_str(), started.elapsed());
        match &booking.failure {
            None => tracing::info!(status = %booking.status, "Booking saga finished"),
            Some(reason) => tracing::info!(status = %booking.status, %reason, "Booking saga finished"),
        }
        result
    }

    /// The key was already recorded in the ledger (by an earlier process or a
    /// request whose guard record expired).
    async fn resolve_recorded(
        &self,
        request: &BookingRequest,
        existing: BookingId,
    ) -> Result<BookingResult, BookingError> {
        let booking = match self.ledger.find_by_id(existing).await {
            Ok(booking) => booking,
            Err(e) => {
                self.guard.abandon(&request.idempotency_key);
                return Err(e.into());
            }
        };

        let same_payload = booking.user_id == request.user_id
            && booking.event_id == request.event_id
            && booking.seats == request.seats;
        if !same_payload {
            self.guard.abandon(&request.idempotency_key);
            return Err(BookingError::IdempotencyMismatch(request.idempotency_key.clone()));
        }

        if booking.status.is_terminal() {
            let result = booking.result();
            self.guard.complete(
                &booking.idempotency_key,
                &request.fingerprint(),
                booking.booking_id,
                result.clone(),
            );
            return Ok(result);
        }
        self.recover(booking).await
    }

    /// Settle an interrupted booking: refund if charged, release held seats,
    /// then `Compensated` (charged) or `Failed` (not charged).
    async fn recover(&self, mut booking: Booking) -> Result<BookingResult, BookingError> {
        let started = Instant::now();
        let detail = format!("saga interrupted at {}", booking.status);
        tracing::warn!(booking_id = %booking.booking_id, status = %booking.status, "Recovering booking");

        if booking.payment_transaction_id.is_some() {
            let reason = FailureReason::new(FailureKind::PersistenceFailed, detail);
            return self.compensate_charge(booking, reason, started).await;
        }

        if booking.status == BookingStatus::PaymentPending {
            // A charge may have been captured without its id being recorded;
            // the gateway reference is the booking id.
            tracing::warn!(
                booking_id = %booking.booking_id,
                "Interrupted during payment, reconcile with the gateway by booking id"
            );
        }
        self.release_held(&booking).await?;
        let reason = FailureReason::new(FailureKind::PersistenceFailed, detail);
        self.finish(&mut booking, BookingStatus::Failed, Some(reason), started)
            .await
    }
}

fn cancelled() -> FailureReason {
    FailureReason::new(FailureKind::Cancelled, "cancelled by caller")
}

fn duration_ms(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
