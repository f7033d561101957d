//! Authenticated entry points.
//!
//! Resolves the caller from a bearer token, parses raw identifiers and
//! enforces ownership before handing off to the [`ReservationCoordinator`].

use crate::coordinator::{CancelSignal, ReservationCoordinator};
use seatbook_core::booking::{Booking, BookingRequest, BookingResult};
use seatbook_core::environment::{AuthValidator, EventCatalog, Principal, Role, Unauthorized};
use seatbook_core::error::BookingError;
use seatbook_core::inventory::EventInventory;
use seatbook_core::types::{BookingId, EventId, IdempotencyKey, ParseIdError};
use std::sync::Arc;

/// Booking operations as seen by an end user.
#[derive(Clone)]
pub struct BookingApp {
    coordinator: ReservationCoordinator,
    auth: Arc<dyn AuthValidator>,
    catalog: Arc<dyn EventCatalog>,
}

impl BookingApp {
    /// Creates a new `BookingApp`
    #[must_use]
    pub fn new(
        coordinator: ReservationCoordinator,
        auth: Arc<dyn AuthValidator>,
        catalog: Arc<dyn EventCatalog>,
    ) -> Self {
        Self {
            coordinator,
            auth,
            catalog,
        }
    }

    /// Underlying coordinator
    #[must_use]
    pub const fn coordinator(&self) -> &ReservationCoordinator {
        &self.coordinator
    }

    /// Book `seats` on `event_id` for the token's user.
    ///
    /// # Errors
    ///
    /// [`BookingError::Unauthorized`] for rejected tokens,
    /// [`BookingError::Validation`] for malformed identifiers, and anything
    /// [`ReservationCoordinator::create_booking`] rejects.
    pub async fn create_booking(
        &self,
        token: &str,
        idempotency_key: &str,
        event_id: &str,
        seats: u32,
    ) -> Result<BookingResult, BookingError> {
        self.create_booking_with_cancel(token, idempotency_key, event_id, seats, CancelSignal::never())
            .await
    }

    /// [`create_booking`](Self::create_booking) with a cancellation signal.
    ///
    /// # Errors
    ///
    /// As [`create_booking`](Self::create_booking).
    pub async fn create_booking_with_cancel(
        &self,
        token: &str,
        idempotency_key: &str,
        event_id: &str,
        seats: u32,
        cancel: CancelSignal,
    ) -> Result<BookingResult, BookingError> {
        let principal = self.authenticate(token).await?;
        let idempotency_key = IdempotencyKey::new(idempotency_key).map_err(invalid)?;
        let event_id = event_id.parse::<EventId>().map_err(invalid)?;

        let request = BookingRequest::new(idempotency_key, principal.user_id, event_id, seats);
        self.coordinator
            .create_booking_with_cancel(request, cancel)
            .await
    }

    /// A booking, visible to its owner and to admins.
    ///
    /// # Errors
    ///
    /// [`BookingError::Unauthorized`] for other users,
    /// [`BookingError::NotFound`] for unknown bookings.
    pub async fn get_booking(&self, token: &str, booking_id: &str) -> Result<Booking, BookingError> {
        let principal = self.authenticate(token).await?;
        let booking_id = booking_id.parse::<BookingId>().map_err(invalid)?;

        let booking = self.coordinator.get_booking(booking_id).await?;
        if principal.role != Role::Admin && booking.user_id != principal.user_id {
            tracing::warn!(%booking_id, user_id = %principal.user_id, "Booking access denied");
            return Err(Unauthorized(format!("booking {booking_id} belongs to another user")).into());
        }
        Ok(booking)
    }

    /// The caller's bookings, most recent first.
    ///
    /// # Errors
    ///
    /// [`BookingError::Unauthorized`] for rejected tokens.
    pub async fn list_my_bookings(&self, token: &str) -> Result<Vec<Booking>, BookingError> {
        let principal = self.authenticate(token).await?;
        self.coordinator.list_bookings_by_user(principal.user_id).await
    }

    /// Register an event's inventory from the catalog. Admin only.
    ///
    /// # Errors
    ///
    /// [`BookingError::Unauthorized`] for non-admins, catalog failures, or
    /// inventory registration failures.
    pub async fn register_event(&self, token: &str, event_id: EventId) -> Result<EventInventory, BookingError> {
        let principal = self.authenticate(token).await?;
        if principal.role != Role::Admin {
            return Err(Unauthorized("event registration requires an admin".to_string()).into());
        }

        let total_seats = self.catalog.total_seats(event_id).await?;
        let inventory = self
            .coordinator
            .inventory()
            .register(event_id, total_seats)
            .await?;
        tracing::info!(%event_id, total_seats, admin = %principal.user_id, "Event opened for booking");
        Ok(inventory)
    }

    async fn authenticate(&self, token: &str) -> Result<Principal, BookingError> {
        self.auth.validate(token).await.map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            BookingError::from(e)
        })
    }
}

fn invalid(err: ParseIdError) -> BookingError {
    BookingError::Validation(err.to_string())
}
