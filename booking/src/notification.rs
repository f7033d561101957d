//! Notification consumer.
//!
//! Subscribes to booking confirmations and records one notification per
//! booking. Delivery is at-least-once, so redeliveries of the same booking id
//! are recognised and skipped.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use seatbook_core::booking::BookingStatus;
use seatbook_core::event::{BookingConfirmed, Event, SerializedEvent};
use seatbook_core::event_bus::{EventBus, EventBusError};
use seatbook_core::types::{BookingId, EventId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

/// A notification ready for an outbound channel (email formatting is someone
/// else's job).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Confirmed booking
    pub booking_id: BookingId,
    /// Recipient
    pub user_id: UserId,
    /// Booked event
    pub event_id: EventId,
    /// Seats booked
    pub seats: u32,
    /// Booking status at confirmation
    pub status: BookingStatus,
    /// When the confirmation was produced
    pub confirmed_at: DateTime<Utc>,
}

impl From<BookingConfirmed> for Notification {
    fn from(event: BookingConfirmed) -> Self {
        Self {
            booking_id: event.booking_id,
            user_id: event.user_id,
            event_id: event.event_id,
            seats: event.seats,
            status: event.status,
            confirmed_at: event.timestamp,
        }
    }
}

#[derive(Debug, Default)]
struct Inbox {
    seen: HashSet<BookingId>,
    notifications: Vec<Notification>,
}

/// Idempotent consumer of `BookingConfirmed`.
#[derive(Debug, Default)]
pub struct NotificationConsumer {
    inbox: Mutex<Inbox>,
}

impl NotificationConsumer {
    /// Creates a new `NotificationConsumer`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one delivery. Returns `true` if it produced a notification,
    /// `false` for duplicates and unrelated message types.
    ///
    /// # Errors
    ///
    /// [`EventBusError::DeserializationFailed`] for undecodable payloads.
    pub fn handle(&self, message: &SerializedEvent) -> Result<bool, EventBusError> {
        if message.event_type != BookingConfirmed::EVENT_TYPE {
            tracing::trace!(event_type = %message.event_type, "Ignoring unrelated message");
            return Ok(false);
        }

        let event = BookingConfirmed::from_bytes(&message.data)
            .map_err(|e| EventBusError::DeserializationFailed(e.to_string()))?;

        let mut inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        if !inbox.seen.insert(event.booking_id) {
            tracing::debug!(booking_id = %event.booking_id, "Duplicate confirmation skipped");
            return Ok(false);
        }

        tracing::info!(
            booking_id = %event.booking_id,
            user_id = %event.user_id,
            seats = event.seats,
            "Booking confirmation notification queued"
        );
        inbox.notifications.push(event.into());
        Ok(true)
    }

    /// Subscribe to `topic` and process deliveries on a background task.
    ///
    /// The subscription is established before this returns, so nothing
    /// published afterwards is missed.
    ///
    /// # Errors
    ///
    /// [`EventBusError::SubscriptionFailed`] if the bus rejects the subscription.
    pub async fn start(
        self: Arc<Self>,
        bus: &dyn EventBus,
        topic: &str,
    ) -> Result<JoinHandle<()>, EventBusError> {
        let mut stream = bus.subscribe(&[topic]).await?;
        tracing::info!(topic, "Notification consumer subscribed");

        Ok(tokio::spawn(async move {
            while let Some(delivery) = stream.next().await {
                let outcome = delivery.and_then(|message| self.handle(&message));
                if let Err(e) = outcome {
                    tracing::warn!(error = %e, "Notification delivery failed");
                }
            }
            tracing::info!("Notification stream closed");
        }))
    }

    /// Notifications produced so far, in arrival order
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .notifications
            .clone()
    }
}
