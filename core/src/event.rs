//! Published messages and their wire format.
//!
//! Messages leaving the saga are serialized with `bincode` into a
//! [`SerializedEvent`] carrying a versioned type name and optional JSON
//! metadata. The only message the booking core publishes today is
//! [`BookingConfirmed`].
//!
//! # Example
//!
//! ```
//! use seatbook_core::event::{BookingConfirmed, Event, SerializedEvent};
//! use seatbook_core::booking::BookingStatus;
//! use seatbook_core::types::{BookingId, EventId, UserId};
//! use chrono::Utc;
//!
//! let message = BookingConfirmed {
//!     booking_id: BookingId::new(),
//!     user_id: UserId::new(),
//!     event_id: EventId::new(),
//!     seats: 2,
//!     status: BookingStatus::Confirmed,
//!     timestamp: Utc::now(),
//! };
//!
//! let serialized = SerializedEvent::from_event(&message, None).unwrap();
//! assert_eq!(serialized.event_type, "BookingConfirmed.v1");
//! ```

use crate::booking::BookingStatus;
use crate::types::{BookingId, EventId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),

    /// Unknown event type encountered during deserialization.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// A message that can be published to the event bus.
///
/// The `event_type()` string is stable and versioned (`"BookingConfirmed.v1"`)
/// so consumers can route and evolve schemas independently.
pub trait Event: Send + Sync + 'static {
    /// Returns the versioned type identifier for this event.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes are corrupted or
    /// belong to a different schema.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// A serialized event ready for the bus.
#[derive(Clone, Debug)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., "BookingConfirmed.v1").
    pub event_type: String,

    /// The bincode-serialized event data.
    pub data: Vec<u8>,

    /// Optional metadata.
    ///
    /// The publisher sets `correlation_id` to the booking id so consumers can
    /// deduplicate redeliveries.
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
        }
    }

    /// Create a serialized event from an `Event`.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event<E: Event + Serialize>(
        event: &E,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.to_bytes()?,
            metadata,
        })
    }

    /// Correlation id from metadata, if any
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("correlation_id"))
            .and_then(serde_json::Value::as_str)
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}

/// Published once a booking reaches `Confirmed`. Delivered at least once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmed {
    /// Confirmed booking
    pub booking_id: BookingId,
    /// Booking owner
    pub user_id: UserId,
    /// Booked event
    pub event_id: EventId,
    /// Seats held
    pub seats: u32,
    /// Always `Confirmed`
    pub status: BookingStatus,
    /// When the booking was confirmed
    pub timestamp: DateTime<Utc>,
}

impl BookingConfirmed {
    /// Event type identifier on the wire
    pub const EVENT_TYPE: &'static str = "BookingConfirmed.v1";
}

impl Event for BookingConfirmed {
    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed() -> BookingConfirmed {
        BookingConfirmed {
            booking_id: BookingId::new(),
            user_id: UserId::new(),
            event_id: EventId::new(),
            seats: 3,
            status: BookingStatus::Confirmed,
            timestamp: Utc::now(),
        }
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if serialization fails
    fn serialized_event_carries_correlation_id() {
        let message = confirmed();
        let metadata = serde_json::json!({
            "correlation_id": message.booking_id.to_string(),
        });

        let serialized = SerializedEvent::from_event(&message, Some(metadata))
            .expect("serialization should succeed");

        assert_eq!(serialized.event_type, "BookingConfirmed.v1");
        assert_eq!(
            serialized.correlation_id(),
            Some(message.booking_id.to_string().as_str())
        );
        let decoded =
            BookingConfirmed::from_bytes(&serialized.data).expect("deserialization should succeed");
        assert_eq!(decoded, message);
    }

    #[test]
    fn corrupted_bytes_are_rejected() {
        let result = BookingConfirmed::from_bytes(&[1, 2, 3]);
        assert!(matches!(result, Err(EventError::DeserializationError(_))));
    }

    #[test]
    fn serialized_event_display() {
        let serialized =
            SerializedEvent::new("BookingConfirmed.v1".to_string(), vec![1, 2, 3, 4, 5], None);

        let display = format!("{serialized}");
        assert!(display.contains("BookingConfirmed.v1"));
        assert!(display.contains("5 bytes"));
        assert_eq!(serialized.correlation_id(), None);
    }
}
