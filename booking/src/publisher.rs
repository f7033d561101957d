//! Event Publisher.
//!
//! Fans `BookingConfirmed` out to the event bus after a booking is durably
//! confirmed. Publishing runs on a background task with bounded retries; a
//! message that still cannot be delivered is dead-lettered. Nothing here ever
//! reaches back into the saga: a failed publish never reopens a booking.

use crate::config::PublisherConfig;
use seatbook_core::error::BookingError;
use seatbook_core::event::{BookingConfirmed, SerializedEvent};
use seatbook_core::event_bus::{EventBus, EventBusError};
use seatbook_runtime::dead_letter::DeadLetterQueue;
use seatbook_runtime::metrics::SagaMetrics;
use seatbook_runtime::retry::{RetryPolicy, retry_with_backoff};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

/// Background, at-least-once publisher for confirmations.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    topic: String,
    policy: RetryPolicy,
    dead_letters: DeadLetterQueue<BookingConfirmed>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl EventPublisher {
    /// Creates a new `EventPublisher`
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, config: &PublisherConfig) -> Self {
        Self {
            bus,
            topic: config.topic.clone(),
            policy: config.retry_policy(),
            dead_letters: DeadLetterQueue::new(config.dlq_capacity),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Topic confirmations are published to
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish in the background. Errors are logged and dead-lettered, never
    /// returned.
    pub fn publish(&self, event: BookingConfirmed) {
        let publisher = self.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = publisher.publish_with_retry(&event).await {
                tracing::error!(
                    booking_id = %event.booking_id,
                    error = %e,
                    "BookingConfirmed undeliverable, dead-lettering"
                );
                SagaMetrics::record_publish_failure();
                publisher
                    .dead_letters
                    .push(event, e.to_string(), publisher.policy.max_attempts());
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Publish now, retrying transient bus failures.
    ///
    /// # Errors
    ///
    /// [`BookingError::Publish`] once retries are exhausted or the message
    /// cannot be serialized.
    pub async fn publish_with_retry(&self, event: &BookingConfirmed) -> Result<(), BookingError> {
        let metadata = serde_json::json!({
            "correlation_id": event.booking_id.to_string(),
            "event_id": event.event_id.to_string(),
        });
        let serialized = SerializedEvent::from_event(event, Some(metadata))
            .map_err(|e| EventBusError::Other(e.to_string()))?;

        retry_with_backoff(self.policy.clone(), || self.bus.publish(&self.topic, &serialized)).await?;

        tracing::debug!(booking_id = %event.booking_id, topic = %self.topic, "BookingConfirmed published");
        Ok(())
    }

    /// Wait for every background publish started so far
    pub async fn flush(&self) {
        let handles: Vec<_> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Publish task failed");
            }
        }
    }

    /// Messages that exhausted their retries
    #[must_use]
    pub fn dead_letters(&self) -> &DeadLetterQueue<BookingConfirmed> {
        &self.dead_letters
    }

    /// Retry every dead-lettered message once through the normal retry path.
    /// Returns how many were delivered; the rest go back on the queue.
    pub async fn redeliver_dead_letters(&self) -> usize {
        let mut delivered = 0;
        for entry in self.dead_letters.drain() {
            match self.publish_with_retry(&entry.payload).await {
                Ok(()) => delivered += 1,
                Err(e) => self.dead_letters.push(
                    entry.payload,
                    e.to_string(),
                    entry.attempts + self.policy.max_attempts(),
                ),
            }
        }
        tracing::info!(delivered, remaining = self.dead_letters.len(), "Dead letters redelivered");
        delivered
    }
}
