//! In-process event bus.
//!
//! Fans confirmations out to subscribers in the same process over a tokio
//! broadcast channel. Good enough for a single node and for the demo binary;
//! a broker-backed [`EventBus`] replaces it in a multi-node deployment.

use seatbook_core::event::SerializedEvent;
use seatbook_core::event_bus::{EventBus, EventBusError, EventStream};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::broadcast;

/// Default per-subscriber buffer
const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast-backed [`EventBus`].
///
/// Subscribers that fall more than `capacity` messages behind receive a
/// lag error and then continue with the newest messages.
#[derive(Clone, Debug)]
pub struct LocalEventBus {
    tx: broadcast::Sender<(String, SerializedEvent)>,
}

impl LocalEventBus {
    /// Bus with the default buffer
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Bus buffering up to `capacity` messages per subscriber
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity.max(1)).0,
        }
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for LocalEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let receivers = self
            .tx
            .send((topic.to_string(), event.clone()))
            .unwrap_or(0);
        tracing::trace!(topic, receivers, event_type = %event.event_type, "Event broadcast");
        Box::pin(async { Ok(()) })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(ToString::to_string).collect();
        let mut rx = self.tx.subscribe();
        Box::pin(async move {
            let stream = async_stream::stream! {
                loop {
                    match rx.recv().await {
                        Ok((topic, event)) if topics.contains(&topic) => yield Ok(event),
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Subscriber lagged, messages dropped");
                            yield Err(EventBusError::Other(format!("subscriber lagged by {skipped} messages")));
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}
