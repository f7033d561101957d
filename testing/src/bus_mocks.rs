//! In-memory event bus backed by a tokio broadcast channel.

#![allow(clippy::missing_panics_doc)]

use seatbook_core::event::SerializedEvent;
use seatbook_core::event_bus::{EventBus, EventBusError, EventStream};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// In-memory [`EventBus`] for tests.
///
/// Every successful publish is captured and fanned out to subscribers of the
/// topic. Failures can be injected with [`InMemoryEventBus::fail_next`] or
/// [`InMemoryEventBus::fail_always`].
#[derive(Clone, Debug)]
pub struct InMemoryEventBus {
    tx: broadcast::Sender<(String, SerializedEvent)>,
    published: Arc<Mutex<Vec<(String, SerializedEvent)>>>,
    failures_remaining: Arc<AtomicUsize>,
    publish_attempts: Arc<AtomicUsize>,
}

impl InMemoryEventBus {
    /// Create a bus that accepts every publish
    #[must_use]
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(1024).0,
            published: Arc::new(Mutex::new(Vec::new())),
            failures_remaining: Arc::new(AtomicUsize::new(0)),
            publish_attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the next `n` publishes
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Fail every publish from now on
    pub fn fail_always(&self) {
        self.fail_next(usize::MAX);
    }

    /// Events published successfully, with their topics
    #[must_use]
    pub fn published(&self) -> Vec<(String, SerializedEvent)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish calls received, successful or not
    #[must_use]
    pub fn publish_attempts(&self) -> usize {
        self.publish_attempts.load(Ordering::SeqCst)
    }

    /// Deliver `event` to subscribers again without recording it, simulating
    /// an at-least-once redelivery
    pub fn redeliver(&self, topic: &str, event: SerializedEvent) {
        let _ = self.tx.send((topic.to_string(), event));
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        Box::pin(async move {
            self.publish_attempts.fetch_add(1, Ordering::SeqCst);
            if self.take_failure() {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: "injected failure".to_string(),
                });
            }

            self.published
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((topic.clone(), event.clone()));
            // No subscribers is not an error
            let _ = self.tx.send((topic, event));
            Ok(())
        })
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
                        Ok((topic, event)) => {
                            if topics.contains(&topic) {
                                yield Ok(event);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
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
