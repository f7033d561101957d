//! Bounded dead-letter queue for messages that exhausted their retries.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Dead letter queue entry
///
/// A payload that could not be delivered, plus what is known about the failure.
#[derive(Debug, Clone)]
pub struct DeadLetter<T> {
    /// The undeliverable payload
    pub payload: T,

    /// Number of delivery attempts made
    pub attempts: usize,

    /// The error message from the last failure
    pub error_message: String,

    /// When the entry was dead-lettered
    pub failed_at: DateTime<Utc>,
}

/// Dead Letter Queue for storing failed deliveries
///
/// Bounded FIFO: when full, the oldest entry is dropped to make room. Clones
/// share the same storage, so the publisher and an operator view can hold
/// separate handles.
///
/// # Example
///
/// ```
/// use seatbook_runtime::dead_letter::DeadLetterQueue;
///
/// let dlq = DeadLetterQueue::new(2);
/// dlq.push("a", "broker down".to_string(), 5);
/// dlq.push("b", "broker down".to_string(), 5);
/// dlq.push("c", "broker down".to_string(), 5);
///
/// let drained: Vec<_> = dlq.drain().into_iter().map(|e| e.payload).collect();
/// assert_eq!(drained, vec!["b", "c"]);
/// ```
#[derive(Debug)]
pub struct DeadLetterQueue<T> {
    queue: Arc<Mutex<VecDeque<DeadLetter<T>>>>,
    max_size: usize,
}

impl<T> DeadLetterQueue<T> {
    /// Create a new dead letter queue holding at most `max_size` entries
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            max_size: max_size.max(1),
        }
    }

    /// Push an undeliverable payload onto the queue
    ///
    /// If the queue is full, the oldest entry is dropped.
    pub fn push(&self, payload: T, error_message: String, attempts: usize) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);

        if queue.len() >= self.max_size {
            queue.pop_front();
            metrics::counter!("dlq_dropped_total").increment(1);
            tracing::warn!(
                max_size = self.max_size,
                "DLQ at capacity, dropping oldest entry"
            );
        }

        queue.push_back(DeadLetter {
            payload,
            attempts,
            error_message,
            failed_at: Utc::now(),
        });

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("dlq_size").set(queue.len() as f64);
        metrics::counter!("dlq_pushed_total").increment(1);

        tracing::warn!(
            attempts,
            queue_size = queue.len(),
            "Message added to dead letter queue"
        );
    }

    /// Get the current queue size
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain all entries from the queue, oldest first
    pub fn drain(&self) -> Vec<DeadLetter<T>> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let entries: Vec<_> = queue.drain(..).collect();

        metrics::gauge!("dlq_size").set(0.0);
        tracing::info!(count = entries.len(), "Drained dead letter queue");

        entries
    }

    /// Peek at the oldest entry without removing it
    #[must_use]
    pub fn peek(&self) -> Option<DeadLetter<T>>
    where
        T: Clone,
    {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .front()
            .cloned()
    }

    /// Get the maximum queue size
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}

impl<T> Clone for DeadLetterQueue<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            max_size: self.max_size,
        }
    }
}

impl<T> Default for DeadLetterQueue<T> {
    fn default() -> Self {
        Self::new(1000)
    }
}
