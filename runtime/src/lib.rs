//! # Seatbook Runtime
//!
//! Operational plumbing shared by the booking services:
//!
//! - **Retry**: bounded exponential backoff ([`retry`])
//! - **Dead letters**: bounded storage for undeliverable messages ([`dead_letter`])
//! - **Metrics**: Prometheus exporter and saga recorders ([`metrics`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Retry logic with exponential backoff
pub mod retry;

/// Dead-letter queue for messages that exhausted retries
pub mod dead_letter;

/// Prometheus metrics for observability
pub mod metrics;

pub use dead_letter::{DeadLetter, DeadLetterQueue};
pub use metrics::{MetricsServer, SagaMetrics};
pub use retry::{RetryPolicy, retry_with_backoff, retry_with_predicate};
