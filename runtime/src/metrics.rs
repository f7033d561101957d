//! Prometheus metrics for the booking saga.
//!
//! Recorders are zero-sized types with associated functions so call sites read
//! as `SagaMetrics::record_started()`. Without an installed recorder every call
//! is a no-op, which keeps unit tests free of global setup.
//!
//! # Example
//!
//! ```rust,no_run
//! use seatbook_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics exporter.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe all saga metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// A second install in the same process (common in tests) is logged and
    /// treated as success.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Address the exporter was configured with.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Saga
    describe_counter!(
        "booking_saga_started_total",
        "Booking sagas that passed the idempotency guard"
    );
    describe_counter!(
        "booking_saga_completed_total",
        "Booking sagas that reached a terminal status, labelled by status"
    );
    describe_histogram!(
        "booking_saga_duration_seconds",
        "Time from saga start to terminal status"
    );
    describe_counter!(
        "booking_compensations_total",
        "Compensating actions executed, labelled by step (release, refund)"
    );

    // Inventory and payment
    describe_counter!(
        "inventory_cas_conflicts_total",
        "Inventory compare-and-swap attempts that lost to a concurrent writer"
    );
    describe_counter!(
        "payment_attempts_total",
        "Charge attempts sent to the payment gateway"
    );

    // Publishing
    describe_counter!(
        "booking_publish_failures_total",
        "BookingConfirmed messages dead-lettered after exhausting retries"
    );
    describe_gauge!("dlq_size", "Entries waiting in the dead-letter queue");
    describe_counter!("dlq_pushed_total", "Entries pushed to the dead-letter queue");
    describe_counter!(
        "dlq_dropped_total",
        "Entries dropped because the dead-letter queue was full"
    );

    // Retry
    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!("retry_successes_total", "Operations that succeeded after retrying");
    describe_counter!(
        "retry_exhausted_total",
        "Operations that failed after exhausting max retries"
    );
}

/// Saga metrics recorder.
pub struct SagaMetrics;

impl SagaMetrics {
    /// A saga started.
    pub fn record_started() {
        counter!("booking_saga_started_total").increment(1);
    }

    /// A saga reached terminal `status` after `duration`.
    pub fn record_completed(status: &'static str, duration: Duration) {
        counter!("booking_saga_completed_total", "status" => status).increment(1);
        histogram!("booking_saga_duration_seconds").record(duration.as_secs_f64());
    }

    /// A compensating action ran.
    pub fn record_compensation(step: &'static str) {
        counter!("booking_compensations_total", "step" => step).increment(1);
    }

    /// An inventory CAS lost against a concurrent writer.
    pub fn record_cas_conflict() {
        counter!("inventory_cas_conflicts_total").increment(1);
    }

    /// A charge attempt was sent to the gateway.
    pub fn record_payment_attempt() {
        counter!("payment_attempts_total").increment(1);
    }

    /// A confirmation could not be published and was dead-lettered.
    pub fn record_publish_failure() {
        counter!("booking_publish_failures_total").increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.render().is_none());
        assert_eq!(server.addr(), addr);
    }

    #[test]
    fn test_saga_metrics_render() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        server.start().unwrap();

        SagaMetrics::record_started();
        SagaMetrics::record_completed("confirmed", Duration::from_millis(20));
        SagaMetrics::record_compensation("release");
        SagaMetrics::record_cas_conflict();

        // Another test in this binary may have installed the recorder first.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("booking_saga_started_total"));
            assert!(rendered.contains("booking_compensations_total"));
        }
    }
}
