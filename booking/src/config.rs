//! Configuration management for the booking service.
//!
//! Loads configuration from environment variables with sensible defaults.

use seatbook_core::types::{Currency, Money};
use seatbook_runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Saga retry budgets, deadlines and pricing
    pub saga: SagaConfig,
    /// Background publishing of `BookingConfirmed`
    pub publisher: PublisherConfig,
    /// Logging and metrics
    pub server: ServerConfig,
}

/// Knobs of the reservation saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaConfig {
    /// Price charged per seat
    pub unit_price: Money,
    /// Charge currency
    pub currency: Currency,
    /// Compare-and-swap attempts per `TryReserve` before a conflict surfaces
    pub cas_retries: usize,
    /// Saga-level retries after a surfaced conflict
    pub reserve_attempts: usize,
    /// Initial backoff between saga-level reserve retries
    pub reserve_backoff: Duration,
    /// Deadline for the whole reserve step
    pub reserve_timeout: Duration,
    /// Retries for retryable payment failures
    pub payment_retries: usize,
    /// Initial payment backoff (doubles per retry)
    pub payment_backoff: Duration,
    /// Deadline for a single charge attempt
    pub payment_timeout: Duration,
    /// How long a duplicate request waits for the in-flight original
    pub duplicate_wait: Duration,
    /// How long completed idempotency records are kept
    pub idempotency_retention: Duration,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            unit_price: Money::from_dollars(50),
            currency: Currency::usd(),
            cas_retries: 5,
            reserve_attempts: 3,
            reserve_backoff: Duration::from_millis(10),
            reserve_timeout: Duration::from_millis(2000),
            payment_retries: 3,
            payment_backoff: Duration::from_millis(100),
            payment_timeout: Duration::from_millis(5000),
            duplicate_wait: Duration::from_millis(3000),
            idempotency_retention: Duration::from_secs(86_400),
        }
    }
}

impl SagaConfig {
    /// Defaults with millisecond backoffs so tests stay fast
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            reserve_backoff: Duration::from_millis(1),
            reserve_timeout: Duration::from_millis(500),
            payment_backoff: Duration::from_millis(1),
            payment_timeout: Duration::from_millis(200),
            duplicate_wait: Duration::from_millis(500),
            ..Self::default()
        }
    }

    /// Override the payment retry budget
    #[must_use]
    pub const fn with_payment_retries(mut self, retries: usize) -> Self {
        self.payment_retries = retries;
        self
    }

    /// Override the per-attempt charge deadline
    #[must_use]
    pub const fn with_payment_timeout(mut self, timeout: Duration) -> Self {
        self.payment_timeout = timeout;
        self
    }

    /// Override the deadline for the reserve step
    #[must_use]
    pub const fn with_reserve_timeout(mut self, timeout: Duration) -> Self {
        self.reserve_timeout = timeout;
        self
    }

    /// Override how long duplicates wait for the original
    #[must_use]
    pub const fn with_duplicate_wait(mut self, wait: Duration) -> Self {
        self.duplicate_wait = wait;
        self
    }

    /// Saga-level retry policy for surfaced inventory conflicts
    #[must_use]
    pub fn reserve_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.reserve_attempts.saturating_sub(1))
            .initial_delay(self.reserve_backoff)
            .max_delay(self.reserve_timeout)
            .build()
    }

    /// Retry policy for retryable payment failures
    #[must_use]
    pub fn payment_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.payment_retries)
            .initial_delay(self.payment_backoff)
            .max_delay(self.payment_timeout)
            .build()
    }
}

/// Background publisher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Topic for `BookingConfirmed`
    pub topic: String,
    /// Retries before a message is dead-lettered
    pub publish_retries: usize,
    /// Initial backoff between publish retries
    pub publish_backoff: Duration,
    /// Dead-letter queue capacity
    pub dlq_capacity: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            topic: "booking-events".to_string(),
            publish_retries: 5,
            publish_backoff: Duration::from_millis(100),
            dlq_capacity: 1000,
        }
    }
}

impl PublisherConfig {
    /// Defaults with millisecond backoffs so tests stay fast
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            publish_backoff: Duration::from_millis(1),
            ..Self::default()
        }
    }

    /// Retry policy for background publishing
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.publish_retries)
            .initial_delay(self.publish_backoff)
            .max_delay(Duration::from_secs(10))
            .build()
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Metrics exporter host
    pub metrics_host: String,
    /// Metrics exporter port
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let saga_defaults = SagaConfig::default();
        let publisher_defaults = PublisherConfig::default();

        Self {
            saga: SagaConfig {
                unit_price: Money::from_cents(env_or(
                    "SEATBOOK_UNIT_PRICE_CENTS",
                    saga_defaults.unit_price.cents(),
                )),
                currency: env::var("SEATBOOK_CURRENCY")
                    .ok()
                    .and_then(|s| Currency::new(&s).ok())
                    .unwrap_or(saga_defaults.currency),
                cas_retries: env_or("SEATBOOK_CAS_RETRIES", saga_defaults.cas_retries),
                reserve_attempts: env_or(
                    "SEATBOOK_RESERVE_ATTEMPTS",
                    saga_defaults.reserve_attempts,
                ),
                reserve_backoff: saga_defaults.reserve_backoff,
                reserve_timeout: env_millis(
                    "SEATBOOK_RESERVE_TIMEOUT_MS",
                    saga_defaults.reserve_timeout,
                ),
                payment_retries: env_or("SEATBOOK_PAYMENT_RETRIES", saga_defaults.payment_retries),
                payment_backoff: env_millis(
                    "SEATBOOK_PAYMENT_BACKOFF_MS",
                    saga_defaults.payment_backoff,
                ),
                payment_timeout: env_millis(
                    "SEATBOOK_PAYMENT_TIMEOUT_MS",
                    saga_defaults.payment_timeout,
                ),
                duplicate_wait: env_millis(
                    "SEATBOOK_DUPLICATE_WAIT_MS",
                    saga_defaults.duplicate_wait,
                ),
                idempotency_retention: Duration::from_secs(env_or(
                    "SEATBOOK_IDEMPOTENCY_RETENTION_SECS",
                    saga_defaults.idempotency_retention.as_secs(),
                )),
            },
            publisher: PublisherConfig {
                topic: env::var("SEATBOOK_TOPIC").unwrap_or(publisher_defaults.topic),
                publish_retries: env_or(
                    "SEATBOOK_PUBLISH_RETRIES",
                    publisher_defaults.publish_retries,
                ),
                publish_backoff: publisher_defaults.publish_backoff,
                dlq_capacity: env_or("SEATBOOK_DLQ_CAPACITY", publisher_defaults.dlq_capacity),
            },
            server: ServerConfig {
                log_level: env::var("RUST_LOG").unwrap_or_else(|_| "seatbook=info".to_string()),
                metrics_host: env::var("METRICS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                metrics_port: env_or("METRICS_PORT", 9090),
            },
        }
    }

    /// Metrics exporter bind address
    #[must_use]
    pub fn metrics_address(&self) -> String {
        format!("{}:{}", self.server.metrics_host, self.server.metrics_port)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map_or(default, Duration::from_millis)
}
