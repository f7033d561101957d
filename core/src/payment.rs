//! Abstract payment capability.
//!
//! Abstraction over payment processors. The saga only needs a charge and a
//! refund; everything else about the gateway lives behind this trait.

use crate::types::{BookingId, Currency, EventId, Money, TransactionId, UserId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Payment gateway result
pub type PaymentResult<T> = Result<T, PaymentError>;

/// A failed charge or refund.
///
/// `retryable` distinguishes transient gateway trouble (timeouts, 5xx) from a
/// definitive decline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct PaymentError {
    /// Whether the same request may succeed if retried
    pub retryable: bool,
    /// Gateway-provided reason
    pub reason: String,
}

impl PaymentError {
    /// A definitive failure (card declined, insufficient funds)
    #[must_use]
    pub fn declined(reason: impl Into<String>) -> Self {
        Self {
            retryable: false,
            reason: reason.into(),
        }
    }

    /// A transient failure worth retrying
    #[must_use]
    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            retryable: true,
            reason: reason.into(),
        }
    }
}

/// Context attached to a charge so the gateway can reconcile it.
///
/// `booking_id` doubles as the gateway-side idempotency reference: retrying a
/// charge for the same booking must not capture twice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeMetadata {
    /// Booking being paid for
    pub booking_id: BookingId,
    /// Paying user
    pub user_id: UserId,
    /// Booked event
    pub event_id: EventId,
}

/// Payment gateway trait
pub trait PaymentGateway: Send + Sync {
    /// Charge `amount` in `currency`.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError`] with `retryable` set according to whether the
    /// gateway expects a retry to succeed.
    fn charge(
        &self,
        amount: Money,
        currency: &Currency,
        metadata: &ChargeMetadata,
    ) -> Pin<Box<dyn Future<Output = PaymentResult<TransactionId>> + Send + '_>>;

    /// Refund a previously captured charge in full.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError`] if the refund could not be issued.
    fn refund(
        &self,
        transaction_id: &TransactionId,
    ) -> Pin<Box<dyn Future<Output = PaymentResult<()>> + Send + '_>>;
}
