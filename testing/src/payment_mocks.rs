//! Scripted payment gateway.
//!
//! [`ScriptedPaymentGateway`] answers charges from a queue of outcomes and
//! records every charge and refund so tests can assert on compensation.

#![allow(clippy::missing_panics_doc)]

use seatbook_core::payment::{ChargeMetadata, PaymentError, PaymentGateway, PaymentResult};
use seatbook_core::types::{BookingId, Currency, Money, TransactionId};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// What the next charge should do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// Capture and return a fresh transaction id
    Approve,
    /// Fail with a non-retryable decline
    Decline(String),
    /// Fail with a retryable error
    Transient(String),
    /// Never answer (exercises the per-attempt timeout)
    Hang,
}

/// A charge the gateway received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCharge {
    /// Amount requested
    pub amount: Money,
    /// Currency requested
    pub currency: Currency,
    /// Booking the charge was for
    pub booking_id: BookingId,
    /// Transaction id issued, if approved
    pub transaction_id: Option<TransactionId>,
}

#[derive(Debug, Default)]
struct GatewayState {
    script: VecDeque<ChargeOutcome>,
    charges: Vec<RecordedCharge>,
    refunds: Vec<TransactionId>,
    fail_refunds: bool,
}

/// Payment gateway driven by a script of outcomes.
///
/// Once the script runs out every charge is approved.
///
/// # Example
///
/// ```
/// use seatbook_testing::{ChargeOutcome, ScriptedPaymentGateway};
///
/// let gateway = ScriptedPaymentGateway::new()
///     .then(ChargeOutcome::Transient("gateway timeout".into()))
///     .then(ChargeOutcome::Approve);
/// assert_eq!(gateway.charge_count(), 0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ScriptedPaymentGateway {
    state: Arc<Mutex<GatewayState>>,
    next_txn: Arc<AtomicU64>,
    latency: Duration,
}

impl ScriptedPaymentGateway {
    /// Gateway that approves everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway that declines every charge
    #[must_use]
    pub fn always_declining(times: usize) -> Self {
        let gateway = Self::new();
        for _ in 0..times {
            gateway.push(ChargeOutcome::Decline("card declined".to_string()));
        }
        gateway
    }

    /// Append an outcome to the script
    #[must_use]
    pub fn then(self, outcome: ChargeOutcome) -> Self {
        self.push(outcome);
        self
    }

    /// Append an outcome to the script through a shared handle
    pub fn push(&self, outcome: ChargeOutcome) {
        self.lock().script.push_back(outcome);
    }

    /// Delay every charge by `latency` before answering
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every refund fail with a retryable error
    pub fn fail_refunds(&self, fail: bool) {
        self.lock().fail_refunds = fail;
    }

    /// All charges received, in order
    #[must_use]
    pub fn charges(&self) -> Vec<RecordedCharge> {
        self.lock().charges.clone()
    }

    /// Number of charge attempts received
    #[must_use]
    pub fn charge_count(&self) -> usize {
        self.lock().charges.len()
    }

    /// All refunds issued, in order
    #[must_use]
    pub fn refunds(&self) -> Vec<TransactionId> {
        self.lock().refunds.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PaymentGateway for ScriptedPaymentGateway {
    fn charge(
        &self,
        amount: Money,
        currency: &Currency,
        metadata: &ChargeMetadata,
    ) -> Pin<Box<dyn Future<Output = PaymentResult<TransactionId>> + Send + '_>> {
        let currency = currency.clone();
        let booking_id = metadata.booking_id;
        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            let outcome = self
                .lock()
                .script
                .pop_front()
                .unwrap_or(ChargeOutcome::Approve);

            let (result, transaction_id) = match outcome {
                ChargeOutcome::Approve => {
                    let n = self.next_txn.fetch_add(1, Ordering::SeqCst) + 1;
                    let txn = TransactionId::new(format!("txn_{n}"));
                    (Ok(txn.clone()), Some(txn))
                }
                ChargeOutcome::Decline(reason) => (Err(PaymentError::declined(reason)), None),
                ChargeOutcome::Transient(reason) => (Err(PaymentError::transient(reason)), None),
                ChargeOutcome::Hang => {
                    self.lock().charges.push(RecordedCharge {
                        amount,
                        currency,
                        booking_id,
                        transaction_id: None,
                    });
                    return futures::future::pending().await;
                }
            };

            tracing::debug!(%booking_id, amount = amount.cents(), ok = result.is_ok(), "Scripted charge");
            self.lock().charges.push(RecordedCharge {
                amount,
                currency,
                booking_id,
                transaction_id,
            });
            result
        })
    }

    fn refund(
        &self,
        transaction_id: &TransactionId,
    ) -> Pin<Box<dyn Future<Output = PaymentResult<()>> + Send + '_>> {
        let transaction_id = transaction_id.clone();
        Box::pin(async move {
            let mut state = self.lock();
            if state.fail_refunds {
                return Err(PaymentError::transient("refund service unavailable"));
            }
            state.refunds.push(transaction_id);
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use seatbook_core::types::{EventId, UserId};

    fn metadata() -> ChargeMetadata {
        ChargeMetadata {
            booking_id: BookingId::new(),
            user_id: UserId::new(),
            event_id: EventId::new(),
        }
    }

    #[tokio::test]
    async fn script_is_consumed_in_order_then_approves() {
        let gateway = ScriptedPaymentGateway::new()
            .then(ChargeOutcome::Transient("timeout".into()))
            .then(ChargeOutcome::Decline("no funds".into()));
        let usd = Currency::usd();
        let meta = metadata();

        let first = gateway.charge(Money::from_dollars(50), &usd, &meta).await;
        assert!(first.unwrap_err().retryable);
        let second = gateway.charge(Money::from_dollars(50), &usd, &meta).await;
        assert!(!second.unwrap_err().retryable);
        let third = gateway.charge(Money::from_dollars(50), &usd, &meta).await;
        assert_eq!(third.unwrap().as_str(), "txn_1");

        assert_eq!(gateway.charge_count(), 3);
    }

    #[tokio::test]
    async fn refunds_are_recorded() {
        let gateway = ScriptedPaymentGateway::new();
        gateway.refund(&TransactionId::new("txn_9")).await.unwrap();
        assert_eq!(gateway.refunds(), vec![TransactionId::new("txn_9")]);

        gateway.fail_refunds(true);
        assert!(gateway.refund(&TransactionId::new("txn_10")).await.is_err());
        assert_eq!(gateway.refunds().len(), 1);
    }
}
