//! Mock payment gateway for development.
//!
//! Approves every charge after a short simulated network delay. Real gateway
//! integrations implement [`PaymentGateway`] in their own crates.

use seatbook_core::payment::{ChargeMetadata, PaymentGateway, PaymentResult};
use seatbook_core::types::{Currency, Money, TransactionId};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Mock payment gateway (always succeeds)
#[derive(Clone, Debug)]
pub struct MockPaymentGateway {
    latency: Duration,
}

impl MockPaymentGateway {
    /// Creates a new mock payment gateway with 50ms of simulated latency
    #[must_use]
    pub const fn new() -> Self {
        Self {
            latency: Duration::from_millis(50),
        }
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared() -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new())
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn charge(
        &self,
        amount: Money,
        currency: &Currency,
        metadata: &ChargeMetadata,
    ) -> Pin<Box<dyn Future<Output = PaymentResult<TransactionId>> + Send + '_>> {
        let currency = currency.clone();
        let booking_id = metadata.booking_id;
        Box::pin(async move {
            tokio::time::sleep(self.latency).await;

            let transaction_id = TransactionId::new(format!("mock_txn_{}", uuid::Uuid::new_v4()));

            tracing::info!(
                %booking_id,
                amount = %amount,
                %currency,
                %transaction_id,
                "Mock payment processed successfully"
            );

            Ok(transaction_id)
        })
    }

    fn refund(
        &self,
        transaction_id: &TransactionId,
    ) -> Pin<Box<dyn Future<Output = PaymentResult<()>> + Send + '_>> {
        let transaction_id = transaction_id.clone();
        Box::pin(async move {
            tokio::time::sleep(self.latency).await;
            tracing::info!(%transaction_id, "Mock refund processed successfully");
            Ok(())
        })
    }
}
