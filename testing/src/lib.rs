//! # Seatbook Testing
//!
//! Deterministic test doubles for the seat-reservation saga.
//!
//! This crate provides:
//! - Mock implementations of the collaborator traits (clock, auth, catalog)
//! - [`ScriptedPaymentGateway`] for payment outcomes and compensation checks
//! - [`InMemoryEventBus`] with failure injection
//! - proptest strategies for booking workloads
//!
//! ## Example
//!
//! ```
//! use seatbook_testing::{InMemoryEventCatalog, test_clock};
//! use seatbook_core::environment::Clock;
//! use seatbook_core::types::EventId;
//!
//! let catalog = InMemoryEventCatalog::new();
//! let event_id = EventId::new();
//! catalog.insert(event_id, 10);
//!
//! let clock = test_clock();
//! assert_eq!(clock.now(), clock.now());
//! ```

use chrono::{DateTime, Utc};
use seatbook_core::environment::Clock;

mod bus_mocks;
mod payment_mocks;

pub use bus_mocks::InMemoryEventBus;
pub use payment_mocks::{ChargeOutcome, RecordedCharge, ScriptedPaymentGateway};

/// Mock implementations of the collaborator traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use seatbook_core::environment::{
        AuthValidator, CatalogError, EventCatalog, Principal, Role, Unauthorized,
    };
    use seatbook_core::types::{EventId, UserId};
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Clock for deterministic tests
    ///
    /// Returns the same time until explicitly advanced. Clones share the same
    /// time source.
    ///
    /// # Example
    ///
    /// ```
    /// use seatbook_testing::mocks::FixedClock;
    /// use seatbook_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let before = clock.now();
    /// clock.advance(Duration::hours(1));
    /// assert_eq!(clock.now() - before, Duration::hours(1));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Auth validator with a fixed token table
    #[derive(Debug, Clone, Default)]
    pub struct StaticAuthValidator {
        tokens: HashMap<String, Principal>,
    }

    impl StaticAuthValidator {
        /// Empty table: every token is rejected
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Accept `token` as a regular user
        #[must_use]
        pub fn with_user(mut self, token: &str, user_id: UserId) -> Self {
            self.tokens.insert(
                token.to_string(),
                Principal {
                    user_id,
                    role: Role::User,
                },
            );
            self
        }

        /// Accept `token` as an administrator
        #[must_use]
        pub fn with_admin(mut self, token: &str, user_id: UserId) -> Self {
            self.tokens.insert(
                token.to_string(),
                Principal {
                    user_id,
                    role: Role::Admin,
                },
            );
            self
        }
    }

    impl AuthValidator for StaticAuthValidator {
        fn validate(
            &self,
            token: &str,
        ) -> Pin<Box<dyn Future<Output = Result<Principal, Unauthorized>> + Send + '_>> {
            let result = self
                .tokens
                .get(token)
                .cloned()
                .ok_or_else(|| Unauthorized("invalid token".to_string()));
            Box::pin(async move { result })
        }
    }

    /// Event catalog backed by a map
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryEventCatalog {
        events: Arc<Mutex<HashMap<EventId, u32>>>,
        unavailable: Arc<AtomicBool>,
    }

    impl InMemoryEventCatalog {
        /// Empty catalog
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Add or replace an event
        pub fn insert(&self, event_id: EventId, total_seats: u32) {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(event_id, total_seats);
        }

        /// Simulate the catalog being unreachable
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }
    }

    impl EventCatalog for InMemoryEventCatalog {
        fn total_seats(
            &self,
            event_id: EventId,
        ) -> Pin<Box<dyn Future<Output = Result<u32, CatalogError>> + Send + '_>> {
            let result = if self.unavailable.load(Ordering::SeqCst) {
                Err(CatalogError::Unavailable("catalog offline".to_string()))
            } else {
                self.events
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&event_id)
                    .copied()
                    .ok_or(CatalogError::NotFound(event_id))
            };
            Box::pin(async move { result })
        }
    }
}

/// proptest strategies for booking workloads.
pub mod properties {
    use proptest::prelude::*;

    /// A small event capacity
    pub fn capacity() -> impl Strategy<Value = u32> {
        1u32..=50
    }

    /// A sequence of seat requests, each between 1 and 8 seats
    pub fn seat_requests(max_len: usize) -> impl Strategy<Value = Vec<u32>> {
        proptest::collection::vec(1u32..=8, 1..=max_len)
    }

    /// Which requests in a workload have their payment declined
    pub fn decline_mask(len: usize) -> impl Strategy<Value = Vec<bool>> {
        proptest::collection::vec(any::<bool>(), len)
    }
}

pub use mocks::{FixedClock, InMemoryEventCatalog, StaticAuthValidator, test_clock};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use seatbook_core::environment::{AuthValidator, CatalogError, EventCatalog, Role};
    use seatbook_core::types::{EventId, UserId};

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[tokio::test]
    async fn static_auth_resolves_known_tokens() {
        let user = UserId::new();
        let auth = StaticAuthValidator::new()
            .with_user("tok-user", user)
            .with_admin("tok-admin", UserId::new());

        let principal = auth.validate("tok-user").await.unwrap();
        assert_eq!(principal.user_id, user);
        assert_eq!(principal.role, Role::User);
        assert_eq!(auth.validate("tok-admin").await.unwrap().role, Role::Admin);
        assert!(auth.validate("forged").await.is_err());
    }

    #[tokio::test]
    async fn catalog_reports_missing_and_unavailable() {
        let catalog = InMemoryEventCatalog::new();
        let event_id = EventId::new();
        assert_eq!(
            catalog.total_seats(event_id).await,
            Err(CatalogError::NotFound(event_id))
        );

        catalog.insert(event_id, 10);
        assert_eq!(catalog.total_seats(event_id).await, Ok(10));

        catalog.set_unavailable(true);
        assert!(matches!(
            catalog.total_seats(event_id).await,
            Err(CatalogError::Unavailable(_))
        ));
    }
}
