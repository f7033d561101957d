//! External collaborators injected into the booking core.
//!
//! All dependencies that live outside the saga (time, authentication, the event
//! catalog) are abstracted behind traits so tests can substitute deterministic
//! implementations.

use crate::types::{EventId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Role attached to an authenticated principal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Regular customer
    User,
    /// Event administrator
    Admin,
}

/// An authenticated caller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Resolved user
    pub user_id: UserId,
    /// Role used by the caller for admin-only checks
    pub role: Role,
}

/// Token validation failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unauthorized: {0}")]
pub struct Unauthorized(pub String);

/// Resolves bearer tokens to principals.
pub trait AuthValidator: Send + Sync {
    /// Validate `token`.
    ///
    /// # Errors
    ///
    /// Returns [`Unauthorized`] if the token is missing, expired or forged.
    fn validate(
        &self,
        token: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Principal, Unauthorized>> + Send + '_>>;
}

/// Errors from the event catalog
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No such event in the catalog
    #[error("Event not found: {0}")]
    NotFound(EventId),

    /// Catalog could not be reached
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read access to event capacity, consulted only when an event is registered.
pub trait EventCatalog: Send + Sync {
    /// Total seats configured for `event_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] for unknown events.
    fn total_seats(
        &self,
        event_id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<u32, CatalogError>> + Send + '_>>;
}
