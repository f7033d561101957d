//! Identifiers and value objects shared by every booking component.
//!
//! All identifiers are newtypes so that an `EventId` can never be passed where a
//! `BookingId` is expected. Parsing from external input goes through `FromStr`,
//! which rejects malformed values with [`ParseIdError`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error returned when an identifier cannot be parsed from external input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind}: {value:?}")]
pub struct ParseIdError {
    /// Which identifier failed to parse
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
}

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a bookable event
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self).map_err(|_| ParseIdError {
            kind: "event id",
            value: s.to_string(),
        })
    }
}

/// Unique identifier for a booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Creates a new random `BookingId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BookingId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BookingId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self).map_err(|_| ParseIdError {
            kind: "booking id",
            value: s.to_string(),
        })
    }
}

/// Unique identifier for a user, as resolved by the auth collaborator
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self).map_err(|_| ParseIdError {
            kind: "user id",
            value: s.to_string(),
        })
    }
}

/// Caller-supplied token that deduplicates retried booking requests.
///
/// Keys are opaque strings between 1 and 128 characters with no surrounding
/// whitespace and no control characters.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Longest accepted key
    pub const MAX_LEN: usize = 128;

    /// Validate and wrap a key.
    ///
    /// # Errors
    ///
    /// Returns [`ParseIdError`] if the key is empty, too long, padded with
    /// whitespace or contains control characters.
    pub fn new(key: impl Into<String>) -> Result<Self, ParseIdError> {
        let key = key.into();
        let valid = !key.is_empty()
            && key.len() <= Self::MAX_LEN
            && key.trim() == key
            && !key.chars().any(char::is_control);
        if valid {
            Ok(Self(key))
        } else {
            Err(ParseIdError {
                kind: "idempotency key",
                value: key,
            })
        }
    }

    /// Get the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for IdempotencyKey {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identifier assigned by the payment gateway to a successful charge
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    /// Wrap a gateway transaction id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Money amount in minor units (cents) to avoid floating-point errors
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` from whole dollars, saturating at `u64::MAX` cents
    #[must_use]
    pub const fn from_dollars(dollars: u64) -> Self {
        Self(dollars.saturating_mul(100))
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Multiply by a seat count, returning `None` on overflow
    #[must_use]
    pub const fn checked_mul(&self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// ISO-4217 style currency code (three ASCII letters, upper-cased)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    /// Validate and normalize a currency code.
    ///
    /// # Errors
    ///
    /// Returns [`ParseIdError`] unless the code is exactly three ASCII letters.
    pub fn new(code: &str) -> Result<Self, ParseIdError> {
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_uppercase()))
        } else {
            Err(ParseIdError {
                kind: "currency",
                value: code.to_string(),
            })
        }
    }

    /// US dollars
    #[must_use]
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    /// Get the code as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_rejects_malformed_input() {
        assert!(IdempotencyKey::new("").is_err());
        assert!(IdempotencyKey::new(" padded").is_err());
        assert!(IdempotencyKey::new("a".repeat(129)).is_err());
        assert!(IdempotencyKey::new("line\nbreak").is_err());
        assert_eq!(IdempotencyKey::new("k1").unwrap().as_str(), "k1");
    }

    #[test]
    fn ids_reject_non_uuid_strings() {
        let err = "E1".parse::<EventId>().unwrap_err();
        assert_eq!(err.kind, "event id");
        assert!("not-a-user".parse::<UserId>().is_err());

        let id = BookingId::new();
        assert_eq!(id.to_string().parse::<BookingId>().unwrap(), id);
    }

    #[test]
    fn money_multiplies_by_seats() {
        let price = Money::from_dollars(50);
        assert_eq!(price.checked_mul(3), Some(Money::from_cents(15_000)));
        assert_eq!(Money::from_cents(u64::MAX).checked_mul(2), None);
        assert_eq!(Money::from_cents(12_345).to_string(), "123.45");
    }

    #[test]
    fn dollar_amounts_saturate_instead_of_overflowing() {
        assert_eq!(Money::from_dollars(u64::MAX), Money::from_cents(u64::MAX));
        assert_eq!(Money::from_dollars(u64::MAX / 100).cents(), (u64::MAX / 100) * 100);
    }

    #[test]
    fn currency_is_normalized() {
        assert_eq!(Currency::new("usd").unwrap(), Currency::usd());
        assert!(Currency::new("US").is_err());
        assert!(Currency::new("U$D").is_err());
    }
}
