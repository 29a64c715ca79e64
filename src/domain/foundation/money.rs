//! Fixed-point money value object.
//!
//! All amounts are carried as integer minor units (cents). Parsing and
//! comparison never touch floating point, so a gateway-reported amount of
//! "200.00" and a stored amount of 20000 cents compare exactly.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from constructing or combining money amounts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Amount has invalid format: {0}")]
    InvalidFormat(String),

    #[error("Amount must not be negative")]
    Negative,

    #[error("Amount exceeds representable range")]
    Overflow,

    #[error("Amount would leave a negative balance")]
    Underflow,
}

/// A non-negative monetary amount with cent precision.
///
/// Internally an `i64` count of minor units. Arithmetic is checked:
/// overflow and would-be-negative results surface as errors instead of
/// wrapping or silently clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero amount.
    pub const ZERO: Money = Money(0);

    /// Creates an amount from a count of minor units (cents).
    pub fn from_cents(cents: i64) -> Result<Self, MoneyError> {
        if cents < 0 {
            return Err(MoneyError::Negative);
        }
        Ok(Self(cents))
    }

    /// Parses a decimal string such as `"123.45"` into cents.
    ///
    /// Accepts zero, one, or two fractional digits. More precision than
    /// a cent is rejected rather than rounded, because silently rounding
    /// a gateway-reported amount invites mismatch disputes.
    pub fn parse(s: &str) -> Result<Self, MoneyError> {
        let s = s.trim();
        if s.is_empty() || s.starts_with('-') || s.starts_with('+') {
            return Err(MoneyError::InvalidFormat(s.to_string()));
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(MoneyError::InvalidFormat(s.to_string()));
        }
        if frac.len() > 2 {
            return Err(MoneyError::InvalidFormat(s.to_string()));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) && !whole.is_empty() {
            return Err(MoneyError::InvalidFormat(s.to_string()));
        }
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(MoneyError::InvalidFormat(s.to_string()));
        }

        let whole_cents = if whole.is_empty() {
            0i64
        } else {
            whole
                .parse::<i64>()
                .map_err(|_| MoneyError::Overflow)?
                .checked_mul(100)
                .ok_or(MoneyError::Overflow)?
        };

        // "5" -> 0, "5.4" -> 40, "5.40" -> 40
        let frac_cents = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| MoneyError::Overflow)? * 10,
            _ => frac.parse::<i64>().map_err(|_| MoneyError::Overflow)?,
        };

        whole_cents
            .checked_add(frac_cents)
            .ok_or(MoneyError::Overflow)
            .and_then(Money::from_cents)
    }

    /// Returns the amount as minor units (cents).
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// True when the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    pub fn checked_add(&self, other: Money) -> Result<Money, MoneyError> {
        self.0
            .checked_add(other.0)
            .ok_or(MoneyError::Overflow)
            .map(Money)
    }

    /// Checked subtraction; a would-be-negative result is an underflow.
    pub fn checked_sub(&self, other: Money) -> Result<Money, MoneyError> {
        if other.0 > self.0 {
            return Err(MoneyError::Underflow);
        }
        Ok(Money(self.0 - other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}
