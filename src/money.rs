//! Fixed-point money handling
//!
//! Balances and payment amounts are carried as `i64` minor units (cents) so
//! repeated credits and debits never drift. The external representation is a
//! decimal with two places, accepted as either a JSON number or a string.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of minor units in one major unit (KES cents).
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;
const DECIMAL_PLACES: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("invalid decimal amount: {0}")]
    Invalid(String),

    #[error("amount {0} has more than two decimal places")]
    TooPrecise(String),

    #[error("amount {0} cannot be negative")]
    Negative(String),

    #[error("amount {0} is out of range")]
    Overflow(String),
}

/// A non-negative amount of money in minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_minor(minor: i64) -> Self {
        Amount(minor)
    }

    /// Whole major units, e.g. `Amount::from_major(1000)` is `1000.00`.
    pub const fn from_major(major: i64) -> Self {
        Amount(major * MINOR_UNITS_PER_MAJOR)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative(value.to_string()));
        }
        let normalized = value.normalize();
        if normalized.scale() > DECIMAL_PLACES {
            return Err(AmountError::TooPrecise(value.to_string()));
        }
        let minor = normalized
            .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))
            .and_then(|v| v.to_i64())
            .ok_or_else(|| AmountError::Overflow(value.to_string()))?;
        Ok(Amount(minor))
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, DECIMAL_PLACES)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let parsed =
            Decimal::from_str(trimmed).map_err(|_| AmountError::Invalid(trimmed.to_string()))?;
        Amount::from_decimal(parsed)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(AmountVisitor)
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal amount as a number or string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        Amount::from_str(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        let major = i64::try_from(v).map_err(|_| E::custom(AmountError::Overflow(v.to_string())))?;
        major
            .checked_mul(MINOR_UNITS_PER_MAJOR)
            .map(Amount)
            .ok_or_else(|| E::custom(AmountError::Overflow(v.to_string())))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        if v < 0 {
            return Err(E::custom(AmountError::Negative(v.to_string())));
        }
        self.visit_u64(v as u64)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
        // Display gives the shortest round-tripping form, so 1000.1 stays 1000.1
        Amount::from_str(&v.to_string()).map_err(E::custom)
    }
}
