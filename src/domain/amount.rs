//! Amount type
//!
//! Domain primitives for monetary values in integer minor units (cents).
//! All values are validated at construction time, ensuring invalid values
//! cannot exist in the system.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum allowed value in minor units (1 trillion)
const MAX_MINOR_UNITS: i64 = 1_000_000_000_000;

/// Amount represents a validated transfer value in minor units.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Value never exceeds MAX_MINOR_UNITS
///
/// # Example
/// ```
/// use bank_mesh::domain::Amount;
///
/// let amount = Amount::new(500).unwrap();
/// assert_eq!(amount.minor_units(), 500);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(i64),

    #[error("Amount exceeds maximum allowed value ({MAX_MINOR_UNITS})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::Overflow` if value > 1 trillion minor units
    pub fn new(minor_units: i64) -> Result<Self, AmountError> {
        if minor_units <= 0 {
            return Err(AmountError::NotPositive(minor_units));
        }

        if minor_units > MAX_MINOR_UNITS {
            return Err(AmountError::Overflow);
        }

        Ok(Self(minor_units))
    }

    /// Get the value in minor units.
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Add two amounts, failing on overflow past the maximum.
    pub fn try_add(&self, other: &Amount) -> Result<Amount, AmountError> {
        let sum = self.0.checked_add(other.0).ok_or(AmountError::Overflow)?;
        Amount::new(sum)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let minor_units: i64 = s
            .parse()
            .map_err(|e: std::num::ParseIntError| AmountError::ParseError(e.to_string()))?;
        Amount::new(minor_units)
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

// Note: no Add/Sub operator impls because the results need validation;
// use explicit try_add / Balance::debit instead.

/// Balance represents an account balance in minor units.
/// Unlike Amount, Balance can be zero. It can never be negative:
/// no committed operation may overdraw an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Balance(i64);

impl Balance {
    /// Create a new balance (zero or positive)
    pub fn new(minor_units: i64) -> Result<Self, AmountError> {
        if minor_units < 0 {
            return Err(AmountError::NotPositive(minor_units));
        }

        if minor_units > MAX_MINOR_UNITS {
            return Err(AmountError::Overflow);
        }

        Ok(Self(minor_units))
    }

    /// Create a zero balance
    pub fn zero() -> Self {
        Self(0)
    }

    /// Get the value in minor units
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Check if balance is sufficient for a withdrawal
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.minor_units()
    }

    /// Add an amount to the balance
    pub fn credit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        let new_value = self
            .0
            .checked_add(amount.minor_units())
            .ok_or(AmountError::Overflow)?;
        Balance::new(new_value)
    }

    /// Subtract an amount from the balance.
    /// Fails with `NotPositive` when the result would go below zero.
    pub fn debit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        let new_value = self.0 - amount.minor_units();
        Balance::new(new_value)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_positive() {
        let amount = Amount::new(100);
        assert!(amount.is_ok());
        assert_eq!(amount.unwrap().minor_units(), 100);
    }

    #[test]
    fn test_amount_zero_rejected() {
        let amount = Amount::new(0);
        assert!(matches!(amount, Err(AmountError::NotPositive(0))));
    }

    #[test]
    fn test_amount_negative_rejected() {
        let amount = Amount::new(-100);
        assert!(matches!(amount, Err(AmountError::NotPositive(-100))));
    }

    #[test]
    fn test_amount_overflow() {
        let amount = Amount::new(MAX_MINOR_UNITS + 1);
        assert!(matches!(amount, Err(AmountError::Overflow)));
    }

    #[test]
    fn test_amount_max_value_ok() {
        let amount = Amount::new(MAX_MINOR_UNITS);
        assert!(amount.is_ok());
    }

    #[test]
    fn test_amount_from_str() {
        let amount: Result<Amount, _> = "12345".parse();
        assert!(amount.is_ok());
        assert_eq!(amount.unwrap().minor_units(), 12345);

        let bad: Result<Amount, _> = "12.50".parse();
        assert!(matches!(bad, Err(AmountError::ParseError(_))));
    }

    #[test]
    fn test_amount_try_add() {
        let a = Amount::new(100).unwrap();
        let b = Amount::new(50).unwrap();
        let sum = a.try_add(&b).unwrap();
        assert_eq!(sum.minor_units(), 150);
    }

    #[test]
    fn test_amount_try_add_overflow() {
        let a = Amount::new(MAX_MINOR_UNITS).unwrap();
        let b = Amount::new(1).unwrap();
        assert!(matches!(a.try_add(&b), Err(AmountError::Overflow)));
    }

    #[test]
    fn test_balance_credit_debit() {
        let balance = Balance::zero();
        let amount = Amount::new(100).unwrap();

        // Credit
        let balance = balance.credit(&amount).unwrap();
        assert_eq!(balance.minor_units(), 100);

        // Debit
        let withdraw = Amount::new(30).unwrap();
        let balance = balance.debit(&withdraw).unwrap();
        assert_eq!(balance.minor_units(), 70);
    }

    #[test]
    fn test_balance_insufficient() {
        let balance = Balance::new(50).unwrap();
        let amount = Amount::new(100).unwrap();

        assert!(!balance.is_sufficient_for(&amount));

        let result = balance.debit(&amount);
        assert!(matches!(result, Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_balance_negative_rejected() {
        assert!(matches!(Balance::new(-1), Err(AmountError::NotPositive(-1))));
    }

    #[test]
    fn test_amount_serde_roundtrip() {
        let amount = Amount::new(500).unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "500");

        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);

        let invalid: Result<Amount, _> = serde_json::from_str("-5");
        assert!(invalid.is_err());
    }
}
