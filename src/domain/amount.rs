//! Token amounts
//!
//! Two representations of the same quantity:
//! - [`Wei`]: integer minor units as the chain sees them (18 decimals)
//! - [`TokenAmount`]: a validated, positive amount in major units as typed by a user
//!
//! Conversions between them are exact; anything that cannot be represented
//! is rejected rather than rounded.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decimal places of both the underlying and the wrapped token
pub const TOKEN_DECIMALS: u32 = 18;

/// Errors that can occur when creating or converting amounts
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount has too many decimal places (max {TOKEN_DECIMALS}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds representable range")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

/// Integer amount in minor units (wei).
///
/// Signed because realtime balances can run below zero once a sender's
/// deposit is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Wei(i128);

impl Wei {
    pub const ZERO: Wei = Wei(0);

    /// Largest amount the chain accepts for approvals (unlimited allowance)
    pub const MAX: Wei = Wei(i128::MAX);

    pub const fn new(value: i128) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Convert a major-unit decimal into wei without rounding.
    ///
    /// # Errors
    /// - `AmountError::TooManyDecimals` if the value has more than 18 decimal places
    /// - `AmountError::Overflow` if the result does not fit in an i128
    pub fn from_major(value: Decimal) -> Result<Self, AmountError> {
        // trailing zeros do not count as decimal places
        let value = value.normalize();
        let scale = value.scale();
        if scale > TOKEN_DECIMALS {
            return Err(AmountError::TooManyDecimals(scale));
        }

        let factor = 10i128
            .checked_pow(TOKEN_DECIMALS - scale)
            .ok_or(AmountError::Overflow)?;

        value
            .mantissa()
            .checked_mul(factor)
            .map(Self)
            .ok_or(AmountError::Overflow)
    }

    /// Convert into major units, trailing zeros removed.
    pub fn to_major(&self) -> Result<Decimal, AmountError> {
        Decimal::try_from_i128_with_scale(self.0, TOKEN_DECIMALS)
            .map(|d| d.normalize())
            .map_err(|_| AmountError::Overflow)
    }

    pub fn checked_add(self, other: Wei) -> Option<Wei> {
        self.0.checked_add(other.0).map(Wei)
    }

    pub fn checked_sub(self, other: Wei) -> Option<Wei> {
        self.0.checked_sub(other.0).map(Wei)
    }

    /// `percent`% of this amount, truncated toward zero
    pub fn percent(&self, percent: u32) -> Option<Wei> {
        self.0
            .checked_mul(i128::from(percent))
            .map(|scaled| Wei(scaled / 100))
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Wei {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i128>()
            .map(Wei)
            .map_err(|e| AmountError::ParseError(e.to_string()))
    }
}

impl TryFrom<String> for Wei {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Wei::from_str(&value)
    }
}

impl From<Wei> for String {
    fn from(wei: Wei) -> Self {
        wei.0.to_string()
    }
}

/// A positive amount in major units, as requested for wrap/unwrap.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - At most 18 decimal places, so the wei conversion is exact
///
/// # Example
/// ```
/// use flow_dashboard::domain::TokenAmount;
///
/// let amount: TokenAmount = "1.5".parse().unwrap();
/// assert_eq!(amount.to_wei().value(), 1_500_000_000_000_000_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenAmount {
    value: Decimal,
    wei: Wei,
}

impl TokenAmount {
    /// Create a new TokenAmount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooManyDecimals` if more than 18 decimal places
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        let wei = Wei::from_major(value)?;
        Ok(Self { value, wei })
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn to_wei(&self) -> Wei {
        self.wei
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value.normalize())
    }
}

impl FromStr for TokenAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal =
            Decimal::from_str(s.trim()).map_err(|e| AmountError::ParseError(e.to_string()))?;
        TokenAmount::new(decimal)
    }
}

impl TryFrom<String> for TokenAmount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TokenAmount::from_str(&value)
    }
}

impl From<TokenAmount> for String {
    fn from(amount: TokenAmount) -> Self {
        amount.to_string()
    }
}
