//! Account address
//!
//! Chain account identifiers as entered by the user. The original text is
//! kept for display and persistence; comparisons ignore hex case.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of an address without its `0x` prefix (20 bytes, hex encoded)
const ADDRESS_HEX_LEN: usize = 40;

/// A chain account address (`0x` followed by 40 hex digits).
///
/// Deserialization is intentionally unchecked so that a stored recipient list
/// from an older session never fails to load because of one record. Use
/// [`Address::parse`] for anything typed in by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

/// Errors that can occur when parsing an Address
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Address is empty")]
    Empty,

    #[error("Address must start with 0x: {0}")]
    MissingPrefix(String),

    #[error("Address must have {ADDRESS_HEX_LEN} hex digits after 0x (got {0})")]
    InvalidLength(usize),

    #[error("Address contains non-hex characters: {0}")]
    NonHex(String),
}

impl Address {
    /// Parse and validate a user supplied address.
    ///
    /// Surrounding whitespace is trimmed, the remaining text is kept verbatim.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }

        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| AddressError::MissingPrefix(trimmed.to_string()))?;

        if hex_part.len() != ADDRESS_HEX_LEN {
            return Err(AddressError::InvalidLength(hex_part.len()));
        }

        if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError::NonHex(trimmed.to_string()));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// The address exactly as it was entered
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase form, used as a lookup key
    pub fn key(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Case-insensitive equality
    pub fn same_account(&self, other: &Address) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Address {}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

    #[test]
    fn test_parse_valid_address() {
        let address = Address::parse(ALICE).unwrap();
        assert_eq!(address.as_str(), ALICE);
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let address = Address::parse(&format!("  {}\n", ALICE)).unwrap();
        assert_eq!(address.as_str(), ALICE);
    }

    #[test]
    fn test_parse_rejects_missing_prefix() {
        let result = Address::parse("70997970C51812dc3A010C7d01b50e0d17dc79C8");
        assert!(matches!(result, Err(AddressError::MissingPrefix(_))));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let result = Address::parse("0x1234");
        assert_eq!(result, Err(AddressError::InvalidLength(4)));
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        let result = Address::parse("0xZZ997970C51812dc3A010C7d01b50e0d17dc79C8");
        assert!(matches!(result, Err(AddressError::NonHex(_))));
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(Address::parse("   "), Err(AddressError::Empty));
    }

    #[test]
    fn test_same_account_ignores_case() {
        let mixed = Address::parse(ALICE).unwrap();
        let lower = Address::parse(&ALICE.to_lowercase()).unwrap();

        assert!(mixed.same_account(&lower));
        assert_ne!(mixed, lower);
        assert_eq!(mixed.key(), lower.key());
    }
}
