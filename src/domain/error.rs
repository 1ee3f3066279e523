//! Domain Error Types
//!
//! Validation and precondition failures. These never involve the engine and
//! are raised before (or instead of) any engine mutation.

use rust_decimal::Decimal;
use thiserror::Error;

use super::address::AddressError;
use super::amount::AmountError;
use super::recipient::FlowStatus;

/// Broad classes of failure surfaced to the initiating action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed input, rejected before any engine call
    Validation,
    /// Wrong state for the action, rejected after a read-only check
    Precondition,
    /// Failure reported by the settlement engine
    Engine,
    /// Storage, configuration or other local failure
    Internal,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    /// Recipient is already tracked (case-insensitive match)
    #[error("Recipient already in list: {0}")]
    DuplicateRecipient(String),

    /// A flow to the session's own account
    #[error("Cannot stream to the sending account: {0}")]
    SelfFlow(String),

    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),

    /// Action not allowed for the recipient's current status
    #[error("Cannot {action} recipient {address} while {status}")]
    InvalidStatus {
        address: String,
        status: FlowStatus,
        action: &'static str,
    },

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    /// Token contract missing on the connected chain
    #[error("Contract {name} is not deployed at {address}")]
    ContractNotDeployed { name: &'static str, address: String },

    /// The session holds no signing key for this account
    #[error("No signer available for account: {0}")]
    UnknownSigner(String),

    #[error("Nothing to unwrap for account: {0}")]
    NothingToUnwrap(String),

    #[error("Session is not connected")]
    NotConnected,

    /// Another mutating action is still in flight
    #[error("Another operation is in progress")]
    Busy,
}

impl DomainError {
    pub fn insufficient_balance(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientBalance {
            required,
            available,
        }
    }

    pub fn invalid_status(address: impl Into<String>, status: FlowStatus, action: &'static str) -> Self {
        Self::InvalidStatus {
            address: address.into(),
            status,
            action,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidAddress(_)
            | Self::InvalidAmount(_)
            | Self::DuplicateRecipient(_)
            | Self::SelfFlow(_)
            | Self::RecipientNotFound(_) => ErrorClass::Validation,
            Self::InvalidStatus { .. }
            | Self::InsufficientBalance { .. }
            | Self::ContractNotDeployed { .. }
            | Self::UnknownSigner(_)
            | Self::NothingToUnwrap(_)
            | Self::NotConnected
            | Self::Busy => ErrorClass::Precondition,
        }
    }
}
