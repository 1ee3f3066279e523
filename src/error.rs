//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{AddressError, AmountError, DomainError, ErrorClass};
use crate::engine::EngineError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Validation and precondition errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Settlement engine errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    // Local failures
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl AppError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Domain(e) => e.class(),
            AppError::Engine(_) => ErrorClass::Engine,
            AppError::Store(_) | AppError::Config(_) => ErrorClass::Internal,
        }
    }
}

impl From<AddressError> for AppError {
    fn from(e: AddressError) -> Self {
        AppError::Domain(e.into())
    }
}

impl From<AmountError> for AppError {
    fn from(e: AmountError) -> Self {
        AppError::Domain(e.into())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // Domain errors - map to appropriate HTTP status
            AppError::Domain(domain_err) => match domain_err {
                DomainError::InvalidAddress(e) => {
                    (StatusCode::BAD_REQUEST, "invalid_address", Some(e.to_string()))
                }
                DomainError::InvalidAmount(e) => {
                    (StatusCode::BAD_REQUEST, "invalid_amount", Some(e.to_string()))
                }
                DomainError::DuplicateRecipient(address) => {
                    (StatusCode::CONFLICT, "duplicate_recipient", Some(address.clone()))
                }
                DomainError::SelfFlow(address) => {
                    (StatusCode::BAD_REQUEST, "self_flow", Some(address.clone()))
                }
                DomainError::RecipientNotFound(address) => {
                    (StatusCode::NOT_FOUND, "recipient_not_found", Some(address.clone()))
                }
                DomainError::InvalidStatus { .. } => (
                    StatusCode::CONFLICT,
                    "invalid_status",
                    Some(domain_err.to_string()),
                ),
                DomainError::InsufficientBalance { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "insufficient_balance",
                    Some(domain_err.to_string()),
                ),
                DomainError::ContractNotDeployed { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "contract_not_deployed",
                    Some(domain_err.to_string()),
                ),
                DomainError::UnknownSigner(address) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "unknown_signer", Some(address.clone()))
                }
                DomainError::NothingToUnwrap(address) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "nothing_to_unwrap",
                    Some(address.clone()),
                ),
                DomainError::NotConnected => (StatusCode::CONFLICT, "not_connected", None),
                DomainError::Busy => (StatusCode::CONFLICT, "busy", None),
            },

            // 502 Bad Gateway
            AppError::Engine(e) => {
                tracing::warn!("Engine error: {}", e);
                (StatusCode::BAD_GATEWAY, "engine_error", Some(e.to_string()))
            }

            // 500 Internal Server Error
            AppError::Store(e) => {
                tracing::error!("Storage error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
