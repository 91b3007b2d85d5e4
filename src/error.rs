//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::directory::DirectoryError;
use crate::domain::DomainError;
use crate::gateway::GatewayError;
use crate::onboarding::OnboardingError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Upstream errors (5xx)
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<OnboardingError> for AppError {
    fn from(err: OnboardingError) -> Self {
        match err {
            OnboardingError::Domain(e) => AppError::Domain(e),
            OnboardingError::UnknownUser(username) => AppError::UserNotFound(username),
            OnboardingError::Directory(e) => AppError::Directory(e),
        }
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
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // 404 Not Found
            AppError::UserNotFound(username) => {
                (StatusCode::NOT_FOUND, "user_not_found", Some(username.clone()))
            }

            // Domain errors - all caller input problems
            AppError::Domain(domain_err) => match domain_err {
                DomainError::InvalidAddress(e) => {
                    (StatusCode::BAD_REQUEST, "invalid_address", Some(e.to_string()))
                }
                DomainError::InvalidAmount(e) => {
                    (StatusCode::BAD_REQUEST, "invalid_amount", Some(e.to_string()))
                }
                DomainError::FaucetRecipient(address) => {
                    (StatusCode::BAD_REQUEST, "faucet_recipient", Some(address.clone()))
                }
                DomainError::LimitTooLarge { max, .. } => {
                    (StatusCode::BAD_REQUEST, "limit_too_large", Some(format!("max {}", max)))
                }
            },

            // 503 / 502 Ledger
            AppError::Gateway(e) if e.is_unavailable() => {
                tracing::warn!("Ledger unavailable: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "gateway_unavailable", None)
            }
            AppError::Gateway(e) => {
                tracing::error!("Ledger error: {:?}", e);
                (StatusCode::BAD_GATEWAY, "gateway_error", None)
            }

            // 500 Internal Server Error
            AppError::Directory(e) => {
                tracing::error!("Directory error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "directory_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
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
