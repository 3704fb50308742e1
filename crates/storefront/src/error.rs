//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use tidepool_checkout::CheckoutError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Checkout engine operation failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server-side failures to Sentry; validation noise stays out.
        if matches!(
            self,
            Self::Internal(_)
                | Self::Checkout(CheckoutError::Remote(_) | CheckoutError::Store(_))
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::Checkout(err) => match err {
                // User-fixable; the shopper stays on the current step.
                CheckoutError::Validation { .. }
                | CheckoutError::PaymentCallbackIncomplete { .. }
                | CheckoutError::PaymentCallbackStatus(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CheckoutError::EmptyCart | CheckoutError::NoDraft => StatusCode::BAD_REQUEST,
                CheckoutError::InconsistentDraft(_) | CheckoutError::FinalizationBlocked(_) => {
                    StatusCode::CONFLICT
                }
                CheckoutError::Remote(_) => StatusCode::BAD_GATEWAY,
                CheckoutError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Internal(_) => "Internal server error".to_string(),
            Self::Checkout(CheckoutError::Remote(_)) => "External service error".to_string(),
            Self::Checkout(CheckoutError::Store(_)) => "Internal server error".to_string(),
            Self::Checkout(err) => err.to_string(),
            _ => self.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
