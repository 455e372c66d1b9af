//! Service error types with HTTP status code mapping.
//!
//! [`ShopError`] is the central error type. Each variant maps to a specific
//! HTTP status code and structured JSON error response. Payment provider
//! failures are converted from [`ProviderError`] so that handlers never deal
//! with raw upstream status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::payments::ProviderError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2010,
///     "message": "download link expired or exhausted",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`ShopError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category              | HTTP Status                      |
/// |-----------|-----------------------|----------------------------------|
/// | 1000–1999 | Client request        | 400 / 401                        |
/// | 2000–2999 | State / Not Found     | 404 / 409 / 410                  |
/// | 3000–3999 | Server                | 500 / 503                        |
/// | 4000–4999 | Payment provider      | 422 / 502                        |
#[derive(Debug, thiserror::Error)]
pub enum ShopError {
    /// Request body failed validation.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Request body is not valid JSON.
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),

    /// Caller is not allowed to perform the operation.
    #[error("unauthorized")]
    Unauthorized,

    /// Order with the given ID does not exist.
    #[error("order not found: {0}")]
    OrderNotFound(uuid::Uuid),

    /// Photo does not exist or is not published.
    #[error("photo not found: {0}")]
    PhotoNotFound(uuid::Uuid),

    /// Download token does not exist.
    #[error("download link not found")]
    TokenNotFound,

    /// The order is in a terminal state that forbids the requested change.
    #[error("order {order_id} is {from} and cannot become {to}")]
    InvalidTransition {
        /// Order that refused the transition.
        order_id: uuid::Uuid,
        /// Current status label.
        from: &'static str,
        /// Requested status label.
        to: &'static str,
    },

    /// Download token expired or has no uses left.
    #[error("download link expired or download limit reached")]
    TokenGone,

    /// Provider rejected the charge payload (4xx).
    #[error("payment provider rejected the charge: {0}")]
    ProviderRejected(String),

    /// Provider refused our credentials.
    #[error("payment provider authentication failed")]
    ProviderAuth(String),

    /// Provider unreachable or failing (network / 5xx). Retryable.
    #[error("payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A required credential or secret is not configured.
    #[error("service not configured: {0}")]
    Configuration(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ShopError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::InvalidJson(_) => 1002,
            Self::Unauthorized => 1401,
            Self::OrderNotFound(_) => 2001,
            Self::PhotoNotFound(_) => 2002,
            Self::TokenNotFound => 2003,
            Self::InvalidTransition { .. } => 2009,
            Self::TokenGone => 2010,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::Configuration(_) => 3003,
            Self::ProviderRejected(_) => 4001,
            Self::ProviderAuth(_) => 4002,
            Self::ProviderUnavailable(_) => 4003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidJson(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::OrderNotFound(_) | Self::PhotoNotFound(_) | Self::TokenNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::TokenGone => StatusCode::GONE,
            Self::ProviderRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ProviderAuth(_) | Self::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProviderError> for ShopError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Configuration(msg) | ProviderError::Unsupported(msg) => {
                Self::Configuration(msg)
            }
            ProviderError::Http { status, body } => match status {
                401 | 403 => {
                    tracing::error!(status, "payment provider refused credentials");
                    Self::ProviderAuth(format!("HTTP {status}"))
                }
                400 | 422 => Self::ProviderRejected(body),
                _ => Self::ProviderUnavailable(format!("HTTP {status}")),
            },
            ProviderError::Transport(msg) | ProviderError::Decode(msg) => {
                Self::ProviderUnavailable(msg)
            }
        }
    }
}

impl From<sqlx::Error> for ShopError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl IntoResponse for ShopError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
