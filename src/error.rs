//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//! Retryability is encoded in the status: the payment provider retries
//! deliveries answered with 5xx, and stops on 2xx/4xx.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2101,
///     "message": "invalid transition: challenge is not active",
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
    /// Numeric error code (see code ranges on [`GatewayError`]).
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
/// | Range     | Category          | HTTP Status                  |
/// |-----------|-------------------|------------------------------|
/// | 1000–1999 | Validation        | 400 Bad Request              |
/// | 2000–2999 | State / Not Found | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server / Upstream | 500 / 502                    |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Webhook signature header missing, malformed, stale, or not matching
    /// the configured signing secret. Never retried by the provider.
    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Stake amount outside the configured bounds.
    #[error("amount {amount_minor} outside allowed range [{min_minor}, {max_minor}] (minor units)")]
    AmountOutOfRange {
        /// Requested amount in currency minor units.
        amount_minor: i64,
        /// Configured lower bound.
        min_minor: i64,
        /// Configured upper bound.
        max_minor: i64,
    },

    /// No caller identity on an authenticated route.
    #[error("missing or empty caller identity")]
    Unauthorized,

    /// Challenge absent, or not owned by the caller. The two cases are
    /// deliberately indistinguishable to the caller.
    #[error("challenge not found: {0}")]
    ChallengeNotFound(Uuid),

    /// Current status does not satisfy the precondition for the requested
    /// transition. Nothing was mutated.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A non-terminal payment attempt already exists for the challenge.
    #[error("a payment is already in flight or settled for challenge {0}")]
    AlreadyPaid(Uuid),

    /// Client exceeded the checkout rate limit.
    #[error("rate limit exceeded; retry after {retry_after_ms} ms")]
    RateLimited {
        /// Milliseconds until the client may retry.
        retry_after_ms: u64,
    },

    /// Datastore failure. Transient from the provider's viewpoint: the
    /// webhook delivery is answered 5xx so it is redelivered, which is safe
    /// under the idempotency ledger.
    #[error("datastore error: {0}")]
    Datastore(String),

    /// Outbound payment provider call failed.
    #[error("payment provider error: {0}")]
    Provider(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::AmountOutOfRange { .. } => 1002,
            Self::SignatureVerification(_) => 1003,
            Self::Unauthorized => 1100,
            Self::ChallengeNotFound(_) => 2001,
            Self::InvalidTransition(_) => 2101,
            Self::AlreadyPaid(_) => 2102,
            Self::RateLimited { .. } => 429,
            Self::Datastore(_) => 3001,
            Self::Provider(_) => 3002,
            Self::Internal(_) => 3000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::AmountOutOfRange { .. }
            | Self::SignatureVerification(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ChallengeNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition(_) | Self::AlreadyPaid(_) => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Datastore(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_failure_is_bad_request() {
        let err = GatewayError::SignatureVerification("bad digest".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn datastore_failure_is_retryable_5xx() {
        let err = GatewayError::Datastore("connection reset".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn conflict_variants_map_to_409() {
        let id = Uuid::new_v4();
        assert_eq!(
            GatewayError::AlreadyPaid(id).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            GatewayError::InvalidTransition("challenge is not active".to_string()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            GatewayError::InvalidRequest(String::new()).error_code(),
            1001
        );
        assert_eq!(GatewayError::Datastore(String::new()).error_code(), 3001);
        assert_eq!(GatewayError::RateLimited { retry_after_ms: 1 }.error_code(), 429);
    }
}
