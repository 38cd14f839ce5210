//! Caller identity extraction.
//!
//! Authentication itself is delegated to the identity-aware proxy fronting
//! this service; it validates the session and injects the verified subject
//! into the `X-User-Id` header. The gateway only requires the header to be
//! present and non-empty.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::GatewayError;

/// Header carrying the verified caller subject.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller's identity-provider subject.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(
    /// Verified subject injected by the fronting proxy.
    pub String,
);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
            .map(|subject| Self(subject.to_string()))
            .ok_or(GatewayError::Unauthorized)
    }
}
