//! Outbound payment provider interface.
//!
//! The gateway never talks card networks itself: it asks the provider for a
//! hosted checkout session and redirects the user there. Everything after
//! that arrives asynchronously through the webhook ingress.

pub mod http;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::GatewayError;

pub use http::HttpCheckoutProvider;

/// Request for a hosted checkout session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Challenge the payment belongs to, embedded as correlation metadata.
    pub challenge_id: Uuid,
    /// Paying user, embedded as correlation metadata.
    pub user_id: String,
    /// Product name displayed on the hosted page.
    pub title: String,
    /// Stake in currency minor units.
    pub amount_minor: i64,
    /// ISO currency code.
    pub currency: String,
    /// Provider-enforced session expiry.
    pub expires_at: DateTime<Utc>,
    /// Redirect target after a completed payment.
    pub success_url: String,
    /// Redirect target after an abandoned payment.
    pub cancel_url: String,
}

/// A hosted checkout session created by the provider.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    /// Provider-assigned session id.
    pub session_id: String,
    /// URL the user is redirected to for payment.
    pub redirect_url: String,
}

/// Hosted-checkout session creation, implemented over the provider's API
/// in production and mocked in tests.
#[async_trait]
pub trait CheckoutProvider: Send + Sync + fmt::Debug {
    /// Creates a hosted checkout session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Provider`] when the provider rejects the
    /// request or is unreachable.
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;
}
