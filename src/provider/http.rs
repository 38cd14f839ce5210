//! HTTP implementation of [`CheckoutProvider`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CheckoutProvider, CheckoutSession, SessionRequest};
use crate::error::GatewayError;

/// Provider client over its JSON session-creation endpoint with bearer
/// authentication.
#[derive(Debug, Clone)]
pub struct HttpCheckoutProvider {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Debug, Serialize)]
struct CreateSessionBody<'a> {
    mode: &'static str,
    amount_minor: i64,
    currency: &'a str,
    product_name: &'a str,
    expires_at: i64,
    success_url: &'a str,
    cancel_url: &'a str,
    metadata: SessionMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct SessionMetadata<'a> {
    challenge_id: uuid::Uuid,
    user_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    id: String,
    url: String,
}

impl HttpCheckoutProvider {
    /// Creates a client for the given API base URL and bearer secret.
    #[must_use]
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            secret_key: secret_key.into(),
        }
    }
}

#[async_trait]
impl CheckoutProvider for HttpCheckoutProvider {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let body = CreateSessionBody {
            mode: "payment",
            amount_minor: request.amount_minor,
            currency: &request.currency,
            product_name: &request.title,
            expires_at: request.expires_at.timestamp(),
            success_url: &request.success_url,
            cancel_url: &request.cancel_url,
            metadata: SessionMetadata {
                challenge_id: request.challenge_id,
                user_id: &request.user_id,
            },
        };

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::Provider(format!(
                "session creation returned {status}: {detail}"
            )));
        }

        let session: CreateSessionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        Ok(CheckoutSession {
            session_id: session.id,
            redirect_url: session.url,
        })
    }
}
