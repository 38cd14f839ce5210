//! Provider webhook endpoint handler.
//!
//! The only writer driven by the payment provider. Signature verification
//! runs before anything else touches state; after that the event is decoded
//! once and handed to the reconciliation engine. Both fresh and duplicate
//! deliveries are answered 200 so the provider stops redelivering; only a
//! datastore failure is answered 5xx to trigger a (safe) redelivery.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};
use crate::ingress;
use crate::ingress::signature::SIGNATURE_HEADER;
use crate::persistence::ApplyOutcome;

/// Minimal acknowledgement body returned to the provider.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    /// Always `true`; the provider only checks the status code.
    pub received: bool,
    /// Set when the event id had already been processed.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

/// `POST /webhooks/payment` — Receive a signed provider event.
///
/// # Errors
///
/// Returns [`GatewayError::SignatureVerification`] (400, not redelivered)
/// on authentication failure, [`GatewayError::InvalidRequest`] (400) on an
/// undecodable payload, and [`GatewayError::Datastore`] (500, redelivered)
/// on storage failure.
#[utoipa::path(
    post,
    path = "/webhooks/payment",
    tag = "Webhooks",
    summary = "Payment provider event delivery",
    description = "Verifies the event signature, claims the event id in the idempotency \
                   ledger, and applies the corresponding state transition. Duplicates are \
                   acknowledged without reprocessing.",
    request_body(content = String, description = "Raw signed event payload"),
    responses(
        (status = 200, description = "Event processed or duplicate", body = WebhookAck),
        (status = 400, description = "Signature or payload invalid", body = ErrorResponse),
        (status = 500, description = "Transient storage failure; safe to redeliver", body = ErrorResponse),
    )
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, GatewayError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            GatewayError::SignatureVerification("missing signature header".to_string())
        })?;

    state.verifier.verify(&body, signature, Utc::now())?;

    let (record, event) = ingress::decode_event(&body)?;
    let outcome = state.reconciliation.process(record, event).await?;

    Ok(Json(WebhookAck {
        received: true,
        duplicate: outcome == ApplyOutcome::Duplicate,
    }))
}

/// Webhook routes, mounted at root level (provider-facing, unauthenticated
/// beyond the signature).
pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/payment", post(payment_webhook))
}
