//! Provider event decoding.
//!
//! The raw webhook body is decoded exactly once, at the ingress boundary,
//! into a tagged [`ProviderEvent`]. Unknown event types land in an explicit
//! [`ProviderEvent::Unknown`] arm so new provider event types are
//! acknowledged without processing instead of failing delivery.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::GatewayError;

/// Canonical record of a received provider event, persisted verbatim in the
/// idempotency ledger for audit and replay.
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Provider-assigned event id, globally unique per account.
    pub event_id: String,
    /// Provider event type string (e.g. `"payment_intent.succeeded"`).
    pub event_type: String,
    /// When the provider created the event.
    pub occurred_at: DateTime<Utc>,
    /// Opaque payload snapshot.
    pub payload: serde_json::Value,
}

/// A decoded provider event, one variant per type the reconciliation state
/// machine understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Hosted checkout completed; carries the identifiers to record on the
    /// transaction. Not yet proof of captured funds.
    CheckoutSessionCompleted {
        /// Hosted session id.
        session_id: String,
        /// Payment intent id, if already attached by the provider.
        payment_intent_id: Option<String>,
        /// Challenge correlation id from the session metadata.
        challenge_id: Uuid,
    },
    /// Funds captured for a payment intent.
    PaymentSucceeded {
        /// Payment intent id.
        payment_intent_id: String,
        /// Challenge correlation id from the intent metadata.
        challenge_id: Uuid,
        /// Amount the provider reports as captured, in minor units.
        amount_minor: i64,
    },
    /// Payment attempt failed (declined, abandoned, charged back).
    PaymentFailed {
        /// Payment intent id. Failure handling is keyed by this id alone,
        /// never by challenge id, so a stale failure can not disturb a newer
        /// attempt on the same challenge.
        payment_intent_id: String,
    },
    /// Hosted checkout session passed its expiry without completing.
    CheckoutSessionExpired {
        /// Hosted session id.
        session_id: String,
    },
    /// Any event type the state machine does not understand. Recorded in
    /// the ledger and acknowledged, otherwise ignored.
    Unknown {
        /// Provider event type string.
        event_type: String,
    },
}

/// Raw provider envelope: `{id, type, created, data: {object}}`.
#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: i64,
    data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawSession {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
    metadata: RawMetadata,
}

#[derive(Debug, Deserialize)]
struct RawIntent {
    id: String,
    #[serde(default)]
    amount_received: i64,
    metadata: RawMetadata,
}

#[derive(Debug, Deserialize)]
struct RawIntentRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawExpiredSession {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    challenge_id: Uuid,
}

/// Decodes a verified raw webhook body into its ledger record and typed
/// event.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] when the envelope is not valid
/// JSON, or when a known event type carries a payload missing the fields
/// the state machine needs (a permanent, non-retryable condition).
pub fn decode_event(raw: &[u8]) -> Result<(EventRecord, ProviderEvent), GatewayError> {
    let envelope: RawEvent = serde_json::from_slice(raw)
        .map_err(|e| GatewayError::InvalidRequest(format!("malformed event envelope: {e}")))?;

    let occurred_at = Utc
        .timestamp_opt(envelope.created, 0)
        .single()
        .unwrap_or_else(Utc::now);

    let event = classify(&envelope.event_type, &envelope.data.object)?;

    let record = EventRecord {
        event_id: envelope.id,
        event_type: envelope.event_type,
        occurred_at,
        payload: envelope.data.object,
    };
    Ok((record, event))
}

fn classify(
    event_type: &str,
    object: &serde_json::Value,
) -> Result<ProviderEvent, GatewayError> {
    let bad_payload =
        |e: serde_json::Error| GatewayError::InvalidRequest(format!("{event_type}: {e}"));

    match event_type {
        "checkout.session.completed" => {
            let session: RawSession =
                serde_json::from_value(object.clone()).map_err(bad_payload)?;
            Ok(ProviderEvent::CheckoutSessionCompleted {
                session_id: session.id,
                payment_intent_id: session.payment_intent,
                challenge_id: session.metadata.challenge_id,
            })
        }
        "payment_intent.succeeded" => {
            let intent: RawIntent = serde_json::from_value(object.clone()).map_err(bad_payload)?;
            Ok(ProviderEvent::PaymentSucceeded {
                payment_intent_id: intent.id,
                challenge_id: intent.metadata.challenge_id,
                amount_minor: intent.amount_received,
            })
        }
        "payment_intent.payment_failed" => {
            let intent: RawIntentRef =
                serde_json::from_value(object.clone()).map_err(bad_payload)?;
            Ok(ProviderEvent::PaymentFailed {
                payment_intent_id: intent.id,
            })
        }
        "checkout.session.expired" => {
            let session: RawExpiredSession =
                serde_json::from_value(object.clone()).map_err(bad_payload)?;
            Ok(ProviderEvent::CheckoutSessionExpired {
                session_id: session.id,
            })
        }
        other => Ok(ProviderEvent::Unknown {
            event_type: other.to_string(),
        }),
    }
}
