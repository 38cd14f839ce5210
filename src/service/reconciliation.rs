//! Reconciliation engine: maps verified provider events to atomic store
//! transitions.
//!
//! One state machine for every webhook delivery. Each event type carries
//! its own precondition; preconditions are written to hold under
//! redelivery and arbitrary arrival order, so the engine never assumes the
//! provider delivers exactly once or in sequence.

use std::sync::Arc;

use chrono::Utc;

use crate::error::GatewayError;
use crate::ingress::{EventRecord, ProviderEvent};
use crate::persistence::{ApplyOutcome, EventEffect, PledgeStore};

/// Applies provider events to the store, exactly once per event id.
#[derive(Debug, Clone)]
pub struct ReconciliationService {
    store: Arc<dyn PledgeStore>,
}

impl ReconciliationService {
    /// Creates a new `ReconciliationService`.
    #[must_use]
    pub fn new(store: Arc<dyn PledgeStore>) -> Self {
        Self { store }
    }

    /// Processes one verified event: claims its id in the idempotency
    /// ledger and applies the transition it maps to, atomically.
    ///
    /// Every outcome other than a datastore failure is acknowledged to the
    /// provider; duplicates, missing targets, and amount anomalies must not
    /// trigger redelivery since they are already durably resolved.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Datastore`] on storage failure; the webhook
    /// handler surfaces it as 5xx so the provider redelivers.
    pub async fn process(
        &self,
        record: EventRecord,
        event: ProviderEvent,
    ) -> Result<ApplyOutcome, GatewayError> {
        let now = Utc::now();

        let effect = match event {
            ProviderEvent::CheckoutSessionCompleted {
                session_id,
                payment_intent_id,
                challenge_id,
            } => EventEffect::AttachSessionIdentifiers {
                challenge_id,
                session_id,
                payment_intent_id,
            },
            ProviderEvent::PaymentSucceeded {
                payment_intent_id,
                challenge_id,
                amount_minor,
            } => EventEffect::ConfirmPayment {
                challenge_id,
                payment_intent_id,
                reported_amount_minor: amount_minor,
                received_at: now,
            },
            ProviderEvent::PaymentFailed { payment_intent_id } => EventEffect::FailPayment {
                payment_intent_id,
                received_at: now,
            },
            ProviderEvent::CheckoutSessionExpired { session_id } => EventEffect::ExpireSession {
                session_id,
                received_at: now,
            },
            ProviderEvent::Unknown { ref event_type } => {
                tracing::info!(
                    event_type = %event_type,
                    event_id = %record.event_id,
                    "unhandled event type"
                );
                EventEffect::RecordOnly
            }
        };

        let outcome = self.store.claim_and_apply(&record, effect).await?;

        match outcome {
            ApplyOutcome::Applied => {
                tracing::info!(
                    event_id = %record.event_id,
                    event_type = %record.event_type,
                    "event applied"
                );
            }
            ApplyOutcome::Duplicate => {
                tracing::debug!(event_id = %record.event_id, "duplicate event acknowledged");
            }
            ApplyOutcome::TargetMissing => {
                tracing::warn!(
                    event_id = %record.event_id,
                    event_type = %record.event_type,
                    "no matching transaction for event"
                );
            }
            ApplyOutcome::AmountMismatch {
                stored_minor,
                reported_minor,
            } => {
                // Security-relevant: suspected tampering or partial payment.
                tracing::warn!(
                    event_id = %record.event_id,
                    stored_minor,
                    reported_minor,
                    "reported amount disagrees with stake; transaction forced to failed"
                );
            }
        }

        Ok(outcome)
    }
}
