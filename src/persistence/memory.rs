//! In-memory implementation of [`PledgeStore`].
//!
//! One `tokio::sync::Mutex` guards the whole state, so every trait method
//! is trivially atomic and the semantics mirror the PostgreSQL
//! implementation statement for statement. Used by the test suite and by
//! `STORE_BACKEND=memory` development runs; state dies with the process.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ApplyOutcome, DeclaredOutcome, EventEffect, PledgeStore};
use crate::domain::money::{amounts_match, payout_minor};
use crate::domain::{
    Challenge, ChallengeStatus, NewChallenge, NewTransaction, PaymentType, Transaction,
    TransactionStatus,
};
use crate::error::GatewayError;
use crate::ingress::EventRecord;

#[derive(Debug, Default)]
struct Inner {
    challenges: HashMap<Uuid, Challenge>,
    transactions: HashMap<Uuid, Transaction>,
    processed_events: HashMap<String, EventRecord>,
    checkout_attempts: Vec<(String, DateTime<Utc>)>,
}

/// Mutex-guarded in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in the idempotency ledger. Test observability.
    pub async fn processed_event_count(&self) -> usize {
        self.inner.lock().await.processed_events.len()
    }

    /// All transactions recorded for a challenge, newest first. Test
    /// observability.
    pub async fn transactions_for_challenge(&self, challenge_id: Uuid) -> Vec<Transaction> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<Transaction> = inner
            .transactions
            .values()
            .filter(|t| t.challenge_id == challenge_id)
            .cloned()
            .collect();
        rows.sort_by_key(|t| std::cmp::Reverse(t.created_at));
        rows
    }
}

fn live_transaction_id(inner: &Inner, challenge_id: Uuid) -> Option<Uuid> {
    inner
        .transactions
        .values()
        .find(|t| t.challenge_id == challenge_id && !t.status.is_terminal())
        .map(|t| t.id)
}

#[async_trait]
impl PledgeStore for MemoryStore {
    async fn insert_challenge(&self, new: NewChallenge) -> Result<Challenge, GatewayError> {
        let mut inner = self.inner.lock().await;
        let challenge = Challenge {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            title: new.title,
            description: new.description,
            amount_minor: new.amount_minor,
            duration_days: new.duration_days,
            start_date: new.start_date,
            end_date: None,
            association_id: new.association_id,
            outcome_note: None,
            status: ChallengeStatus::Draft,
            created_at: Utc::now(),
        };
        inner.challenges.insert(challenge.id, challenge.clone());
        Ok(challenge)
    }

    async fn challenge_for_user(
        &self,
        challenge_id: Uuid,
        user_id: &str,
    ) -> Result<Option<(Challenge, Option<Transaction>)>, GatewayError> {
        let inner = self.inner.lock().await;
        let Some(challenge) = inner
            .challenges
            .get(&challenge_id)
            .filter(|c| c.user_id == user_id)
            .cloned()
        else {
            return Ok(None);
        };
        let transaction = inner
            .transactions
            .values()
            .filter(|t| t.challenge_id == challenge_id)
            .max_by_key(|t| t.created_at)
            .cloned();
        Ok(Some((challenge, transaction)))
    }

    async fn delete_draft(&self, challenge_id: Uuid, user_id: &str) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().await;
        let Some(challenge) = inner
            .challenges
            .get(&challenge_id)
            .filter(|c| c.user_id == user_id)
        else {
            return Err(GatewayError::ChallengeNotFound(challenge_id));
        };
        if challenge.status != ChallengeStatus::Draft {
            return Err(GatewayError::InvalidTransition(
                "only draft challenges can be deleted".to_string(),
            ));
        }
        inner.challenges.remove(&challenge_id);
        inner.transactions.retain(|_, t| t.challenge_id != challenge_id);
        Ok(())
    }

    async fn record_checkout_attempt(
        &self,
        user_id: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<i64, GatewayError> {
        let cutoff = now - window;
        let mut inner = self.inner.lock().await;
        inner.checkout_attempts.retain(|(_, at)| *at >= cutoff);
        inner.checkout_attempts.push((user_id.to_string(), now));
        let count = inner
            .checkout_attempts
            .iter()
            .filter(|(user, at)| user == user_id && *at > cutoff)
            .count();
        Ok(count as i64)
    }

    async fn reserve_transaction(&self, new: NewTransaction) -> Result<Transaction, GatewayError> {
        let mut inner = self.inner.lock().await;

        if inner
            .transactions
            .values()
            .any(|t| t.challenge_id == new.challenge_id && t.status == TransactionStatus::Paid)
        {
            return Err(GatewayError::AlreadyPaid(new.challenge_id));
        }

        let open = inner
            .transactions
            .values()
            .find(|t| {
                t.challenge_id == new.challenge_id && t.status == TransactionStatus::Initiated
            })
            .map(|t| t.id);

        if let Some(id) = open {
            let Some(transaction) = inner.transactions.get_mut(&id) else {
                return Err(GatewayError::Internal("reservation vanished".to_string()));
            };
            transaction.amount_minor = new.amount_minor;
            transaction.commission_minor = new.commission_minor;
            transaction.session_id = None;
            transaction.payment_intent_id = None;
            transaction.created_at = new.created_at;
            transaction.webhook_received_at = None;
            return Ok(transaction.clone());
        }

        let transaction = Transaction {
            id: Uuid::new_v4(),
            challenge_id: new.challenge_id,
            user_id: new.user_id,
            amount_minor: new.amount_minor,
            commission_minor: new.commission_minor,
            payment_type: PaymentType::OneTime,
            session_id: None,
            payment_intent_id: None,
            status: TransactionStatus::Initiated,
            created_at: new.created_at,
            webhook_received_at: None,
        };
        inner.transactions.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn attach_session(
        &self,
        transaction_id: Uuid,
        session_id: &str,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().await;
        match inner.transactions.get_mut(&transaction_id) {
            Some(t) if t.status == TransactionStatus::Initiated => {
                t.session_id = Some(session_id.to_string());
                Ok(())
            }
            _ => Err(GatewayError::InvalidTransition(
                "transaction is no longer awaiting a session".to_string(),
            )),
        }
    }

    async fn abandon_transaction(
        &self,
        transaction_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().await;
        if let Some(t) = inner.transactions.get_mut(&transaction_id)
            && t.status == TransactionStatus::Initiated
        {
            t.status = TransactionStatus::Failed;
            t.webhook_received_at = Some(now);
        }
        Ok(())
    }

    async fn claim_and_apply(
        &self,
        record: &EventRecord,
        effect: EventEffect,
    ) -> Result<ApplyOutcome, GatewayError> {
        let mut inner = self.inner.lock().await;

        if inner.processed_events.contains_key(&record.event_id) {
            return Ok(ApplyOutcome::Duplicate);
        }
        inner
            .processed_events
            .insert(record.event_id.clone(), record.clone());

        let outcome = match effect {
            EventEffect::AttachSessionIdentifiers {
                challenge_id,
                session_id,
                payment_intent_id,
            } => {
                let target = inner.transactions.values_mut().find(|t| {
                    t.challenge_id == challenge_id && t.status == TransactionStatus::Initiated
                });
                match target {
                    None => ApplyOutcome::TargetMissing,
                    Some(t) => {
                        t.session_id = Some(session_id);
                        if payment_intent_id.is_some() {
                            t.payment_intent_id = payment_intent_id;
                        }
                        ApplyOutcome::Applied
                    }
                }
            }

            EventEffect::ConfirmPayment {
                challenge_id,
                payment_intent_id,
                reported_amount_minor,
                received_at,
            } => match live_transaction_id(&inner, challenge_id) {
                None => ApplyOutcome::TargetMissing,
                Some(id) => {
                    let Some(t) = inner.transactions.get_mut(&id) else {
                        return Err(GatewayError::Internal("transaction vanished".to_string()));
                    };
                    let stored_minor = t.amount_minor;
                    t.payment_intent_id = Some(payment_intent_id);
                    t.webhook_received_at = Some(received_at);

                    if amounts_match(stored_minor, reported_amount_minor) {
                        t.status = TransactionStatus::Paid;
                        if let Some(c) = inner.challenges.get_mut(&challenge_id)
                            && c.status == ChallengeStatus::Draft
                        {
                            c.status = ChallengeStatus::Active;
                            c.end_date =
                                Some(c.start_date + Duration::days(i64::from(c.duration_days)));
                        }
                        ApplyOutcome::Applied
                    } else {
                        t.status = TransactionStatus::Failed;
                        ApplyOutcome::AmountMismatch {
                            stored_minor,
                            reported_minor: reported_amount_minor,
                        }
                    }
                }
            },

            EventEffect::FailPayment {
                payment_intent_id,
                received_at,
            } => {
                let target = inner
                    .transactions
                    .values_mut()
                    .find(|t| {
                        t.payment_intent_id.as_deref() == Some(payment_intent_id.as_str())
                            && !t.status.is_terminal()
                    })
                    .map(|t| {
                        t.status = TransactionStatus::Failed;
                        t.webhook_received_at = Some(received_at);
                        t.challenge_id
                    });
                match target {
                    None => ApplyOutcome::TargetMissing,
                    Some(challenge_id) => {
                        // Reopen for retry only when no other attempt is
                        // still live on the challenge.
                        if live_transaction_id(&inner, challenge_id).is_none()
                            && let Some(c) = inner.challenges.get_mut(&challenge_id)
                            && matches!(c.status, ChallengeStatus::Draft | ChallengeStatus::Active)
                        {
                            c.status = ChallengeStatus::Draft;
                        }
                        ApplyOutcome::Applied
                    }
                }
            }

            EventEffect::ExpireSession {
                session_id,
                received_at,
            } => {
                let target = inner.transactions.values_mut().find(|t| {
                    t.session_id.as_deref() == Some(session_id.as_str())
                        && t.status == TransactionStatus::Initiated
                });
                match target {
                    None => ApplyOutcome::TargetMissing,
                    Some(t) => {
                        t.status = TransactionStatus::Failed;
                        t.webhook_received_at = Some(received_at);
                        ApplyOutcome::Applied
                    }
                }
            }

            EventEffect::RecordOnly => ApplyOutcome::Applied,
        };

        Ok(outcome)
    }

    async fn declare_success(
        &self,
        challenge_id: Uuid,
        user_id: &str,
        note: Option<String>,
        donate: bool,
        now: DateTime<Utc>,
    ) -> Result<DeclaredOutcome, GatewayError> {
        let disposition = if donate {
            TransactionStatus::Donated
        } else {
            TransactionStatus::Refunded
        };
        self.declare(
            challenge_id,
            user_id,
            note,
            now,
            ChallengeStatus::Validated,
            disposition,
        )
        .await
    }

    async fn declare_failure(
        &self,
        challenge_id: Uuid,
        user_id: &str,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<DeclaredOutcome, GatewayError> {
        self.declare(
            challenge_id,
            user_id,
            note,
            now,
            ChallengeStatus::Failed,
            TransactionStatus::Donated,
        )
        .await
    }
}

impl MemoryStore {
    async fn declare(
        &self,
        challenge_id: Uuid,
        user_id: &str,
        note: Option<String>,
        now: DateTime<Utc>,
        challenge_status: ChallengeStatus,
        disposition: TransactionStatus,
    ) -> Result<DeclaredOutcome, GatewayError> {
        let mut inner = self.inner.lock().await;

        let Some(challenge) = inner
            .challenges
            .get(&challenge_id)
            .filter(|c| c.user_id == user_id)
        else {
            return Err(GatewayError::ChallengeNotFound(challenge_id));
        };

        let active_within_deadline = challenge.status == ChallengeStatus::Active
            && challenge.end_date.is_some_and(|end| end >= now);
        if !active_within_deadline {
            return Err(GatewayError::InvalidTransition(
                "challenge is not active or is past its end date".to_string(),
            ));
        }

        let settled = inner
            .transactions
            .values()
            .find(|t| {
                t.challenge_id == challenge_id && t.status == TransactionStatus::Paid
            })
            .map(|t| (t.id, t.amount_minor, t.commission_minor));
        let Some((transaction_id, amount_minor, commission_minor)) = settled else {
            return Err(GatewayError::InvalidTransition(
                "no settled payment for challenge".to_string(),
            ));
        };

        // Preconditions hold under the lock; apply both rows together.
        if let Some(c) = inner.challenges.get_mut(&challenge_id) {
            c.status = challenge_status;
            c.outcome_note = note;
        }
        if let Some(t) = inner.transactions.get_mut(&transaction_id) {
            t.status = disposition;
        }

        Ok(DeclaredOutcome {
            challenge_status,
            transaction_status: disposition,
            payout_minor: payout_minor(amount_minor, commission_minor),
        })
    }
}
