//! PostgreSQL implementation of [`PledgeStore`] using `sqlx::PgPool`.
//!
//! Compound transitions run inside database transactions with
//! status-conditioned `UPDATE`s (compare-and-set), so racing callers see
//! exactly one winner and never a half-applied state. The idempotency claim
//! is a unique-constraint-backed `INSERT ... ON CONFLICT DO NOTHING` inside
//! the same transaction as the event's effect.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::{ApplyOutcome, DeclaredOutcome, EventEffect, PledgeStore};
use crate::config::GatewayConfig;
use crate::domain::money::amounts_match;
use crate::domain::{
    Challenge, ChallengeStatus, NewChallenge, NewTransaction, PaymentType, Transaction,
    TransactionStatus,
};
use crate::error::GatewayError;
use crate::ingress::EventRecord;

const CHALLENGE_COLS: &str = "id, user_id, title, description, amount_minor, duration_days, \
     start_date, end_date, association_id, outcome_note, status, created_at";

const TRANSACTION_COLS: &str = "id, challenge_id, user_id, amount_minor, commission_minor, \
     payment_type, session_id, payment_intent_id, status, created_at, webhook_received_at";

type ChallengeRow = (
    Uuid,
    String,
    String,
    Option<String>,
    i64,
    i32,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Uuid,
    Option<String>,
    String,
    DateTime<Utc>,
);

type TransactionRow = (
    Uuid,
    Uuid,
    String,
    i64,
    i64,
    String,
    Option<String>,
    Option<String>,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects using the pool settings from `config` and runs pending
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Datastore`] when the pool cannot be built or
    /// a migration fails.
    pub async fn connect(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(std::time::Duration::from_secs(
                config.database_connect_timeout_secs,
            ))
            .connect(&config.database_url)
            .await
            .map_err(|e| GatewayError::Datastore(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| GatewayError::Datastore(e.to_string()))?;

        Ok(Self::new(pool))
    }
}

fn map_challenge(row: ChallengeRow) -> Result<Challenge, GatewayError> {
    let (
        id,
        user_id,
        title,
        description,
        amount_minor,
        duration_days,
        start_date,
        end_date,
        association_id,
        outcome_note,
        status,
        created_at,
    ) = row;
    let status = ChallengeStatus::parse(&status)
        .ok_or_else(|| GatewayError::Datastore(format!("corrupt challenge status: {status}")))?;
    Ok(Challenge {
        id,
        user_id,
        title,
        description,
        amount_minor,
        duration_days,
        start_date,
        end_date,
        association_id,
        outcome_note,
        status,
        created_at,
    })
}

fn map_transaction(row: TransactionRow) -> Result<Transaction, GatewayError> {
    let (
        id,
        challenge_id,
        user_id,
        amount_minor,
        commission_minor,
        payment_type,
        session_id,
        payment_intent_id,
        status,
        created_at,
        webhook_received_at,
    ) = row;
    let status = TransactionStatus::parse(&status)
        .ok_or_else(|| GatewayError::Datastore(format!("corrupt transaction status: {status}")))?;
    let payment_type = PaymentType::parse(&payment_type).ok_or_else(|| {
        GatewayError::Datastore(format!("corrupt payment type: {payment_type}"))
    })?;
    Ok(Transaction {
        id,
        challenge_id,
        user_id,
        amount_minor,
        commission_minor,
        payment_type,
        session_id,
        payment_intent_id,
        status,
        created_at,
        webhook_received_at,
    })
}

fn db_err(e: sqlx::Error) -> GatewayError {
    GatewayError::Datastore(e.to_string())
}

#[async_trait]
impl PledgeStore for PostgresStore {
    async fn insert_challenge(&self, new: NewChallenge) -> Result<Challenge, GatewayError> {
        let row: ChallengeRow = sqlx::query_as(&format!(
            "INSERT INTO challenges \
                 (user_id, title, description, amount_minor, duration_days, start_date, \
                  association_id, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'draft') \
             RETURNING {CHALLENGE_COLS}"
        ))
        .bind(&new.user_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.amount_minor)
        .bind(new.duration_days)
        .bind(new.start_date)
        .bind(new.association_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        map_challenge(row)
    }

    async fn challenge_for_user(
        &self,
        challenge_id: Uuid,
        user_id: &str,
    ) -> Result<Option<(Challenge, Option<Transaction>)>, GatewayError> {
        let row: Option<ChallengeRow> = sqlx::query_as(&format!(
            "SELECT {CHALLENGE_COLS} FROM challenges WHERE id = $1 AND user_id = $2"
        ))
        .bind(challenge_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let challenge = map_challenge(row)?;

        let transaction: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {TRANSACTION_COLS} FROM transactions \
             WHERE challenge_id = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let transaction = transaction.map(map_transaction).transpose()?;
        Ok(Some((challenge, transaction)))
    }

    async fn delete_draft(&self, challenge_id: Uuid, user_id: &str) -> Result<(), GatewayError> {
        // Conditioned delete; transactions cascade via the foreign key.
        let result = sqlx::query(
            "DELETE FROM challenges WHERE id = $1 AND user_id = $2 AND status = 'draft'",
        )
        .bind(challenge_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: Option<(String,)> =
            sqlx::query_as("SELECT status FROM challenges WHERE id = $1 AND user_id = $2")
                .bind(challenge_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        match exists {
            None => Err(GatewayError::ChallengeNotFound(challenge_id)),
            Some(_) => Err(GatewayError::InvalidTransition(
                "only draft challenges can be deleted".to_string(),
            )),
        }
    }

    async fn record_checkout_attempt(
        &self,
        user_id: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<i64, GatewayError> {
        let cutoff = now - window;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Attempts older than the window never count again; prune them.
        sqlx::query("DELETE FROM checkout_attempts WHERE attempted_at < $1")
            .bind(cutoff)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        sqlx::query("INSERT INTO checkout_attempts (user_id, attempted_at) VALUES ($1, $2)")
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM checkout_attempts WHERE user_id = $1 AND attempted_at > $2",
        )
        .bind(user_id)
        .bind(cutoff)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(count)
    }

    async fn reserve_transaction(&self, new: NewTransaction) -> Result<Transaction, GatewayError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // A retried checkout reuses the open attempt instead of stacking a
        // second one; identifiers from the superseded session are cleared.
        let refreshed: Option<TransactionRow> = sqlx::query_as(&format!(
            "UPDATE transactions \
             SET amount_minor = $2, commission_minor = $3, session_id = NULL, \
                 payment_intent_id = NULL, created_at = $4, webhook_received_at = NULL \
             WHERE challenge_id = $1 AND status = 'initiated' \
             RETURNING {TRANSACTION_COLS}"
        ))
        .bind(new.challenge_id)
        .bind(new.amount_minor)
        .bind(new.commission_minor)
        .bind(new.created_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(row) = refreshed {
            tx.commit().await.map_err(db_err)?;
            return map_transaction(row);
        }

        let inserted: Result<TransactionRow, sqlx::Error> = sqlx::query_as(&format!(
            "INSERT INTO transactions \
                 (challenge_id, user_id, amount_minor, commission_minor, payment_type, \
                  status, created_at) \
             VALUES ($1, $2, $3, $4, 'one-time', 'initiated', $5) \
             RETURNING {TRANSACTION_COLS}"
        ))
        .bind(new.challenge_id)
        .bind(&new.user_id)
        .bind(new.amount_minor)
        .bind(new.commission_minor)
        .bind(new.created_at)
        .fetch_one(&mut *tx)
        .await;

        // The partial unique index on non-terminal transactions closes the
        // race between two concurrent reservations and rejects reservation
        // over a settled payment.
        let row = inserted.map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                GatewayError::AlreadyPaid(new.challenge_id)
            }
            _ => db_err(e),
        })?;

        tx.commit().await.map_err(db_err)?;
        map_transaction(row)
    }

    async fn attach_session(
        &self,
        transaction_id: Uuid,
        session_id: &str,
    ) -> Result<(), GatewayError> {
        let result = sqlx::query(
            "UPDATE transactions SET session_id = $2 WHERE id = $1 AND status = 'initiated'",
        )
        .bind(transaction_id)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            Ok(())
        } else {
            Err(GatewayError::InvalidTransition(
                "transaction is no longer awaiting a session".to_string(),
            ))
        }
    }

    async fn abandon_transaction(
        &self,
        transaction_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        sqlx::query(
            "UPDATE transactions SET status = 'failed', webhook_received_at = $2 \
             WHERE id = $1 AND status = 'initiated'",
        )
        .bind(transaction_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn claim_and_apply(
        &self,
        record: &EventRecord,
        effect: EventEffect,
    ) -> Result<ApplyOutcome, GatewayError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let claimed = sqlx::query(
            "INSERT INTO processed_events (event_id, event_type, payload, occurred_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(&record.event_id)
        .bind(&record.event_type)
        .bind(&record.payload)
        .bind(record.occurred_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected()
            == 1;

        if !claimed {
            // Nothing written; dropping the transaction rolls it back.
            return Ok(ApplyOutcome::Duplicate);
        }

        let outcome = match effect {
            EventEffect::AttachSessionIdentifiers {
                challenge_id,
                session_id,
                payment_intent_id,
            } => {
                let updated: Option<(Uuid,)> = sqlx::query_as(
                    "UPDATE transactions \
                     SET session_id = $2, \
                         payment_intent_id = COALESCE($3, payment_intent_id) \
                     WHERE challenge_id = $1 AND status = 'initiated' \
                     RETURNING id",
                )
                .bind(challenge_id)
                .bind(&session_id)
                .bind(&payment_intent_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;

                if updated.is_some() {
                    ApplyOutcome::Applied
                } else {
                    ApplyOutcome::TargetMissing
                }
            }

            EventEffect::ConfirmPayment {
                challenge_id,
                payment_intent_id,
                reported_amount_minor,
                received_at,
            } => {
                let target: Option<(Uuid, i64)> = sqlx::query_as(
                    "SELECT id, amount_minor FROM transactions \
                     WHERE challenge_id = $1 AND status IN ('initiated', 'paid') \
                     FOR UPDATE",
                )
                .bind(challenge_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;

                match target {
                    None => ApplyOutcome::TargetMissing,
                    Some((transaction_id, stored_minor))
                        if !amounts_match(stored_minor, reported_amount_minor) =>
                    {
                        sqlx::query(
                            "UPDATE transactions \
                             SET status = 'failed', payment_intent_id = $2, \
                                 webhook_received_at = $3 \
                             WHERE id = $1",
                        )
                        .bind(transaction_id)
                        .bind(&payment_intent_id)
                        .bind(received_at)
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err)?;

                        ApplyOutcome::AmountMismatch {
                            stored_minor,
                            reported_minor: reported_amount_minor,
                        }
                    }
                    Some((transaction_id, _)) => {
                        sqlx::query(
                            "UPDATE transactions \
                             SET status = 'paid', payment_intent_id = $2, \
                                 webhook_received_at = $3 \
                             WHERE id = $1",
                        )
                        .bind(transaction_id)
                        .bind(&payment_intent_id)
                        .bind(received_at)
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err)?;

                        sqlx::query(
                            "UPDATE challenges \
                             SET status = 'active', \
                                 end_date = start_date + make_interval(days => duration_days) \
                             WHERE id = $1 AND status = 'draft'",
                        )
                        .bind(challenge_id)
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err)?;

                        ApplyOutcome::Applied
                    }
                }
            }

            EventEffect::FailPayment {
                payment_intent_id,
                received_at,
            } => {
                let closed: Option<(Uuid, Uuid)> = sqlx::query_as(
                    "UPDATE transactions \
                     SET status = 'failed', webhook_received_at = $2 \
                     WHERE payment_intent_id = $1 AND status IN ('initiated', 'paid') \
                     RETURNING id, challenge_id",
                )
                .bind(&payment_intent_id)
                .bind(received_at)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;

                match closed {
                    None => ApplyOutcome::TargetMissing,
                    Some((_, challenge_id)) => {
                        // Reopen the challenge for retry, but only when no
                        // other payment attempt is still live on it.
                        sqlx::query(
                            "UPDATE challenges SET status = 'draft' \
                             WHERE id = $1 AND status IN ('draft', 'active') \
                               AND NOT EXISTS (SELECT 1 FROM transactions \
                                               WHERE challenge_id = $1 \
                                                 AND status IN ('initiated', 'paid'))",
                        )
                        .bind(challenge_id)
                        .execute(&mut *tx)
                        .await
                        .map_err(db_err)?;

                        ApplyOutcome::Applied
                    }
                }
            }

            EventEffect::ExpireSession {
                session_id,
                received_at,
            } => {
                let closed: Option<(Uuid,)> = sqlx::query_as(
                    "UPDATE transactions \
                     SET status = 'failed', webhook_received_at = $2 \
                     WHERE session_id = $1 AND status = 'initiated' \
                     RETURNING id",
                )
                .bind(&session_id)
                .bind(received_at)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;

                if closed.is_some() {
                    ApplyOutcome::Applied
                } else {
                    ApplyOutcome::TargetMissing
                }
            }

            EventEffect::RecordOnly => ApplyOutcome::Applied,
        };

        tx.commit().await.map_err(db_err)?;
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

impl PostgresStore {
    /// Shared compare-and-set declaration path for both outcomes.
    async fn declare(
        &self,
        challenge_id: Uuid,
        user_id: &str,
        note: Option<String>,
        now: DateTime<Utc>,
        challenge_status: ChallengeStatus,
        disposition: TransactionStatus,
    ) -> Result<DeclaredOutcome, GatewayError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let exists: Option<(String,)> =
            sqlx::query_as("SELECT status FROM challenges WHERE id = $1 AND user_id = $2")
                .bind(challenge_id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;

        if exists.is_none() {
            return Err(GatewayError::ChallengeNotFound(challenge_id));
        }

        // The precondition and the transition share one statement; of two
        // racing declarations exactly one matches the 'active' row.
        let won = sqlx::query(
            "UPDATE challenges SET status = $2, outcome_note = $3 \
             WHERE id = $1 AND status = 'active' AND end_date >= $4",
        )
        .bind(challenge_id)
        .bind(challenge_status.as_str())
        .bind(&note)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected()
            == 1;

        if !won {
            return Err(GatewayError::InvalidTransition(
                "challenge is not active or is past its end date".to_string(),
            ));
        }

        let settled: Option<(i64, i64)> = sqlx::query_as(
            "UPDATE transactions SET status = $2 \
             WHERE challenge_id = $1 AND status = 'paid' \
             RETURNING amount_minor, commission_minor",
        )
        .bind(challenge_id)
        .bind(disposition.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some((amount_minor, commission_minor)) = settled else {
            // Active challenge without a settled payment: corrupt or raced
            // state; abort without mutating (rollback on drop).
            return Err(GatewayError::InvalidTransition(
                "no settled payment for challenge".to_string(),
            ));
        };

        tx.commit().await.map_err(db_err)?;

        Ok(DeclaredOutcome {
            challenge_status,
            transaction_status: disposition,
            payout_minor: crate::domain::money::payout_minor(amount_minor, commission_minor),
        })
    }
}
