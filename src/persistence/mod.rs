//! Persistence layer: idempotency ledger and atomic state transitions.
//!
//! [`PledgeStore`] is the single seam between the services and durable
//! state. Every compound transition (idempotency claim + event effect,
//! challenge + transaction updates) is one atomic operation behind this
//! trait, so partial application is impossible regardless of backend.
//!
//! Two implementations: [`PostgresStore`] over `sqlx::PgPool` for
//! production, and [`MemoryStore`] (one mutex over all state) for tests and
//! ephemeral development runs.

pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::{Challenge, ChallengeStatus, NewChallenge, NewTransaction, Transaction, TransactionStatus};
use crate::error::GatewayError;
use crate::ingress::EventRecord;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// The state transition a provider event maps to. Applied atomically with
/// the idempotency-ledger claim for the event.
#[derive(Debug, Clone)]
pub enum EventEffect {
    /// Record the provider's session/intent identifiers on the challenge's
    /// `initiated` transaction. Does not mark anything paid.
    AttachSessionIdentifiers {
        /// Challenge the session belongs to.
        challenge_id: Uuid,
        /// Hosted session id.
        session_id: String,
        /// Payment intent id, when the provider already assigned one.
        payment_intent_id: Option<String>,
    },
    /// Confirm a captured payment: transaction to `paid` and challenge to
    /// `active` together, after verifying the reported amount against the
    /// stored stake. A mismatch forces the transaction to `failed` instead
    /// and leaves the challenge untouched.
    ConfirmPayment {
        /// Challenge the payment belongs to.
        challenge_id: Uuid,
        /// Payment intent id to record.
        payment_intent_id: String,
        /// Amount the provider reports as captured, in minor units.
        reported_amount_minor: i64,
        /// Effect application time, recorded as `webhook_received_at`.
        received_at: DateTime<Utc>,
    },
    /// Close a failed payment attempt, located by payment-intent id alone
    /// so a stale failure can never touch a newer attempt. The parent
    /// challenge returns to `draft` (retry allowed) only when no other
    /// non-terminal transaction exists for it.
    FailPayment {
        /// Payment intent id of the failed attempt.
        payment_intent_id: String,
        /// Effect application time.
        received_at: DateTime<Utc>,
    },
    /// Close an `initiated` transaction whose hosted session expired
    /// without completing, located by session id.
    ExpireSession {
        /// Expired session id.
        session_id: String,
        /// Effect application time.
        received_at: DateTime<Utc>,
    },
    /// Ledger row only; no state transition. Used for event types the
    /// state machine does not understand.
    RecordOnly,
}

/// Result of applying one provider event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Event claimed and its effect applied.
    Applied,
    /// Event id already present in the ledger; nothing was written.
    /// The normal outcome for redelivered events.
    Duplicate,
    /// Event claimed, but the transaction it targets does not exist (or is
    /// already closed). Recorded and acknowledged, no transition.
    TargetMissing,
    /// Event claimed, amount verification failed: the transaction was
    /// forced to `failed` and the challenge left untouched. Acknowledged so
    /// the provider stops redelivering; the anomaly is durably recorded.
    AmountMismatch {
        /// Stake recorded at checkout time, minor units.
        stored_minor: i64,
        /// Amount the provider reported, minor units.
        reported_minor: i64,
    },
}

/// Result of a user outcome declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredOutcome {
    /// Terminal challenge status after the declaration.
    pub challenge_status: ChallengeStatus,
    /// Disposition applied to the settled transaction.
    pub transaction_status: TransactionStatus,
    /// Stake minus commission, in minor units: the refund to the owner on
    /// success, or the donation to the association otherwise.
    pub payout_minor: i64,
}

/// Storage seam for all challenge, transaction, and ledger state.
///
/// Implementations must make every method atomic: concurrent calls may
/// interleave between methods but never observe a half-applied transition.
#[async_trait]
pub trait PledgeStore: Send + Sync + fmt::Debug {
    /// Inserts a new challenge in `draft` status.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Datastore`] on storage failure.
    async fn insert_challenge(&self, new: NewChallenge) -> Result<Challenge, GatewayError>;

    /// Fetches a challenge owned by `user_id`, with its most recent
    /// transaction (derived read-side join; transactions are never embedded
    /// in the challenge row).
    ///
    /// Returns `None` when the challenge does not exist or belongs to
    /// another user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Datastore`] on storage failure.
    async fn challenge_for_user(
        &self,
        challenge_id: Uuid,
        user_id: &str,
    ) -> Result<Option<(Challenge, Option<Transaction>)>, GatewayError>;

    /// Deletes a `draft` challenge owned by `user_id`, together with any
    /// closed payment attempts it accumulated. Paid challenges are never
    /// deleted.
    ///
    /// # Errors
    ///
    /// [`GatewayError::ChallengeNotFound`] when absent or owned by another
    /// user, [`GatewayError::InvalidTransition`] when not a draft,
    /// [`GatewayError::Datastore`] on storage failure.
    async fn delete_draft(&self, challenge_id: Uuid, user_id: &str) -> Result<(), GatewayError>;

    /// Records a checkout initiation attempt and returns how many attempts
    /// (including this one) the user made inside `window`. The counter
    /// lives in the datastore so the limit holds across horizontally
    /// scaled instances.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Datastore`] on storage failure.
    async fn record_checkout_attempt(
        &self,
        user_id: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<i64, GatewayError>;

    /// Atomically claims the challenge's single in-flight payment slot:
    /// refreshes an existing `initiated` transaction, or inserts a new one
    /// guarded by the non-terminal uniqueness constraint.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AlreadyPaid`] when a settled (`paid`) transaction
    /// exists or a concurrent reservation won the slot,
    /// [`GatewayError::Datastore`] on storage failure.
    async fn reserve_transaction(&self, new: NewTransaction) -> Result<Transaction, GatewayError>;

    /// Records the provider session id on a freshly reserved transaction.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidTransition`] when the transaction is no
    /// longer `initiated` (superseded meanwhile),
    /// [`GatewayError::Datastore`] on storage failure.
    async fn attach_session(
        &self,
        transaction_id: Uuid,
        session_id: &str,
    ) -> Result<(), GatewayError>;

    /// Closes a reserved transaction after the provider refused to create a
    /// session for it, releasing the in-flight slot. A no-op when the
    /// transaction already left `initiated`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Datastore`] on storage failure.
    async fn abandon_transaction(
        &self,
        transaction_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError>;

    /// Claims `record.event_id` in the idempotency ledger and applies
    /// `effect`, as one atomic unit. An already-claimed id returns
    /// [`ApplyOutcome::Duplicate`] without writing anything; concurrent
    /// deliveries of one event id resolve to exactly one application.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Datastore`] on storage failure; the caller
    /// surfaces it as retryable (5xx) to the provider, which is safe to
    /// redeliver because the claim rolled back with the effect.
    async fn claim_and_apply(
        &self,
        record: &EventRecord,
        effect: EventEffect,
    ) -> Result<ApplyOutcome, GatewayError>;

    /// Declares the challenge successfully completed: challenge to
    /// `validated`, settled transaction to `donated` when the owner donates
    /// anyway, `refunded` otherwise. The status precondition is evaluated
    /// in the same atomic operation that changes it, so concurrent
    /// declarations produce exactly one winner.
    ///
    /// # Errors
    ///
    /// [`GatewayError::ChallengeNotFound`] when absent or owned by another
    /// user, [`GatewayError::InvalidTransition`] when the challenge is not
    /// `active`, is past its end date, or has no settled payment,
    /// [`GatewayError::Datastore`] on storage failure.
    async fn declare_success(
        &self,
        challenge_id: Uuid,
        user_id: &str,
        note: Option<String>,
        donate: bool,
        now: DateTime<Utc>,
    ) -> Result<DeclaredOutcome, GatewayError>;

    /// Declares the challenge failed: challenge to `failed`, settled
    /// transaction to `donated`. Same atomicity guarantees as
    /// [`Self::declare_success`].
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`Self::declare_success`].
    async fn declare_failure(
        &self,
        challenge_id: Uuid,
        user_id: &str,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<DeclaredOutcome, GatewayError>;
}
