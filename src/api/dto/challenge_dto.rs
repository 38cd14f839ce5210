//! Challenge DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{Challenge, Transaction};

/// Request body for `POST /api/v1/challenges`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateChallengeRequest {
    /// Short title shown on the checkout page.
    pub title: String,
    /// Optional free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Stake in currency minor units.
    pub amount_minor: i64,
    /// Duration in days; the deadline derives from it on activation.
    pub duration_days: i32,
    /// When the challenge starts.
    pub start_date: DateTime<Utc>,
    /// Beneficiary association receiving the stake on failure.
    pub association_id: Uuid,
}

/// Transaction fields exposed to the challenge owner.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionView {
    /// Transaction identifier.
    pub id: Uuid,
    /// Current status (`initiated`, `paid`, `refunded`, `donated`, `failed`).
    pub status: String,
    /// Stake in currency minor units.
    pub amount_minor: i64,
    /// Platform commission in currency minor units.
    pub commission_minor: i64,
    /// Hosted checkout session id, once assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When the closing provider event was applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_received_at: Option<DateTime<Utc>>,
}

impl From<Transaction> for TransactionView {
    fn from(transaction: Transaction) -> Self {
        Self {
            id: transaction.id,
            status: transaction.status.as_str().to_string(),
            amount_minor: transaction.amount_minor,
            commission_minor: transaction.commission_minor,
            session_id: transaction.session_id,
            created_at: transaction.created_at,
            webhook_received_at: transaction.webhook_received_at,
        }
    }
}

/// Response body for challenge reads and creation.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChallengeResponse {
    /// Challenge identifier.
    pub id: Uuid,
    /// Short title.
    pub title: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stake in currency minor units.
    pub amount_minor: i64,
    /// Duration in days.
    pub duration_days: i32,
    /// Start date.
    pub start_date: DateTime<Utc>,
    /// Deadline, present once the challenge is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Beneficiary association.
    pub association_id: Uuid,
    /// Note recorded with the outcome declaration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_note: Option<String>,
    /// Current status (`draft`, `active`, `validated`, `failed`, `expired`).
    pub status: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Most recent payment attempt, when any exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionView>,
}

impl ChallengeResponse {
    /// Builds the response from a challenge and its latest transaction.
    #[must_use]
    pub fn from_parts(challenge: Challenge, transaction: Option<Transaction>) -> Self {
        Self {
            id: challenge.id,
            title: challenge.title,
            description: challenge.description,
            amount_minor: challenge.amount_minor,
            duration_days: challenge.duration_days,
            start_date: challenge.start_date,
            end_date: challenge.end_date,
            association_id: challenge.association_id,
            outcome_note: challenge.outcome_note,
            status: challenge.status.as_str().to_string(),
            created_at: challenge.created_at,
            transaction: transaction.map(TransactionView::from),
        }
    }
}
