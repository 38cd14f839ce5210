//! Challenge entity and its status state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lifecycle status of a challenge.
///
/// `draft → active → {validated | failed}`, plus terminal `expired` set by
/// the periodic sweep. A challenge becomes `active` only through a confirmed
/// payment, and reaches `validated`/`failed` only through an explicit owner
/// declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeStatus {
    /// Created, not yet paid. May be deleted by its owner.
    Draft,
    /// Stake confirmed; the challenge is running until `end_date`.
    Active,
    /// Owner declared success before the deadline.
    Validated,
    /// Owner declared failure; the stake goes to the association.
    Failed,
    /// Deadline passed without a declaration.
    Expired,
}

impl ChallengeStatus {
    /// Canonical lowercase wire/storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Validated => "validated",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    /// Parses the storage representation. Returns `None` for unknown input.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "validated" => Some(Self::Validated),
            "failed" => Some(Self::Failed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Whether a checkout session may be initiated in this status.
    ///
    /// Payable means not already backed by a confirmed payment and not
    /// validated: `draft` or `failed`.
    #[must_use]
    pub const fn is_payable(self) -> bool {
        matches!(self, Self::Draft | Self::Failed)
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A personal challenge with a committed monetary stake.
#[derive(Debug, Clone)]
pub struct Challenge {
    /// Challenge identifier.
    pub id: Uuid,
    /// Identity-provider subject of the owner.
    pub user_id: String,
    /// Short title shown on the checkout page.
    pub title: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Stake in currency minor units.
    pub amount_minor: i64,
    /// Challenge duration in days; `end_date` derives from it on activation.
    pub duration_days: i32,
    /// When the challenge starts.
    pub start_date: DateTime<Utc>,
    /// Deadline, set to `start_date + duration_days` when the payment is
    /// confirmed. `None` while the challenge is a draft.
    pub end_date: Option<DateTime<Utc>>,
    /// Beneficiary association receiving the stake on failure.
    pub association_id: Uuid,
    /// Free-text note recorded with the outcome declaration.
    pub outcome_note: Option<String>,
    /// Current lifecycle status.
    pub status: ChallengeStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a draft challenge.
#[derive(Debug, Clone)]
pub struct NewChallenge {
    /// Identity-provider subject of the owner.
    pub user_id: String,
    /// Short title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Stake in currency minor units.
    pub amount_minor: i64,
    /// Duration in days.
    pub duration_days: i32,
    /// Start date.
    pub start_date: DateTime<Utc>,
    /// Beneficiary association.
    pub association_id: Uuid,
}
