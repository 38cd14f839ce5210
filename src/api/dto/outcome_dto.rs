//! Outcome declaration DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::persistence::DeclaredOutcome;

/// Request body for `POST /api/v1/challenges/{id}/success`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeclareSuccessRequest {
    /// Free-text accomplishment note.
    #[serde(default)]
    pub note: Option<String>,
    /// Donate the stake to the association despite succeeding.
    #[serde(default)]
    pub donate_anyway: bool,
}

/// Request body for `POST /api/v1/challenges/{id}/failure`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeclareFailureRequest {
    /// Free-text failure note.
    #[serde(default)]
    pub note: Option<String>,
}

/// Response body for both outcome declarations.
#[derive(Debug, Serialize, ToSchema)]
pub struct OutcomeResponse {
    /// Challenge the declaration applied to.
    pub challenge_id: Uuid,
    /// Terminal challenge status (`validated` or `failed`).
    pub challenge_status: String,
    /// Disposition of the settled stake (`refunded` or `donated`).
    pub transaction_status: String,
    /// Stake minus commission, in minor units, routed to the owner on
    /// refund or the association on donation.
    pub payout_minor: i64,
}

impl OutcomeResponse {
    /// Builds the response for a declaration on `challenge_id`.
    #[must_use]
    pub fn from_outcome(challenge_id: Uuid, outcome: DeclaredOutcome) -> Self {
        Self {
            challenge_id,
            challenge_status: outcome.challenge_status.as_str().to_string(),
            transaction_status: outcome.transaction_status.as_str().to_string(),
            payout_minor: outcome.payout_minor,
        }
    }
}
