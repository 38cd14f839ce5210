//! Checkout DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request body for `POST /api/v1/challenges/{id}/checkout`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// Stake to charge, in currency minor units. Must match the configured
    /// bounds.
    pub amount_minor: i64,
}

/// Response body for a successfully initiated checkout.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    /// Provider-assigned hosted session id.
    pub session_id: String,
    /// URL to redirect the user to for payment.
    pub redirect_url: String,
}
