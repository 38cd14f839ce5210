//! Checkout initiation endpoint handler.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use super::auth::AuthenticatedUser;
use crate::api::dto::{CheckoutRequest, CheckoutResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

/// `POST /api/v1/challenges/{id}/checkout` — Initiate a hosted checkout
/// session for a payable challenge.
///
/// # Errors
///
/// Returns [`GatewayError`] on ownership, status, bounds, rate-limit, or
/// provider failures.
#[utoipa::path(
    post,
    path = "/api/v1/challenges/{id}/checkout",
    tag = "Checkout",
    summary = "Initiate checkout",
    description = "Reserves the challenge's single in-flight payment attempt and returns \
                   the provider's hosted payment page URL.",
    params(
        ("id" = uuid::Uuid, Path, description = "Challenge UUID"),
    ),
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Session created", body = CheckoutResponse),
        (status = 400, description = "Amount out of range", body = ErrorResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
        (status = 404, description = "Challenge not found", body = ErrorResponse),
        (status = 409, description = "Not payable or already paid", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
        (status = 502, description = "Provider failure", body = ErrorResponse),
    )
)]
pub async fn initiate_checkout(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let session = state
        .checkout
        .initiate(&user_id, id, req.amount_minor)
        .await?;

    Ok(Json(CheckoutResponse {
        session_id: session.session_id,
        redirect_url: session.redirect_url,
    }))
}

/// Checkout routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/challenges/{id}/checkout", post(initiate_checkout))
}
