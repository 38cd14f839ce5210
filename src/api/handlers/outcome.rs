//! Outcome declaration endpoint handlers.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use super::auth::AuthenticatedUser;
use crate::api::dto::{DeclareFailureRequest, DeclareSuccessRequest, OutcomeResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

/// `POST /api/v1/challenges/{id}/success` — Declare a challenge
/// successfully completed.
///
/// # Errors
///
/// Returns [`GatewayError`] when the challenge is absent, not active, or
/// past its deadline.
#[utoipa::path(
    post,
    path = "/api/v1/challenges/{id}/success",
    tag = "Outcomes",
    summary = "Declare success",
    description = "Moves an active challenge to validated before its deadline. The stake is \
                   refunded minus commission, or donated when donate_anyway is set.",
    params(
        ("id" = uuid::Uuid, Path, description = "Challenge UUID"),
    ),
    request_body = DeclareSuccessRequest,
    responses(
        (status = 200, description = "Outcome recorded", body = OutcomeResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
        (status = 404, description = "Challenge not found", body = ErrorResponse),
        (status = 409, description = "Challenge not active or past deadline", body = ErrorResponse),
    )
)]
pub async fn declare_success(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<DeclareSuccessRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let outcome = state
        .challenges
        .declare_success(&user_id, id, req.note, req.donate_anyway)
        .await?;
    Ok(Json(OutcomeResponse::from_outcome(id, outcome)))
}

/// `POST /api/v1/challenges/{id}/failure` — Declare a challenge failed.
///
/// # Errors
///
/// Returns [`GatewayError`] when the challenge is absent, not active, or
/// past its deadline.
#[utoipa::path(
    post,
    path = "/api/v1/challenges/{id}/failure",
    tag = "Outcomes",
    summary = "Declare failure",
    description = "Moves an active challenge to failed; the stake minus commission is routed \
                   to the chosen association.",
    params(
        ("id" = uuid::Uuid, Path, description = "Challenge UUID"),
    ),
    request_body = DeclareFailureRequest,
    responses(
        (status = 200, description = "Outcome recorded", body = OutcomeResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
        (status = 404, description = "Challenge not found", body = ErrorResponse),
        (status = 409, description = "Challenge not active or past deadline", body = ErrorResponse),
    )
)]
pub async fn declare_failure(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<DeclareFailureRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let outcome = state
        .challenges
        .declare_failure(&user_id, id, req.note)
        .await?;
    Ok(Json(OutcomeResponse::from_outcome(id, outcome)))
}

/// Outcome routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/challenges/{id}/success", post(declare_success))
        .route("/challenges/{id}/failure", post(declare_failure))
}
