//! Challenge endpoint handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::auth::AuthenticatedUser;
use crate::api::dto::{ChallengeResponse, CreateChallengeRequest};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};
use crate::service::challenge_service::CreateChallenge;

/// `POST /api/v1/challenges` — Create a draft challenge.
///
/// # Errors
///
/// Returns [`GatewayError`] on validation failure or storage failure.
#[utoipa::path(
    post,
    path = "/api/v1/challenges",
    tag = "Challenges",
    summary = "Create a challenge",
    description = "Creates a challenge in draft status. Payment is initiated separately.",
    request_body = CreateChallengeRequest,
    responses(
        (status = 201, description = "Challenge created", body = ChallengeResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
    )
)]
pub async fn create_challenge(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(req): Json<CreateChallengeRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let challenge = state
        .challenges
        .create(
            &user_id,
            CreateChallenge {
                title: req.title,
                description: req.description,
                amount_minor: req.amount_minor,
                duration_days: req.duration_days,
                start_date: req.start_date,
                association_id: req.association_id,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ChallengeResponse::from_parts(challenge, None)),
    ))
}

/// `GET /api/v1/challenges/{id}` — Fetch a challenge with its latest
/// payment attempt.
///
/// # Errors
///
/// Returns [`GatewayError`] when the challenge is absent or foreign.
#[utoipa::path(
    get,
    path = "/api/v1/challenges/{id}",
    tag = "Challenges",
    summary = "Get a challenge",
    params(
        ("id" = uuid::Uuid, Path, description = "Challenge UUID"),
    ),
    responses(
        (status = 200, description = "Challenge found", body = ChallengeResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
        (status = 404, description = "Challenge not found", body = ErrorResponse),
    )
)]
pub async fn get_challenge(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    let (challenge, transaction) = state.challenges.get(&user_id, id).await?;
    Ok(Json(ChallengeResponse::from_parts(challenge, transaction)))
}

/// `DELETE /api/v1/challenges/{id}` — Delete a draft challenge.
///
/// # Errors
///
/// Returns [`GatewayError`] when the challenge is absent, foreign, or past
/// draft status.
#[utoipa::path(
    delete,
    path = "/api/v1/challenges/{id}",
    tag = "Challenges",
    summary = "Delete a draft challenge",
    description = "Only drafts can be deleted; a challenge is never deleted once paid.",
    params(
        ("id" = uuid::Uuid, Path, description = "Challenge UUID"),
    ),
    responses(
        (status = 204, description = "Draft deleted"),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
        (status = 404, description = "Challenge not found", body = ErrorResponse),
        (status = 409, description = "Challenge is past draft", body = ErrorResponse),
    )
)]
pub async fn delete_challenge(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, GatewayError> {
    state.challenges.delete_draft(&user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Challenge routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/challenges", post(create_challenge))
        .route(
            "/challenges/{id}",
            get(get_challenge).delete(delete_challenge),
        )
}
