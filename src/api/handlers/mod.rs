//! REST endpoint handlers organized by resource.

pub mod auth;
pub mod challenge;
pub mod checkout;
pub mod outcome;
pub mod system;
pub mod webhook;

use axum::Router;

use crate::app_state::AppState;

/// Composes all authenticated client routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(challenge::routes())
        .merge(checkout::routes())
        .merge(outcome::routes())
}
