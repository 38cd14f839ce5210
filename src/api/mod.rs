//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Client endpoints are mounted under `/api/v1`; the provider-facing
//! webhook endpoint and health check live at the root level.

pub mod docs;
pub mod dto;
pub mod handlers;

use axum::Router;

use crate::app_state::AppState;

/// Builds the complete API router with all endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
        .merge(handlers::webhook::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/docs")
            .url("/api-docs/openapi.json", docs::openapi()),
    );

    router
}
