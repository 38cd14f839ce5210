//! OpenAPI document assembly.

use utoipa::OpenApi;

use super::dto::{
    ChallengeResponse, CheckoutRequest, CheckoutResponse, CreateChallengeRequest,
    DeclareFailureRequest, DeclareSuccessRequest, OutcomeResponse, TransactionView,
};
use super::handlers;

/// Aggregated OpenAPI specification for every endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "pledge-gateway",
        description = "Payment reconciliation gateway for the pledge challenge platform"
    ),
    paths(
        handlers::challenge::create_challenge,
        handlers::challenge::get_challenge,
        handlers::challenge::delete_challenge,
        handlers::checkout::initiate_checkout,
        handlers::outcome::declare_success,
        handlers::outcome::declare_failure,
        handlers::webhook::payment_webhook,
        handlers::system::health_handler,
    ),
    components(schemas(
        CreateChallengeRequest,
        ChallengeResponse,
        TransactionView,
        CheckoutRequest,
        CheckoutResponse,
        DeclareSuccessRequest,
        DeclareFailureRequest,
        OutcomeResponse,
        handlers::webhook::WebhookAck,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    ))
)]
pub struct ApiDoc;

/// Returns the assembled OpenAPI document.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
