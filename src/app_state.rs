//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::ingress::SignatureVerifier;
use crate::service::{ChallengeService, CheckoutService, ReconciliationService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Challenge lifecycle and outcome declarations.
    pub challenges: Arc<ChallengeService>,
    /// Checkout session initiation.
    pub checkout: Arc<CheckoutService>,
    /// Provider event application.
    pub reconciliation: Arc<ReconciliationService>,
    /// Webhook signature verification.
    pub verifier: Arc<SignatureVerifier>,
}
