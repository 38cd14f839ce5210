//! Service layer: orchestration between handlers, store, and provider.
//!
//! Services are stateless coordinators. All durable state and all atomic
//! transitions live behind [`crate::persistence::PledgeStore`]; all card
//! handling lives behind [`crate::provider::CheckoutProvider`].

pub mod challenge_service;
pub mod checkout_service;
pub mod reconciliation;

pub use challenge_service::ChallengeService;
pub use checkout_service::CheckoutService;
pub use reconciliation::ReconciliationService;
