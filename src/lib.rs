//! # pledge-gateway
//!
//! Payment reconciliation gateway for the pledge challenge platform.
//!
//! A user commits a monetary stake to a personal challenge, pays through a
//! hosted card-checkout provider, and later declares success or failure; on
//! failure (or voluntary donation) the stake is routed to a chosen charity
//! minus a platform commission. This crate is the consistency core between
//! the provider's asynchronous, at-least-once event stream and the internal
//! `Challenge`/`Transaction` state machine.
//!
//! ## Architecture
//!
//! ```text
//! Payment provider (signed events)     Clients (HTTP)
//!     │                                    │
//!     ├── Webhook handler (api/)           ├── REST handlers (api/)
//!     │                                    │
//!     ├── Ingress (ingress/)               ├── ChallengeService /
//!     │   signature + event decoding       │   CheckoutService (service/)
//!     │                                    │
//!     ├── ReconciliationService            ├── CheckoutProvider (provider/)
//!     │   (service/)                       │
//!     │                                    │
//!     └────── PledgeStore (persistence/) ──┘
//!             idempotency ledger + atomic transitions
//!             (PostgreSQL, or in-memory for tests and dev)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod ingress;
pub mod persistence;
pub mod provider;
pub mod service;
