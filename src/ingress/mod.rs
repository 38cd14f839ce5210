//! Webhook ingress: authenticity verification and event decoding.
//!
//! Everything the payment provider delivers passes through here before any
//! state is touched. [`signature::SignatureVerifier`] authenticates the raw
//! body against the shared signing secret; [`event`] decodes the payload
//! exactly once into a tagged [`event::ProviderEvent`] with an explicit
//! unknown-type arm.

pub mod event;
pub mod signature;

pub use event::{EventRecord, ProviderEvent, decode_event};
pub use signature::SignatureVerifier;
