//! Core domain model: challenges, transactions, and money arithmetic.
//!
//! A `Challenge` owns at most one non-terminal `Transaction` at any time.
//! The transaction's identity and status are the sole signal driving the
//! parent challenge's status during reconciliation.

pub mod challenge;
pub mod money;
pub mod transaction;

pub use challenge::{Challenge, ChallengeStatus, NewChallenge};
pub use transaction::{NewTransaction, PaymentType, Transaction, TransactionStatus};
