//! Payment transaction entity and its status state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lifecycle status of a payment transaction.
///
/// `initiated → paid → {refunded | donated}`, with `failed` reachable from
/// `initiated` or `paid` (declined payment, expired session, chargeback,
/// amount anomaly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    /// Checkout started; waiting for the provider's confirmation.
    Initiated,
    /// Stake captured and amount-verified.
    Paid,
    /// Stake returned to the owner after a successful challenge.
    Refunded,
    /// Stake routed to the beneficiary association.
    Donated,
    /// Payment attempt closed without capture, or closed defensively on an
    /// amount anomaly.
    Failed,
}

impl TransactionStatus {
    /// Canonical lowercase wire/storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
            Self::Donated => "donated",
            Self::Failed => "failed",
        }
    }

    /// Parses the storage representation. Returns `None` for unknown input.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "initiated" => Some(Self::Initiated),
            "paid" => Some(Self::Paid),
            "refunded" => Some(Self::Refunded),
            "donated" => Some(Self::Donated),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether this status closes out the payment attempt.
    ///
    /// A challenge may hold at most one transaction whose status is
    /// non-terminal (`initiated` or `paid`) at any instant.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Refunded | Self::Donated | Self::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment method class. The platform currently only supports one-shot
/// card payments through hosted checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentType {
    /// Single hosted-checkout card payment.
    OneTime,
}

impl PaymentType {
    /// Canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneTime => "one-time",
        }
    }

    /// Parses the storage representation. Returns `None` for unknown input.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "one-time" => Some(Self::OneTime),
            _ => None,
        }
    }
}

/// A payment attempt, exclusively owned by its parent challenge.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Transaction identifier.
    pub id: Uuid,
    /// Parent challenge.
    pub challenge_id: Uuid,
    /// Owner subject, denormalized from the challenge for fast lookup.
    pub user_id: String,
    /// Stake in currency minor units.
    pub amount_minor: i64,
    /// Platform commission in currency minor units.
    pub commission_minor: i64,
    /// Payment method class.
    pub payment_type: PaymentType,
    /// Hosted checkout session id assigned by the provider.
    pub session_id: Option<String>,
    /// Payment intent id assigned by the provider.
    pub payment_intent_id: Option<String>,
    /// Current status.
    pub status: TransactionStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When the confirming (or closing) provider event was applied.
    pub webhook_received_at: Option<DateTime<Utc>>,
}

/// Fields required to reserve an `initiated` transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// Parent challenge.
    pub challenge_id: Uuid,
    /// Owner subject.
    pub user_id: String,
    /// Stake in currency minor units.
    pub amount_minor: i64,
    /// Commission in currency minor units.
    pub commission_minor: i64,
    /// Reservation timestamp.
    pub created_at: DateTime<Utc>,
}
