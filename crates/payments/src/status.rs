use serde::{Deserialize, Serialize};

use printdesk_core::Money;

/// Derived classification of an order's payment completeness.
///
/// Always a pure function of `(amount_paid, total)`; nothing stores this
/// independently of the amounts it is derived from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

impl PaymentStatus {
    /// The single classification rule used by every write path.
    pub fn classify(amount_paid: Money, total: Money) -> Self {
        if amount_paid == Money::ZERO {
            PaymentStatus::Pending
        } else if amount_paid < total {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Paid
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "partial" => Some(PaymentStatus::Partial),
            "paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}
