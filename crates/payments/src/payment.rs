use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printdesk_core::{EngineError, EngineResult, Money, OrderId, PaymentId};

/// How a payment was made.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Transfer => "transfer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            "card" => Some(PaymentMethod::Card),
            "transfer" => Some(PaymentMethod::Transfer),
            _ => None,
        }
    }
}

/// One recorded payment event against an order.
///
/// Hard-deleted on reversal; the owning order is recomputed in the same
/// transaction, never left stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialPayment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub bank: Option<String>,
    pub receipt_reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

/// Registration parameters for a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub bank: Option<String>,
    pub receipt_reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: String,
}

impl NewPayment {
    pub fn validate(&self) -> EngineResult<()> {
        if self.amount <= Money::ZERO {
            return Err(EngineError::validation("amount must be positive"));
        }
        if self.recorded_by.trim().is_empty() {
            return Err(EngineError::validation("recorded_by cannot be empty"));
        }
        Ok(())
    }
}

/// The single writer of an order's `amount_paid` and `payment_status`.
///
/// Both operations insert/delete the payment row and recompute the owning
/// order from the sum of its surviving payments in one atomic unit. No
/// write path adjusts a running total incrementally.
#[async_trait]
pub trait PaymentReconciler: Send + Sync {
    /// Rejects `amount <= 0` and anything that would push `amount_paid`
    /// above the order total (`Overpayment` carries the maximum acceptable
    /// amount).
    async fn record_payment(&self, new_payment: NewPayment) -> EngineResult<PartialPayment>;

    /// Deletes the payment and recomputes the owning order atomically.
    async fn reverse_payment(&self, payment_id: PaymentId) -> EngineResult<()>;

    /// Payment history of one order, oldest first.
    async fn payments_for_order(&self, order_id: OrderId) -> EngineResult<Vec<PartialPayment>>;
}
