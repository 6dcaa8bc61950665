use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printdesk_core::{ClientId, EngineError, EngineResult, Money, OrderId};
use printdesk_payments::{PaymentMethod, PaymentStatus};

use crate::line_item::LineItem;
use crate::receipt::ReceiptNumber;

/// Work-order lifecycle. Orders are soft-cancelled, never hard-deleted once
/// payments or material consumption reference them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Active,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Active => "active",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(OrderStatus::Active),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// Kind of production work (e.g. `DTF_PRINT`, `SUBLIMATION`, `EMBROIDERY`).
/// Drives material allocation through [`crate::policy::AllocationPolicies`],
/// never through hard-coded branching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkType(String);

impl WorkType {
    pub fn new(raw: impl AsRef<str>) -> EngineResult<Self> {
        let normalized = raw.as_ref().trim().to_uppercase();
        if normalized.is_empty() {
            return Err(EngineError::validation("work_type cannot be empty"));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for WorkType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A customer work order.
///
/// `amount_paid` and `payment_status` are derived financial state owned
/// exclusively by the payment reconciler; the ledger only initializes them
/// at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub receipt_number: ReceiptNumber,
    pub client_id: ClientId,
    pub client_name: String,
    pub work_type: WorkType,
    pub items: Vec<LineItem>,
    pub total: Money,
    pub amount_paid: Money,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_editable(&self) -> bool {
        matches!(self.status, OrderStatus::Active)
    }

    pub fn remaining_balance(&self) -> Money {
        self.total.saturating_sub(self.amount_paid)
    }
}

/// Order-creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub client_id: ClientId,
    pub client_name: String,
    pub work_type: WorkType,
    pub items: Vec<LineItem>,
    /// When true, one payment equal to the order total is recorded in the
    /// same operation.
    pub mark_paid: bool,
    /// Required when `mark_paid` is set.
    pub initial_payment_method: Option<PaymentMethod>,
    /// Operator-chosen roll for work types whose policy requires manual
    /// selection.
    pub requested_roll: Option<u32>,
    pub notes: Option<String>,
    pub created_by: String,
}

impl NewOrder {
    pub fn validate(&self) -> EngineResult<()> {
        if self.client_name.trim().is_empty() {
            return Err(EngineError::validation("client_name cannot be empty"));
        }
        if self.items.is_empty() {
            return Err(EngineError::validation("order needs at least one line item"));
        }
        for item in &self.items {
            item.validate()?;
        }
        if self.mark_paid && self.initial_payment_method.is_none() {
            return Err(EngineError::validation(
                "initial_payment_method is required when mark_paid is set",
            ));
        }
        if self.created_by.trim().is_empty() {
            return Err(EngineError::validation("created_by cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line_item::CostComponent;

    fn line() -> LineItem {
        LineItem {
            description: "banner".to_string(),
            print: Some(CostComponent {
                quantity: 1,
                unit_cost: Money::from_hundredths(10_000),
            }),
            pressing: None,
            badge: None,
            material_length: None,
        }
    }

    fn new_order() -> NewOrder {
        NewOrder {
            client_id: ClientId::new(),
            client_name: "Club Deportivo".to_string(),
            work_type: WorkType::new("dtf_print").unwrap(),
            items: vec![line()],
            mark_paid: false,
            initial_payment_method: None,
            requested_roll: None,
            notes: None,
            created_by: "front-desk".to_string(),
        }
    }

    #[test]
    fn work_type_is_normalized() {
        assert_eq!(WorkType::new(" dtf_print ").unwrap().as_str(), "DTF_PRINT");
        assert!(WorkType::new("").is_err());
    }

    #[test]
    fn validate_accepts_a_complete_order() {
        assert!(new_order().validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_client_and_empty_items() {
        let mut o = new_order();
        o.client_name = " ".to_string();
        assert!(o.validate().is_err());

        let mut o = new_order();
        o.items.clear();
        assert!(o.validate().is_err());
    }

    #[test]
    fn mark_paid_requires_a_method() {
        let mut o = new_order();
        o.mark_paid = true;
        assert!(o.validate().is_err());

        o.initial_payment_method = Some(PaymentMethod::Cash);
        assert!(o.validate().is_ok());
    }
}
