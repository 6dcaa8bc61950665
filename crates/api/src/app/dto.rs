use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use printdesk_core::{EngineError, EngineResult, Length, Money};
use printdesk_orders::{CostComponent, LineItem, Order};
use printdesk_payments::{PartialPayment, PaymentMethod};
use printdesk_rolls::{Allocation, AvailabilityCheck, Roll, RollUsageEvent};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct InstallRollRequest {
    pub material_type: String,
    pub roll_number: u32,
    pub total_length: f64,
    pub notes: Option<String>,
    pub recorded_by: String,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConsumeRequest {
    pub material_type: String,
    /// Named roll for manual selection; omitted for FIFO.
    pub roll_number: Option<u32>,
    pub required_length: f64,
    pub notes: Option<String>,
    pub recorded_by: String,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub required: f64,
}

#[derive(Debug, Deserialize)]
pub struct ComponentRequest {
    pub quantity: u32,
    pub unit_cost: f64,
}

#[derive(Debug, Deserialize)]
pub struct LineItemRequest {
    pub description: String,
    pub print: Option<ComponentRequest>,
    pub pressing: Option<ComponentRequest>,
    pub badge: Option<ComponentRequest>,
    pub material_length: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub client_id: String,
    pub client_name: String,
    pub work_type: String,
    pub items: Vec<LineItemRequest>,
    #[serde(default)]
    pub mark_paid: bool,
    pub initial_payment_method: Option<String>,
    pub requested_roll: Option<u32>,
    pub notes: Option<String>,
    pub created_by: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemsRequest {
    pub items: Vec<LineItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: f64,
    pub method: String,
    pub bank: Option<String>,
    pub receipt_reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: String,
}

// -------------------------
// Request conversions
// -------------------------

fn component_from_request(
    component: Option<ComponentRequest>,
    field: &str,
) -> EngineResult<Option<CostComponent>> {
    component
        .map(|c| {
            Ok(CostComponent {
                quantity: c.quantity,
                unit_cost: Money::parse_decimal(c.unit_cost, field)?,
            })
        })
        .transpose()
}

pub fn line_item_from_request(request: LineItemRequest) -> EngineResult<LineItem> {
    Ok(LineItem {
        description: request.description,
        print: component_from_request(request.print, "print.unit_cost")?,
        pressing: component_from_request(request.pressing, "pressing.unit_cost")?,
        badge: component_from_request(request.badge, "badge.unit_cost")?,
        material_length: request
            .material_length
            .map(|l| Length::parse_decimal(l, "material_length"))
            .transpose()?,
    })
}

pub fn payment_method_from_str(raw: &str) -> EngineResult<PaymentMethod> {
    PaymentMethod::parse(raw).ok_or_else(|| {
        EngineError::validation(format!(
            "method must be one of: cash, card, transfer (got {raw})"
        ))
    })
}

// -------------------------
// Response mapping
// -------------------------

pub fn roll_to_json(roll: &Roll) -> JsonValue {
    json!({
        "material_type": roll.material_type.as_str(),
        "roll_number": roll.roll_number,
        "total_length": roll.total_length.as_decimal(),
        "available_length": roll.available_length.as_decimal(),
        "used_length": roll.used_length().as_decimal(),
        "is_active": roll.is_active,
        "notes": roll.notes,
        "installed_at": roll.installed_at,
        "last_updated_at": roll.last_updated_at,
    })
}

pub fn usage_event_to_json(event: &RollUsageEvent) -> JsonValue {
    json!({
        "event_id": event.id,
        "material_type": event.material_type.as_str(),
        "roll_number": event.roll_number,
        "amount": event.amount.as_decimal(),
        "kind": event.kind.as_str(),
        "order_id": event.order_id,
        "recorded_by": event.recorded_by,
        "notes": event.notes,
        "occurred_at": event.occurred_at,
    })
}

pub fn allocation_to_json(allocation: &Allocation) -> JsonValue {
    json!({
        "material_type": allocation.material_type.as_str(),
        "roll_number": allocation.roll_number,
        "consumed": allocation.consumed.as_decimal(),
        "remaining": allocation.remaining.as_decimal(),
    })
}

pub fn availability_to_json(check: &AvailabilityCheck) -> JsonValue {
    json!({
        "sufficient": check.sufficient,
        "available_length": check.available_length.as_decimal(),
        "shortfall": check.shortfall.as_decimal(),
    })
}

fn component_to_json(component: &Option<CostComponent>) -> JsonValue {
    match component {
        Some(c) => json!({
            "quantity": c.quantity,
            "unit_cost": c.unit_cost.as_decimal(),
        }),
        None => JsonValue::Null,
    }
}

pub fn order_to_json(order: &Order) -> JsonValue {
    let items: Vec<JsonValue> = order
        .items
        .iter()
        .map(|item| {
            json!({
                "description": item.description,
                "print": component_to_json(&item.print),
                "pressing": component_to_json(&item.pressing),
                "badge": component_to_json(&item.badge),
                "material_length": item.material_length.map(|l| l.as_decimal()),
            })
        })
        .collect();

    json!({
        "id": order.id,
        "receipt_number": order.receipt_number.as_str(),
        "client_id": order.client_id,
        "client_name": order.client_name,
        "work_type": order.work_type.as_str(),
        "items": items,
        "total": order.total.as_decimal(),
        "amount_paid": order.amount_paid.as_decimal(),
        "remaining_balance": order.remaining_balance().as_decimal(),
        "payment_status": order.payment_status.as_str(),
        "status": order.status.as_str(),
        "notes": order.notes,
        "created_by": order.created_by,
        "created_at": order.created_at,
        "updated_at": order.updated_at,
    })
}

pub fn payment_to_json(payment: &PartialPayment) -> JsonValue {
    json!({
        "id": payment.id,
        "order_id": payment.order_id,
        "amount": payment.amount.as_decimal(),
        "method": payment.method.as_str(),
        "bank": payment.bank,
        "receipt_reference": payment.receipt_reference,
        "notes": payment.notes,
        "recorded_by": payment.recorded_by,
        "recorded_at": payment.recorded_at,
    })
}
