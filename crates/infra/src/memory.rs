//! In-memory engine for tests and dev.
//!
//! One mutex over the whole state makes every operation linearizable, the
//! same guarantee the Postgres backend gets from row locking. Validation
//! order and failure semantics match the Postgres engine.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use printdesk_core::{
    EngineError, EngineResult, Length, Money, OrderId, PaymentId, UsageEventId,
};
use printdesk_orders::{
    AllocationPolicies, LineItem, MaterialPolicy, NewOrder, Order, OrderLedger, OrderStatus,
    ReceiptNumber, ReceiptSequencer, order_total, required_material_length,
};
use printdesk_payments::{
    NewPayment, PartialPayment, PaymentReconciler, PaymentStatus,
};
use printdesk_rolls::{
    Allocation, AllocationRequest, AvailabilityCheck, InstallRoll, MaterialType, Roll,
    RollAllocator, RollStore, RollUsageEvent, UsageKind, pick_fifo,
};

#[derive(Debug, Default)]
struct EngineState {
    rolls: BTreeMap<(MaterialType, u32), Roll>,
    usage: Vec<RollUsageEvent>,
    orders: HashMap<OrderId, Order>,
    /// Insertion order doubles as payment history order.
    payments: Vec<PartialPayment>,
    receipt_counters: HashMap<String, u32>,
}

/// All five engine contracts behind a single lock.
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    policies: AllocationPolicies,
    state: Mutex<EngineState>,
}

impl InMemoryEngine {
    pub fn new(policies: AllocationPolicies) -> Self {
        Self {
            policies,
            state: Mutex::new(EngineState::default()),
        }
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, EngineState>> {
        self.state
            .lock()
            .map_err(|_| EngineError::unavailable("engine state lock poisoned"))
    }
}

fn roll_not_found(material_type: &MaterialType, roll_number: u32) -> EngineError {
    EngineError::not_found(format!("roll {roll_number} of {material_type}"))
}

fn order_not_found(order_id: OrderId) -> EngineError {
    EngineError::not_found(format!("order {order_id}"))
}

impl EngineState {
    fn push_usage(
        &mut self,
        roll: &Roll,
        kind: UsageKind,
        amount: Length,
        order_id: Option<OrderId>,
        recorded_by: &str,
        notes: Option<String>,
    ) {
        self.usage.push(RollUsageEvent {
            id: UsageEventId::new(),
            material_type: roll.material_type.clone(),
            roll_number: roll.roll_number,
            amount,
            kind,
            order_id,
            recorded_by: recorded_by.to_string(),
            notes,
            occurred_at: Utc::now(),
        });
    }

    /// Deduct from one specific roll and append the audit record. The caller
    /// has already decided which roll; shortfall here surfaces as
    /// `InsufficientStock` with that roll's remaining length.
    fn consume_from(
        &mut self,
        material_type: &MaterialType,
        roll_number: u32,
        request: &AllocationRequest,
    ) -> EngineResult<Allocation> {
        let key = (material_type.clone(), roll_number);
        let roll = self
            .rolls
            .get_mut(&key)
            .ok_or_else(|| roll_not_found(material_type, roll_number))?;
        if !roll.is_active {
            return Err(EngineError::validation(format!(
                "roll {roll_number} of {material_type} is inactive"
            )));
        }
        roll.consume(request.required_length, Utc::now())?;
        let remaining = roll.available_length;
        let roll = roll.clone();
        self.push_usage(
            &roll,
            UsageKind::Consumption,
            request.required_length,
            request.order_id,
            &request.recorded_by,
            request.notes.clone(),
        );
        Ok(Allocation {
            material_type: material_type.clone(),
            roll_number,
            consumed: request.required_length,
            remaining,
        })
    }

    /// FIFO selection + deduction.
    fn allocate_fifo(&mut self, request: &AllocationRequest) -> EngineResult<Allocation> {
        let candidates: Vec<Roll> = self
            .rolls
            .values()
            .filter(|r| r.material_type == request.material_type)
            .cloned()
            .collect();

        match pick_fifo(&candidates, request.required_length) {
            Some(roll) => {
                let number = roll.roll_number;
                let material_type = request.material_type.clone();
                self.consume_from(&material_type, number, request)
            }
            None => {
                let best_available = candidates
                    .iter()
                    .filter(|r| r.is_active)
                    .map(|r| r.available_length)
                    .max()
                    .unwrap_or(Length::ZERO);
                Err(EngineError::InsufficientStock {
                    material_type: request.material_type.as_str().to_string(),
                    required: request.required_length,
                    available: best_available,
                })
            }
        }
    }

    fn next_receipt(&mut self, date: NaiveDate) -> EngineResult<ReceiptNumber> {
        let prefix = ReceiptNumber::day_prefix(date);
        let counter = self.receipt_counters.entry(prefix).or_insert(0);
        *counter += 1;
        ReceiptNumber::compose(date, *counter)
    }

    fn paid_sum(&self, order_id: OrderId) -> EngineResult<Money> {
        let mut sum = Money::ZERO;
        for payment in self.payments.iter().filter(|p| p.order_id == order_id) {
            sum = sum.checked_add(payment.amount)?;
        }
        Ok(sum)
    }

    /// Recompute the owning order from the sum of its surviving payments.
    fn reconcile_order(&mut self, order_id: OrderId) -> EngineResult<()> {
        let paid = self.paid_sum(order_id)?;
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;
        order.amount_paid = paid;
        order.payment_status = PaymentStatus::classify(paid, order.total);
        order.updated_at = Utc::now();
        Ok(())
    }

    fn record_payment(&mut self, new_payment: NewPayment) -> EngineResult<PartialPayment> {
        new_payment.validate()?;
        let order = self
            .orders
            .get(&new_payment.order_id)
            .ok_or_else(|| order_not_found(new_payment.order_id))?;
        if order.status == OrderStatus::Cancelled {
            return Err(EngineError::validation(
                "cannot record a payment on a cancelled order",
            ));
        }

        let already_paid = self.paid_sum(new_payment.order_id)?;
        let max_acceptable = order.total.saturating_sub(already_paid);
        if new_payment.amount > max_acceptable {
            return Err(EngineError::Overpayment { max_acceptable });
        }

        let payment = PartialPayment {
            id: PaymentId::new(),
            order_id: new_payment.order_id,
            amount: new_payment.amount,
            method: new_payment.method,
            bank: new_payment.bank,
            receipt_reference: new_payment.receipt_reference,
            notes: new_payment.notes,
            recorded_by: new_payment.recorded_by,
            recorded_at: Utc::now(),
        };
        self.payments.push(payment.clone());
        self.reconcile_order(payment.order_id)?;
        Ok(payment)
    }
}

#[async_trait]
impl RollStore for InMemoryEngine {
    async fn get(&self, material_type: &MaterialType, roll_number: u32) -> EngineResult<Roll> {
        let state = self.lock()?;
        state
            .rolls
            .get(&(material_type.clone(), roll_number))
            .cloned()
            .ok_or_else(|| roll_not_found(material_type, roll_number))
    }

    async fn list_by_type(&self, material_type: &MaterialType) -> EngineResult<Vec<Roll>> {
        let state = self.lock()?;
        Ok(state
            .rolls
            .values()
            .filter(|r| &r.material_type == material_type)
            .cloned()
            .collect())
    }

    async fn install(&self, spec: InstallRoll) -> EngineResult<Roll> {
        spec.validate()?;
        let mut state = self.lock()?;
        let now = Utc::now();
        let key = (spec.material_type.clone(), spec.roll_number);
        let roll = match state.rolls.get_mut(&key) {
            Some(existing) => {
                existing.reinstall(&spec, now);
                existing.clone()
            }
            None => {
                let roll = Roll::install(&spec, now);
                state.rolls.insert(key, roll.clone());
                roll
            }
        };
        state.push_usage(
            &roll,
            UsageKind::Install,
            Length::ZERO,
            None,
            &spec.recorded_by,
            spec.notes.clone(),
        );
        Ok(roll)
    }

    async fn reset(&self, spec: InstallRoll) -> EngineResult<Roll> {
        spec.validate()?;
        let mut state = self.lock()?;
        let now = Utc::now();
        let key = (spec.material_type.clone(), spec.roll_number);
        let roll = match state.rolls.get_mut(&key) {
            Some(existing) => {
                existing.reinstall(&spec, now);
                existing.clone()
            }
            None => return Err(roll_not_found(&spec.material_type, spec.roll_number)),
        };
        state.push_usage(
            &roll,
            UsageKind::Reset,
            Length::ZERO,
            None,
            &spec.recorded_by,
            spec.notes.clone(),
        );
        Ok(roll)
    }

    async fn set_active(
        &self,
        material_type: &MaterialType,
        roll_number: u32,
        active: bool,
    ) -> EngineResult<Roll> {
        let mut state = self.lock()?;
        let roll = state
            .rolls
            .get_mut(&(material_type.clone(), roll_number))
            .ok_or_else(|| roll_not_found(material_type, roll_number))?;
        roll.is_active = active;
        roll.last_updated_at = Utc::now();
        Ok(roll.clone())
    }

    async fn usage_history(
        &self,
        material_type: &MaterialType,
        roll_number: u32,
    ) -> EngineResult<Vec<RollUsageEvent>> {
        let state = self.lock()?;
        Ok(state
            .usage
            .iter()
            .filter(|e| &e.material_type == material_type && e.roll_number == roll_number)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RollAllocator for InMemoryEngine {
    async fn allocate(&self, request: AllocationRequest) -> EngineResult<Allocation> {
        request.validate()?;
        let mut state = self.lock()?;
        state.allocate_fifo(&request)
    }

    async fn allocate_from_roll(
        &self,
        roll_number: u32,
        request: AllocationRequest,
    ) -> EngineResult<Allocation> {
        request.validate()?;
        let mut state = self.lock()?;
        let material_type = request.material_type.clone();
        state.consume_from(&material_type, roll_number, &request)
    }

    async fn check_availability(
        &self,
        material_type: &MaterialType,
        roll_number: u32,
        required_length: Length,
    ) -> EngineResult<AvailabilityCheck> {
        let state = self.lock()?;
        let roll = state
            .rolls
            .get(&(material_type.clone(), roll_number))
            .ok_or_else(|| roll_not_found(material_type, roll_number))?;
        Ok(AvailabilityCheck::for_roll(roll, required_length))
    }
}

#[async_trait]
impl ReceiptSequencer for InMemoryEngine {
    async fn next(&self, date: NaiveDate) -> EngineResult<ReceiptNumber> {
        let mut state = self.lock()?;
        state.next_receipt(date)
    }
}

#[async_trait]
impl OrderLedger for InMemoryEngine {
    async fn create_order(&self, new_order: NewOrder) -> EngineResult<Order> {
        new_order.validate()?;
        let total = order_total(&new_order.items)?;
        let required = required_material_length(&new_order.items)?;
        let policy = self.policies.for_work_type(&new_order.work_type).clone();

        let mut state = self.lock()?;
        let now = Utc::now();
        let receipt_number = state.next_receipt(now.date_naive())?;
        let order_id = OrderId::new();

        // Material first: an allocation failure must leave no order behind.
        // The receipt number is already consumed; that gap is acceptable.
        if !required.is_zero() {
            let request_for = |material_type: &MaterialType| AllocationRequest {
                material_type: material_type.clone(),
                required_length: required,
                order_id: Some(order_id),
                recorded_by: new_order.created_by.clone(),
                notes: Some(format!("order {receipt_number}")),
            };
            match &policy {
                MaterialPolicy::None => {}
                MaterialPolicy::Fifo { material_type } => {
                    state.allocate_fifo(&request_for(material_type))?;
                }
                MaterialPolicy::Operator { material_type } => {
                    let roll_number = new_order.requested_roll.ok_or_else(|| {
                        EngineError::validation(format!(
                            "work type {} requires an explicit roll selection",
                            new_order.work_type
                        ))
                    })?;
                    state.consume_from(material_type, roll_number, &request_for(material_type))?;
                }
            }
        }

        let order = Order {
            id: order_id,
            receipt_number,
            client_id: new_order.client_id,
            client_name: new_order.client_name,
            work_type: new_order.work_type,
            items: new_order.items,
            total,
            amount_paid: Money::ZERO,
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Active,
            notes: new_order.notes,
            created_by: new_order.created_by.clone(),
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(order_id, order);

        if new_order.mark_paid && total > Money::ZERO {
            let method = new_order
                .initial_payment_method
                .ok_or_else(|| EngineError::validation("initial_payment_method is required"))?;
            state.record_payment(NewPayment {
                order_id,
                amount: total,
                method,
                bank: None,
                receipt_reference: None,
                notes: None,
                recorded_by: new_order.created_by,
            })?;
        }

        state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| order_not_found(order_id))
    }

    async fn get_order(&self, order_id: OrderId) -> EngineResult<Order> {
        let state = self.lock()?;
        state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| order_not_found(order_id))
    }

    async fn list_orders(&self) -> EngineResult<Vec<Order>> {
        let state = self.lock()?;
        let mut orders: Vec<Order> = state.orders.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_items(&self, order_id: OrderId, items: Vec<LineItem>) -> EngineResult<Order> {
        if items.is_empty() {
            return Err(EngineError::validation("order needs at least one line item"));
        }
        for item in &items {
            item.validate()?;
        }
        let total = order_total(&items)?;

        let mut state = self.lock()?;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;
        if !order.is_editable() {
            return Err(EngineError::validation(format!(
                "only active orders can be edited (order is {})",
                order.status.as_str()
            )));
        }
        order.items = items;
        order.total = total;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn complete_order(&self, order_id: OrderId) -> EngineResult<Order> {
        let mut state = self.lock()?;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;
        if order.status != OrderStatus::Active {
            return Err(EngineError::validation(format!(
                "only active orders can be completed (order is {})",
                order.status.as_str()
            )));
        }
        order.status = OrderStatus::Completed;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn cancel_order(&self, order_id: OrderId) -> EngineResult<Order> {
        let mut state = self.lock()?;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;
        if order.status != OrderStatus::Active {
            return Err(EngineError::validation(format!(
                "only active orders can be cancelled (order is {})",
                order.status.as_str()
            )));
        }
        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }
}

#[async_trait]
impl PaymentReconciler for InMemoryEngine {
    async fn record_payment(&self, new_payment: NewPayment) -> EngineResult<PartialPayment> {
        let mut state = self.lock()?;
        state.record_payment(new_payment)
    }

    async fn reverse_payment(&self, payment_id: PaymentId) -> EngineResult<()> {
        let mut state = self.lock()?;
        let index = state
            .payments
            .iter()
            .position(|p| p.id == payment_id)
            .ok_or_else(|| EngineError::not_found(format!("payment {payment_id}")))?;
        let order_id = state.payments[index].order_id;
        state.payments.remove(index);
        state.reconcile_order(order_id)
    }

    async fn payments_for_order(&self, order_id: OrderId) -> EngineResult<Vec<PartialPayment>> {
        let state = self.lock()?;
        if !state.orders.contains_key(&order_id) {
            return Err(order_not_found(order_id));
        }
        Ok(state
            .payments
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect())
    }
}
