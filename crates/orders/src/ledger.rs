use async_trait::async_trait;

use printdesk_core::{EngineResult, OrderId};

use crate::line_item::LineItem;
use crate::order::{NewOrder, Order};

/// Order creation and editing, all-or-nothing.
///
/// Creation computes the total from line items, obtains a receipt number,
/// persists the order and items, deducts material per the work type's
/// policy, and (when requested) records the initial payment; any failure
/// rolls the whole operation back. A receipt number consumed by a failed
/// creation is abandoned; gaps are acceptable, inconsistent Order/Roll state
/// is not. Allocator and sequencer failures propagate verbatim.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn create_order(&self, new_order: NewOrder) -> EngineResult<Order>;

    async fn get_order(&self, order_id: OrderId) -> EngineResult<Order>;

    async fn list_orders(&self) -> EngineResult<Vec<Order>>;

    /// Replace the line items of an active order and recompute `total`.
    /// Never touches `amount_paid`/`payment_status`; those belong to the
    /// payment reconciler, even while an order is being edited.
    async fn update_items(&self, order_id: OrderId, items: Vec<LineItem>) -> EngineResult<Order>;

    /// Mark production finished. Only active orders complete; payment state
    /// is unaffected (an order can complete while still partially paid).
    async fn complete_order(&self, order_id: OrderId) -> EngineResult<Order>;

    /// Soft cancel. Consumed material stays consumed; payment history is
    /// preserved.
    async fn cancel_order(&self, order_id: OrderId) -> EngineResult<Order>;
}
