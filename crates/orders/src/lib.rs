//! Customer work orders: line items, receipt numbers, allocation policy,
//! and the order-ledger contract.

pub mod ledger;
pub mod line_item;
pub mod order;
pub mod policy;
pub mod receipt;

pub use ledger::OrderLedger;
pub use line_item::{CostComponent, LineItem, order_total, required_material_length};
pub use order::{NewOrder, Order, OrderStatus, WorkType};
pub use policy::{AllocationPolicies, MaterialPolicy};
pub use receipt::{ReceiptNumber, ReceiptSequencer};
