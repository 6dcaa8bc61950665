//! Partial payments and the payment-status rule.
//!
//! The three-way classification of an order's payment completeness lives
//! here, as one pure function called from every write path.

pub mod payment;
pub mod status;

pub use payment::{NewPayment, PartialPayment, PaymentMethod, PaymentReconciler};
pub use status::PaymentStatus;
