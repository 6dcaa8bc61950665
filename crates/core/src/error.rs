//! Engine error model.

use thiserror::Error;

use crate::units::{Length, Money};

/// Result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level error.
///
/// `InsufficientStock` and `Overpayment` are expected business outcomes, not
/// system failures, and stay distinguishable from `Conflict`/`Unavailable`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A value failed validation (e.g. malformed input). Caller's fault,
    /// never retried automatically.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No active roll of the material type has enough remaining length.
    #[error(
        "insufficient {material_type} stock: required {required}, best available {available}"
    )]
    InsufficientStock {
        material_type: String,
        required: Length,
        /// Largest remaining length among active rolls of the type
        /// (zero when none exist).
        available: Length,
    },

    /// The payment would push `amount_paid` above the order total.
    #[error("payment exceeds order total; maximum acceptable amount is {max_acceptable}")]
    Overpayment { max_acceptable: Money },

    /// Lost a concurrency race; safe to retry a bounded number of times.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A referenced roll/order/payment does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage unreachable or the operation deadline was exceeded.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Whether a bounded retry of the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
