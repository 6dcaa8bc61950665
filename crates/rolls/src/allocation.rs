//! Roll selection and the storage-facing contracts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use printdesk_core::{EngineError, EngineResult, Length, OrderId};

use crate::roll::{InstallRoll, MaterialType, Roll};
use crate::usage::RollUsageEvent;

/// Outcome of a committed deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub material_type: MaterialType,
    pub roll_number: u32,
    pub consumed: Length,
    /// Remaining length on the roll after the deduction.
    pub remaining: Length,
}

/// Parameters of a deduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    pub material_type: MaterialType,
    pub required_length: Length,
    /// Absent for out-of-band usage (waste, test prints).
    pub order_id: Option<OrderId>,
    pub recorded_by: String,
    pub notes: Option<String>,
}

impl AllocationRequest {
    pub fn validate(&self) -> EngineResult<()> {
        if self.required_length.is_zero() {
            return Err(EngineError::validation("required_length must be positive"));
        }
        if self.recorded_by.trim().is_empty() {
            return Err(EngineError::validation("recorded_by cannot be empty"));
        }
        Ok(())
    }
}

/// Advisory pre-flight answer. Carries no allocation guarantee: a subsequent
/// allocate may still fail due to a race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityCheck {
    pub sufficient: bool,
    pub available_length: Length,
    /// How much is missing (zero when sufficient).
    pub shortfall: Length,
}

impl AvailabilityCheck {
    pub fn for_roll(roll: &Roll, required: Length) -> Self {
        let available = if roll.is_active {
            roll.available_length
        } else {
            Length::ZERO
        };
        Self {
            sufficient: roll.is_active && available >= required,
            available_length: available,
            shortfall: required.saturating_sub(available),
        }
    }
}

/// FIFO depletion rule: among active rolls with enough remaining length,
/// pick the smallest roll number, so low-numbered rolls empty first and
/// operators replace them in a predictable order.
pub fn pick_fifo<'a>(rolls: &'a [Roll], required: Length) -> Option<&'a Roll> {
    rolls
        .iter()
        .filter(|r| r.has_capacity_for(required))
        .min_by_key(|r| r.roll_number)
}

/// Durable roll state and usage history.
#[async_trait]
pub trait RollStore: Send + Sync {
    async fn get(&self, material_type: &MaterialType, roll_number: u32) -> EngineResult<Roll>;

    async fn list_by_type(&self, material_type: &MaterialType) -> EngineResult<Vec<Roll>>;

    /// Install (upsert) a spool: sets `available_length = total_length`,
    /// zeroes usage, stamps `installed_at`, and appends one `INSTALL` event.
    /// Idempotent in effect: last write fully overwrites capacity and usage.
    async fn install(&self, spec: InstallRoll) -> EngineResult<Roll>;

    /// Same capacity reinitialization restricted to an existing roll;
    /// appends a `RESET` event.
    async fn reset(&self, spec: InstallRoll) -> EngineResult<Roll>;

    async fn set_active(
        &self,
        material_type: &MaterialType,
        roll_number: u32,
        active: bool,
    ) -> EngineResult<Roll>;

    /// Chronological audit trail for one roll.
    async fn usage_history(
        &self,
        material_type: &MaterialType,
        roll_number: u32,
    ) -> EngineResult<Vec<RollUsageEvent>>;
}

/// Atomic selection-and-deduction.
///
/// Between reading candidate rolls and committing the deduction no other
/// allocation may consume the same units; the storage layer is the arbiter
/// (row locking or compare-and-swap). Allocations against different rolls do
/// not block each other.
#[async_trait]
pub trait RollAllocator: Send + Sync {
    /// FIFO selection among active rolls of the material type.
    /// `InsufficientStock` is a normal outcome, never a partial success.
    async fn allocate(&self, request: AllocationRequest) -> EngineResult<Allocation>;

    /// Same atomic deduct against an operator-chosen roll.
    async fn allocate_from_roll(
        &self,
        roll_number: u32,
        request: AllocationRequest,
    ) -> EngineResult<Allocation>;

    /// Advisory read-only check for pre-flight UI warnings.
    async fn check_availability(
        &self,
        material_type: &MaterialType,
        roll_number: u32,
        required_length: Length,
    ) -> EngineResult<AvailabilityCheck>;
}
