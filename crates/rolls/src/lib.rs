//! Material roll ledger domain.
//!
//! Business rules for finite, physically-consumed rolls of printable
//! material: capacity bounds, FIFO depletion, and the append-only usage
//! audit. Pure domain logic; storage and transactions live in
//! `printdesk-infra`.

pub mod allocation;
pub mod roll;
pub mod usage;

pub use allocation::{
    Allocation, AllocationRequest, AvailabilityCheck, RollAllocator, RollStore, pick_fifo,
};
pub use roll::{InstallRoll, MaterialType, Roll};
pub use usage::{RollUsageEvent, UsageKind};
