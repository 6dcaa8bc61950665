use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printdesk_core::{Length, OrderId, UsageEventId};

use crate::roll::MaterialType;

/// What happened to a roll.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UsageKind {
    /// Length deducted for production.
    Consumption,
    /// Spool installed (first setup or replacement).
    Install,
    /// Explicit capacity reset on an existing roll.
    Reset,
}

impl UsageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UsageKind::Consumption => "CONSUMPTION",
            UsageKind::Install => "INSTALL",
            UsageKind::Reset => "RESET",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONSUMPTION" => Some(UsageKind::Consumption),
            "INSTALL" => Some(UsageKind::Install),
            "RESET" => Some(UsageKind::Reset),
            _ => None,
        }
    }
}

/// Append-only audit record of a deduction, install, or reset.
///
/// Created exactly once per operation, in the same transaction as the roll
/// mutation; never mutated or deleted afterwards. This is the sole source of
/// truth for "what happened to this roll".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollUsageEvent {
    pub id: UsageEventId,
    pub material_type: MaterialType,
    pub roll_number: u32,
    /// Length consumed; zero for installs and resets.
    pub amount: Length,
    pub kind: UsageKind,
    pub order_id: Option<OrderId>,
    pub recorded_by: String,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
