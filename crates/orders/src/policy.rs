//! Work-type → material-allocation configuration.
//!
//! Which material family a work type consumes, and whether the roll is
//! auto-selected (FIFO) or named by the operator, is configuration. The
//! engine never branches on specific work-type strings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use printdesk_core::EngineResult;
use printdesk_rolls::MaterialType;

use crate::order::WorkType;

/// How material is sourced for one work type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum MaterialPolicy {
    /// The work type consumes no roll material.
    None,
    /// Auto-select the lowest-numbered active roll with capacity.
    Fifo { material_type: MaterialType },
    /// The caller must name the roll to deduct from.
    Operator { material_type: MaterialType },
}

impl MaterialPolicy {
    pub fn material_type(&self) -> Option<&MaterialType> {
        match self {
            MaterialPolicy::None => None,
            MaterialPolicy::Fifo { material_type } | MaterialPolicy::Operator { material_type } => {
                Some(material_type)
            }
        }
    }
}

/// The configured policy map. Unknown work types consume no material.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationPolicies {
    policies: HashMap<WorkType, MaterialPolicy>,
}

impl AllocationPolicies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shipped defaults for the known print-shop work types.
    pub fn print_shop_defaults() -> EngineResult<Self> {
        let mut policies = Self::new();
        policies.set(
            WorkType::new("DTF_PRINT")?,
            MaterialPolicy::Fifo {
                material_type: MaterialType::new("DTF")?,
            },
        );
        policies.set(
            WorkType::new("SUBLIMATION")?,
            MaterialPolicy::Operator {
                material_type: MaterialType::new("SUBLIM")?,
            },
        );
        policies.set(WorkType::new("EMBROIDERY")?, MaterialPolicy::None);
        Ok(policies)
    }

    /// Parse the `ALLOCATION_POLICIES` JSON override, e.g.
    /// `{"DTF_PRINT": {"mode": "fifo", "material_type": "DTF"}}`.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            printdesk_core::EngineError::validation(format!("malformed allocation policies: {e}"))
        })
    }

    pub fn set(&mut self, work_type: WorkType, policy: MaterialPolicy) {
        self.policies.insert(work_type, policy);
    }

    pub fn for_work_type(&self, work_type: &WorkType) -> &MaterialPolicy {
        self.policies.get(work_type).unwrap_or(&MaterialPolicy::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_work_type_consumes_nothing() {
        let policies = AllocationPolicies::new();
        let wt = WorkType::new("VINYL_CUT").unwrap();
        assert_eq!(policies.for_work_type(&wt), &MaterialPolicy::None);
    }

    #[test]
    fn defaults_cover_the_known_work_types() {
        let policies = AllocationPolicies::print_shop_defaults().unwrap();
        let dtf = WorkType::new("DTF_PRINT").unwrap();
        match policies.for_work_type(&dtf) {
            MaterialPolicy::Fifo { material_type } => assert_eq!(material_type.as_str(), "DTF"),
            other => panic!("expected fifo policy, got {other:?}"),
        }
        let sublimation = WorkType::new("SUBLIMATION").unwrap();
        assert!(matches!(
            policies.for_work_type(&sublimation),
            MaterialPolicy::Operator { .. }
        ));
    }

    #[test]
    fn policies_round_trip_through_json() {
        let json = r#"{
            "DTF_PRINT": {"mode": "fifo", "material_type": "DTF"},
            "PATCHES": {"mode": "operator", "material_type": "TWILL"},
            "EMBROIDERY": {"mode": "none"}
        }"#;
        let policies = AllocationPolicies::from_json(json).unwrap();
        let patches = WorkType::new("PATCHES").unwrap();
        match policies.for_work_type(&patches) {
            MaterialPolicy::Operator { material_type } => {
                assert_eq!(material_type.as_str(), "TWILL")
            }
            other => panic!("expected operator policy, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        assert!(AllocationPolicies::from_json("not json").is_err());
    }
}
