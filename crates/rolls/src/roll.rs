use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printdesk_core::{EngineError, EngineResult, Length};

/// Material family consumed from rolls (e.g. `DTF`, `SUBLIM`).
///
/// Normalized to a trimmed, uppercased token so `dtf` and `DTF` name the
/// same stock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialType(String);

impl MaterialType {
    pub fn new(raw: impl AsRef<str>) -> EngineResult<Self> {
        let normalized = raw.as_ref().trim().to_uppercase();
        if normalized.is_empty() {
            return Err(EngineError::validation("material_type cannot be empty"));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for MaterialType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A physical spool of one material type.
///
/// Identity is `(material_type, roll_number)`; roll 7 of `DTF` and roll 7 of
/// `SUBLIM` are distinct spools. Invariant:
/// `0 <= available_length <= total_length` at all times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roll {
    pub material_type: MaterialType,
    pub roll_number: u32,
    pub total_length: Length,
    pub available_length: Length,
    /// Inactive rolls are excluded from allocation but keep their history.
    pub is_active: bool,
    pub notes: Option<String>,
    pub installed_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl Roll {
    /// Install a fresh spool: full capacity, zero usage.
    pub fn install(spec: &InstallRoll, at: DateTime<Utc>) -> Self {
        Self {
            material_type: spec.material_type.clone(),
            roll_number: spec.roll_number,
            total_length: spec.total_length,
            available_length: spec.total_length,
            is_active: true,
            notes: spec.notes.clone(),
            installed_at: at,
            last_updated_at: at,
        }
    }

    /// Derived usage: `total_length - available_length`.
    pub fn used_length(&self) -> Length {
        self.total_length.saturating_sub(self.available_length)
    }

    pub fn has_capacity_for(&self, required: Length) -> bool {
        self.is_active && self.available_length >= required
    }

    /// Deduct `required` from the remaining length.
    ///
    /// Callers decide whether a shortfall is `InsufficientStock` (FIFO path,
    /// where other candidates may exist) or a validation failure; this only
    /// enforces the bounds invariant.
    pub fn consume(&mut self, required: Length, at: DateTime<Utc>) -> EngineResult<()> {
        if required.is_zero() {
            return Err(EngineError::validation("required_length must be positive"));
        }
        if self.available_length < required {
            return Err(EngineError::InsufficientStock {
                material_type: self.material_type.as_str().to_string(),
                required,
                available: self.available_length,
            });
        }
        self.available_length = self.available_length.saturating_sub(required);
        self.last_updated_at = at;
        Ok(())
    }

    /// Re-initialize capacity in place (replacement spool on the same
    /// holder). Fully overwrites prior capacity and usage; last write wins.
    pub fn reinstall(&mut self, spec: &InstallRoll, at: DateTime<Utc>) {
        self.total_length = spec.total_length;
        self.available_length = spec.total_length;
        self.is_active = true;
        self.notes = spec.notes.clone();
        self.installed_at = at;
        self.last_updated_at = at;
    }

    /// The bounds invariant; storage backends assert this before commit.
    pub fn bounds_ok(&self) -> bool {
        Length::ZERO <= self.available_length && self.available_length <= self.total_length
    }
}

/// Parameters of an install or reset operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRoll {
    pub material_type: MaterialType,
    pub roll_number: u32,
    pub total_length: Length,
    pub notes: Option<String>,
    pub recorded_by: String,
}

impl InstallRoll {
    pub fn validate(&self) -> EngineResult<()> {
        if self.recorded_by.trim().is_empty() {
            return Err(EngineError::validation("recorded_by cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(total: i64) -> InstallRoll {
        InstallRoll {
            material_type: MaterialType::new("dtf").unwrap(),
            roll_number: 1,
            total_length: Length::from_hundredths(total),
            notes: None,
            recorded_by: "operator".to_string(),
        }
    }

    #[test]
    fn material_type_is_normalized() {
        assert_eq!(MaterialType::new("  dtf ").unwrap().as_str(), "DTF");
        assert!(MaterialType::new("   ").is_err());
    }

    #[test]
    fn install_starts_at_full_capacity() {
        let roll = Roll::install(&spec(10_000), Utc::now());
        assert_eq!(roll.available_length, Length::from_hundredths(10_000));
        assert_eq!(roll.used_length(), Length::ZERO);
        assert!(roll.is_active);
    }

    #[test]
    fn consume_deducts_and_tracks_usage() {
        let mut roll = Roll::install(&spec(10_000), Utc::now());
        roll.consume(Length::from_hundredths(2_500), Utc::now())
            .unwrap();
        assert_eq!(roll.available_length, Length::from_hundredths(7_500));
        assert_eq!(roll.used_length(), Length::from_hundredths(2_500));
    }

    #[test]
    fn consume_never_goes_below_zero() {
        let mut roll = Roll::install(&spec(1_000), Utc::now());
        let err = roll
            .consume(Length::from_hundredths(1_001), Utc::now())
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientStock { .. }));
        assert_eq!(roll.available_length, Length::from_hundredths(1_000));
    }

    #[test]
    fn consume_rejects_zero_length() {
        let mut roll = Roll::install(&spec(1_000), Utc::now());
        assert!(roll.consume(Length::ZERO, Utc::now()).is_err());
    }

    #[test]
    fn reinstall_overwrites_capacity_and_usage() {
        let mut roll = Roll::install(&spec(1_000), Utc::now());
        roll.consume(Length::from_hundredths(1_000), Utc::now())
            .unwrap();
        assert_eq!(roll.available_length, Length::ZERO);

        roll.reinstall(&spec(20_000), Utc::now());
        assert_eq!(roll.total_length, Length::from_hundredths(20_000));
        assert_eq!(roll.available_length, Length::from_hundredths(20_000));
        assert_eq!(roll.used_length(), Length::ZERO);
    }
}
