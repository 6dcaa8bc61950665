use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use printdesk_core::{EngineError, EngineResult};

/// Unique, human-readable, date-scoped order identifier.
///
/// `YYMMDD` of the issue date followed by a zero-padded sequence number
/// (width 4, growing if a day ever exceeds 9999 orders): `2504170007`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptNumber(String);

impl ReceiptNumber {
    pub fn compose(date: NaiveDate, sequence: u32) -> EngineResult<Self> {
        if sequence == 0 {
            return Err(EngineError::validation("receipt sequence starts at 1"));
        }
        Ok(Self(format!("{}{:04}", Self::day_prefix(date), sequence)))
    }

    /// `YYMMDD` bucket key the sequence is scoped to.
    pub fn day_prefix(date: NaiveDate) -> String {
        format!(
            "{:02}{:02}{:02}",
            date.year() % 100,
            date.month(),
            date.day()
        )
    }

    pub fn parse(raw: &str) -> EngineResult<Self> {
        if raw.len() < 10 || !raw.chars().all(|c| c.is_ascii_digit()) {
            return Err(EngineError::validation(format!(
                "malformed receipt number: {raw}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn sequence(&self) -> u32 {
        self.0[6..].parse().unwrap_or(0)
    }
}

impl core::fmt::Display for ReceiptNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collision-free receipt issuance.
///
/// Two concurrent `next` calls on the same day must never return the same
/// value; the storage layer serializes the per-day counter (atomic
/// increment, or uniqueness constraint with bounded retry). Gaps are
/// acceptable, duplicates are not. No receipt ⇒ no order: an `Unavailable`
/// failure here aborts order creation.
#[async_trait]
pub trait ReceiptSequencer: Send + Sync {
    async fn next(&self, date: NaiveDate) -> EngineResult<ReceiptNumber>;
}
