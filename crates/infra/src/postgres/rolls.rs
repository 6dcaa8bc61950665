//! Roll store and allocator on Postgres.
//!
//! The transaction-scoped helpers (`allocate_fifo_tx`, `allocate_from_roll_tx`)
//! are shared with order creation, which performs its allocation inside the
//! order transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Row, Transaction};
use tracing::instrument;

use printdesk_core::{EngineError, EngineResult, Length, OrderId, UsageEventId};
use printdesk_rolls::{
    Allocation, AllocationRequest, AvailabilityCheck, InstallRoll, MaterialType, Roll,
    RollAllocator, RollStore, RollUsageEvent, UsageKind,
};

use super::{PostgresEngine, corrupt_row, map_sqlx_error};

#[derive(Debug)]
pub(super) struct RollRow {
    material_type: String,
    roll_number: i32,
    total_length: i64,
    available_length: i64,
    is_active: bool,
    notes: Option<String>,
    installed_at: DateTime<Utc>,
    last_updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for RollRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(RollRow {
            material_type: row.try_get("material_type")?,
            roll_number: row.try_get("roll_number")?,
            total_length: row.try_get("total_length")?,
            available_length: row.try_get("available_length")?,
            is_active: row.try_get("is_active")?,
            notes: row.try_get("notes")?,
            installed_at: row.try_get("installed_at")?,
            last_updated_at: row.try_get("last_updated_at")?,
        })
    }
}

impl RollRow {
    fn into_roll(self, operation: &str) -> EngineResult<Roll> {
        Ok(Roll {
            material_type: MaterialType::new(&self.material_type)
                .map_err(|e| corrupt_row(operation, e))?,
            roll_number: self.roll_number as u32,
            total_length: Length::from_hundredths(self.total_length),
            available_length: Length::from_hundredths(self.available_length),
            is_active: self.is_active,
            notes: self.notes,
            installed_at: self.installed_at,
            last_updated_at: self.last_updated_at,
        })
    }
}

const SELECT_ROLL: &str = r#"
    SELECT material_type, roll_number, total_length, available_length,
           is_active, notes, installed_at, last_updated_at
    FROM rolls
"#;

fn roll_not_found(material_type: &MaterialType, roll_number: u32) -> EngineError {
    EngineError::not_found(format!("roll {roll_number} of {material_type}"))
}

/// Lock the FIFO candidate row: lowest-numbered active roll with capacity.
async fn lock_fifo_candidate(
    tx: &mut Transaction<'_, Postgres>,
    material_type: &MaterialType,
    required: Length,
) -> EngineResult<Option<Roll>> {
    let row = sqlx::query(&format!(
        "{SELECT_ROLL} WHERE material_type = $1 AND is_active AND available_length >= $2 \
         ORDER BY roll_number ASC LIMIT 1 FOR UPDATE"
    ))
    .bind(material_type.as_str())
    .bind(required.hundredths())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_fifo_candidate", e))?;

    match row {
        Some(row) => {
            let roll = RollRow::from_row(&row)
                .map_err(|e| corrupt_row("lock_fifo_candidate", e))?
                .into_roll("lock_fifo_candidate")?;
            Ok(Some(roll))
        }
        None => Ok(None),
    }
}

async fn lock_roll(
    tx: &mut Transaction<'_, Postgres>,
    material_type: &MaterialType,
    roll_number: u32,
) -> EngineResult<Option<Roll>> {
    let row = sqlx::query(&format!(
        "{SELECT_ROLL} WHERE material_type = $1 AND roll_number = $2 FOR UPDATE"
    ))
    .bind(material_type.as_str())
    .bind(roll_number as i32)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_roll", e))?;

    match row {
        Some(row) => {
            let roll = RollRow::from_row(&row)
                .map_err(|e| corrupt_row("lock_roll", e))?
                .into_roll("lock_roll")?;
            Ok(Some(roll))
        }
        None => Ok(None),
    }
}

/// Largest remaining length among active rolls of the type (for the
/// actionable half of `InsufficientStock`).
async fn best_available(
    tx: &mut Transaction<'_, Postgres>,
    material_type: &MaterialType,
) -> EngineResult<Length> {
    let row = sqlx::query(
        "SELECT COALESCE(MAX(available_length), 0) AS best FROM rolls \
         WHERE material_type = $1 AND is_active",
    )
    .bind(material_type.as_str())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("best_available", e))?;

    let best: i64 = row
        .try_get("best")
        .map_err(|e| corrupt_row("best_available", e))?;
    Ok(Length::from_hundredths(best))
}

pub(super) async fn insert_usage_event_tx(
    tx: &mut Transaction<'_, Postgres>,
    material_type: &MaterialType,
    roll_number: u32,
    kind: UsageKind,
    amount: Length,
    order_id: Option<OrderId>,
    recorded_by: &str,
    notes: Option<&str>,
) -> EngineResult<()> {
    sqlx::query(
        r#"
        INSERT INTO roll_usage_events
            (event_id, material_type, roll_number, amount, kind, order_id,
             recorded_by, notes, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(UsageEventId::new().as_uuid())
    .bind(material_type.as_str())
    .bind(roll_number as i32)
    .bind(amount.hundredths())
    .bind(kind.as_str())
    .bind(order_id.map(|id| *id.as_uuid()))
    .bind(recorded_by)
    .bind(notes)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_usage_event", e))?;
    Ok(())
}

/// Deduct from an already-locked roll and append the audit record.
async fn deduct_locked_tx(
    tx: &mut Transaction<'_, Postgres>,
    roll: &Roll,
    request: &AllocationRequest,
) -> EngineResult<Allocation> {
    let updated = sqlx::query(
        r#"
        UPDATE rolls
        SET available_length = available_length - $3, last_updated_at = $4
        WHERE material_type = $1 AND roll_number = $2 AND available_length >= $3
        "#,
    )
    .bind(roll.material_type.as_str())
    .bind(roll.roll_number as i32)
    .bind(request.required_length.hundredths())
    .bind(Utc::now())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("deduct_roll", e))?;

    if updated.rows_affected() != 1 {
        return Err(EngineError::conflict(format!(
            "roll {} of {} changed under the deduction",
            roll.roll_number, roll.material_type
        )));
    }

    insert_usage_event_tx(
        tx,
        &roll.material_type,
        roll.roll_number,
        UsageKind::Consumption,
        request.required_length,
        request.order_id,
        &request.recorded_by,
        request.notes.as_deref(),
    )
    .await?;

    Ok(Allocation {
        material_type: roll.material_type.clone(),
        roll_number: roll.roll_number,
        consumed: request.required_length,
        remaining: roll.available_length.saturating_sub(request.required_length),
    })
}

/// FIFO selection and deduction inside an existing transaction.
pub(super) async fn allocate_fifo_tx(
    tx: &mut Transaction<'_, Postgres>,
    request: &AllocationRequest,
) -> EngineResult<Allocation> {
    match lock_fifo_candidate(tx, &request.material_type, request.required_length).await? {
        Some(roll) => deduct_locked_tx(tx, &roll, request).await,
        None => {
            let available = best_available(tx, &request.material_type).await?;
            Err(EngineError::InsufficientStock {
                material_type: request.material_type.as_str().to_string(),
                required: request.required_length,
                available,
            })
        }
    }
}

/// Operator-chosen roll deduction inside an existing transaction.
pub(super) async fn allocate_from_roll_tx(
    tx: &mut Transaction<'_, Postgres>,
    roll_number: u32,
    request: &AllocationRequest,
) -> EngineResult<Allocation> {
    let roll = lock_roll(tx, &request.material_type, roll_number)
        .await?
        .ok_or_else(|| roll_not_found(&request.material_type, roll_number))?;

    if !roll.is_active {
        return Err(EngineError::validation(format!(
            "roll {roll_number} of {} is inactive",
            request.material_type
        )));
    }
    if roll.available_length < request.required_length {
        return Err(EngineError::InsufficientStock {
            material_type: request.material_type.as_str().to_string(),
            required: request.required_length,
            available: roll.available_length,
        });
    }
    deduct_locked_tx(tx, &roll, request).await
}

impl PostgresEngine {
    async fn fetch_roll(
        &self,
        material_type: &MaterialType,
        roll_number: u32,
    ) -> EngineResult<Roll> {
        let row = sqlx::query(&format!(
            "{SELECT_ROLL} WHERE material_type = $1 AND roll_number = $2"
        ))
        .bind(material_type.as_str())
        .bind(roll_number as i32)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| map_sqlx_error("get_roll", e))?
        .ok_or_else(|| roll_not_found(material_type, roll_number))?;

        RollRow::from_row(&row)
            .map_err(|e| corrupt_row("get_roll", e))?
            .into_roll("get_roll")
    }

    async fn install_once(&self, spec: &InstallRoll, kind: UsageKind) -> EngineResult<Roll> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| map_sqlx_error("install", e))?;

        let now = Utc::now();
        let row = match kind {
            UsageKind::Install => sqlx::query(
                r#"
                INSERT INTO rolls
                    (material_type, roll_number, total_length, available_length,
                     is_active, notes, installed_at, last_updated_at)
                VALUES ($1, $2, $3, $3, TRUE, $4, $5, $5)
                ON CONFLICT (material_type, roll_number) DO UPDATE SET
                    total_length = EXCLUDED.total_length,
                    available_length = EXCLUDED.total_length,
                    is_active = TRUE,
                    notes = EXCLUDED.notes,
                    installed_at = EXCLUDED.installed_at,
                    last_updated_at = EXCLUDED.last_updated_at
                RETURNING material_type, roll_number, total_length, available_length,
                          is_active, notes, installed_at, last_updated_at
                "#,
            )
            .bind(spec.material_type.as_str())
            .bind(spec.roll_number as i32)
            .bind(spec.total_length.hundredths())
            .bind(spec.notes.as_deref())
            .bind(now)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("install", e))?,
            _ => sqlx::query(
                r#"
                UPDATE rolls
                SET total_length = $3, available_length = $3, is_active = TRUE,
                    notes = $4, installed_at = $5, last_updated_at = $5
                WHERE material_type = $1 AND roll_number = $2
                RETURNING material_type, roll_number, total_length, available_length,
                          is_active, notes, installed_at, last_updated_at
                "#,
            )
            .bind(spec.material_type.as_str())
            .bind(spec.roll_number as i32)
            .bind(spec.total_length.hundredths())
            .bind(spec.notes.as_deref())
            .bind(now)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("reset", e))?,
        };

        let row = row.ok_or_else(|| roll_not_found(&spec.material_type, spec.roll_number))?;
        let roll = RollRow::from_row(&row)
            .map_err(|e| corrupt_row("install", e))?
            .into_roll("install")?;

        insert_usage_event_tx(
            &mut tx,
            &spec.material_type,
            spec.roll_number,
            kind,
            Length::ZERO,
            None,
            &spec.recorded_by,
            spec.notes.as_deref(),
        )
        .await?;

        tx.commit().await.map_err(|e| map_sqlx_error("install", e))?;
        Ok(roll)
    }

    async fn allocate_once(&self, request: &AllocationRequest) -> EngineResult<Allocation> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| map_sqlx_error("allocate", e))?;
        let allocation = allocate_fifo_tx(&mut tx, request).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("allocate", e))?;
        Ok(allocation)
    }

    async fn allocate_from_roll_once(
        &self,
        roll_number: u32,
        request: &AllocationRequest,
    ) -> EngineResult<Allocation> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| map_sqlx_error("allocate_from_roll", e))?;
        let allocation = allocate_from_roll_tx(&mut tx, roll_number, request).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("allocate_from_roll", e))?;
        Ok(allocation)
    }
}

#[async_trait]
impl RollStore for PostgresEngine {
    async fn get(&self, material_type: &MaterialType, roll_number: u32) -> EngineResult<Roll> {
        self.run("get_roll", || self.fetch_roll(material_type, roll_number))
            .await
    }

    async fn list_by_type(&self, material_type: &MaterialType) -> EngineResult<Vec<Roll>> {
        self.run("list_rolls", || async {
            let rows = sqlx::query(&format!(
                "{SELECT_ROLL} WHERE material_type = $1 ORDER BY roll_number ASC"
            ))
            .bind(material_type.as_str())
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("list_rolls", e))?;

            rows.iter()
                .map(|row| {
                    RollRow::from_row(row)
                        .map_err(|e| corrupt_row("list_rolls", e))?
                        .into_roll("list_rolls")
                })
                .collect()
        })
        .await
    }

    #[instrument(skip(self, spec), fields(material_type = %spec.material_type, roll_number = spec.roll_number))]
    async fn install(&self, spec: InstallRoll) -> EngineResult<Roll> {
        spec.validate()?;
        self.run("install", || self.install_once(&spec, UsageKind::Install))
            .await
    }

    #[instrument(skip(self, spec), fields(material_type = %spec.material_type, roll_number = spec.roll_number))]
    async fn reset(&self, spec: InstallRoll) -> EngineResult<Roll> {
        spec.validate()?;
        self.run("reset", || self.install_once(&spec, UsageKind::Reset))
            .await
    }

    async fn set_active(
        &self,
        material_type: &MaterialType,
        roll_number: u32,
        active: bool,
    ) -> EngineResult<Roll> {
        self.run("set_active", || async {
            let row = sqlx::query(
                r#"
                UPDATE rolls SET is_active = $3, last_updated_at = $4
                WHERE material_type = $1 AND roll_number = $2
                RETURNING material_type, roll_number, total_length, available_length,
                          is_active, notes, installed_at, last_updated_at
                "#,
            )
            .bind(material_type.as_str())
            .bind(roll_number as i32)
            .bind(active)
            .bind(Utc::now())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("set_active", e))?
            .ok_or_else(|| roll_not_found(material_type, roll_number))?;

            RollRow::from_row(&row)
                .map_err(|e| corrupt_row("set_active", e))?
                .into_roll("set_active")
        })
        .await
    }

    async fn usage_history(
        &self,
        material_type: &MaterialType,
        roll_number: u32,
    ) -> EngineResult<Vec<RollUsageEvent>> {
        self.run("usage_history", || async {
            let rows = sqlx::query(
                r#"
                SELECT event_id, material_type, roll_number, amount, kind, order_id,
                       recorded_by, notes, occurred_at
                FROM roll_usage_events
                WHERE material_type = $1 AND roll_number = $2
                ORDER BY occurred_at ASC, event_id ASC
                "#,
            )
            .bind(material_type.as_str())
            .bind(roll_number as i32)
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("usage_history", e))?;

            rows.iter()
                .map(|row| {
                    let kind: String = row
                        .try_get("kind")
                        .map_err(|e| corrupt_row("usage_history", e))?;
                    Ok(RollUsageEvent {
                        id: UsageEventId::from_uuid(
                            row.try_get("event_id")
                                .map_err(|e| corrupt_row("usage_history", e))?,
                        ),
                        material_type: MaterialType::new(
                            row.try_get::<String, _>("material_type")
                                .map_err(|e| corrupt_row("usage_history", e))?,
                        )?,
                        roll_number: row
                            .try_get::<i32, _>("roll_number")
                            .map_err(|e| corrupt_row("usage_history", e))?
                            as u32,
                        amount: Length::from_hundredths(
                            row.try_get("amount")
                                .map_err(|e| corrupt_row("usage_history", e))?,
                        ),
                        kind: UsageKind::parse(&kind)
                            .ok_or_else(|| corrupt_row("usage_history", &kind))?,
                        order_id: row
                            .try_get::<Option<uuid::Uuid>, _>("order_id")
                            .map_err(|e| corrupt_row("usage_history", e))?
                            .map(OrderId::from_uuid),
                        recorded_by: row
                            .try_get("recorded_by")
                            .map_err(|e| corrupt_row("usage_history", e))?,
                        notes: row
                            .try_get("notes")
                            .map_err(|e| corrupt_row("usage_history", e))?,
                        occurred_at: row
                            .try_get("occurred_at")
                            .map_err(|e| corrupt_row("usage_history", e))?,
                    })
                })
                .collect()
        })
        .await
    }
}

#[async_trait]
impl RollAllocator for PostgresEngine {
    #[instrument(skip(self, request), fields(material_type = %request.material_type, required = %request.required_length))]
    async fn allocate(&self, request: AllocationRequest) -> EngineResult<Allocation> {
        request.validate()?;
        self.run("allocate", || self.allocate_once(&request)).await
    }

    #[instrument(skip(self, request), fields(material_type = %request.material_type, roll_number = roll_number, required = %request.required_length))]
    async fn allocate_from_roll(
        &self,
        roll_number: u32,
        request: AllocationRequest,
    ) -> EngineResult<Allocation> {
        request.validate()?;
        self.run("allocate_from_roll", || {
            self.allocate_from_roll_once(roll_number, &request)
        })
        .await
    }

    async fn check_availability(
        &self,
        material_type: &MaterialType,
        roll_number: u32,
        required_length: Length,
    ) -> EngineResult<AvailabilityCheck> {
        let roll = RollStore::get(self, material_type, roll_number).await?;
        Ok(AvailabilityCheck::for_roll(&roll, required_length))
    }
}
