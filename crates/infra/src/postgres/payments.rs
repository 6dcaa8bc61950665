//! Payment reconciliation on Postgres.
//!
//! Both writers lock the owning order row first, so `record_payment` and
//! `reverse_payment` against the same order serialize in a fixed order. The
//! payment insert/delete and the order recompute commit together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Row, Transaction};
use tracing::instrument;

use printdesk_core::{EngineError, EngineResult, Money, OrderId, PaymentId};
use printdesk_orders::OrderStatus;
use printdesk_payments::{
    NewPayment, PartialPayment, PaymentMethod, PaymentReconciler, PaymentStatus,
};

use super::{PostgresEngine, corrupt_row, map_sqlx_error};

fn order_not_found(order_id: OrderId) -> EngineError {
    EngineError::not_found(format!("order {order_id}"))
}

/// Lock the order row; returns `(total, status)`.
pub(super) async fn lock_order_tx(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
) -> EngineResult<(Money, OrderStatus)> {
    let row = sqlx::query("SELECT total, status FROM orders WHERE order_id = $1 FOR UPDATE")
        .bind(order_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_order", e))?
        .ok_or_else(|| order_not_found(order_id))?;

    let total: i64 = row.try_get("total").map_err(|e| corrupt_row("lock_order", e))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| corrupt_row("lock_order", e))?;
    let status =
        OrderStatus::parse(&status).ok_or_else(|| corrupt_row("lock_order", &status))?;
    Ok((Money::from_hundredths(total), status))
}

/// Sum of the order's surviving payments, the source of truth the derived
/// fields are recomputed from.
async fn paid_sum_tx(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
) -> EngineResult<Money> {
    let row = sqlx::query(
        "SELECT COALESCE(SUM(amount), 0)::BIGINT AS paid FROM order_payments WHERE order_id = $1",
    )
    .bind(order_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("paid_sum", e))?;

    let paid: i64 = row.try_get("paid").map_err(|e| corrupt_row("paid_sum", e))?;
    Ok(Money::from_hundredths(paid))
}

/// Recompute `amount_paid` and `payment_status` on the (already locked)
/// order from the surviving payment rows.
pub(super) async fn reconcile_order_tx(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
    total: Money,
) -> EngineResult<(Money, PaymentStatus)> {
    let paid = paid_sum_tx(tx, order_id).await?;
    let status = PaymentStatus::classify(paid, total);

    sqlx::query(
        "UPDATE orders SET amount_paid = $2, payment_status = $3, updated_at = $4 \
         WHERE order_id = $1",
    )
    .bind(order_id.as_uuid())
    .bind(paid.hundredths())
    .bind(status.as_str())
    .bind(Utc::now())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("reconcile_order", e))?;

    Ok((paid, status))
}

/// Insert one payment and recompute the locked order. Shared with order
/// creation (the paid-at-creation path runs inside the order transaction).
pub(super) async fn record_payment_tx(
    tx: &mut Transaction<'_, Postgres>,
    new_payment: &NewPayment,
) -> EngineResult<PartialPayment> {
    new_payment.validate()?;

    let (total, status) = lock_order_tx(tx, new_payment.order_id).await?;
    if status == OrderStatus::Cancelled {
        return Err(EngineError::validation(
            "cannot record a payment on a cancelled order",
        ));
    }

    let already_paid = paid_sum_tx(tx, new_payment.order_id).await?;
    let max_acceptable = total.saturating_sub(already_paid);
    if new_payment.amount > max_acceptable {
        return Err(EngineError::Overpayment { max_acceptable });
    }

    let payment = PartialPayment {
        id: PaymentId::new(),
        order_id: new_payment.order_id,
        amount: new_payment.amount,
        method: new_payment.method,
        bank: new_payment.bank.clone(),
        receipt_reference: new_payment.receipt_reference.clone(),
        notes: new_payment.notes.clone(),
        recorded_by: new_payment.recorded_by.clone(),
        recorded_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO order_payments
            (payment_id, order_id, amount, method, bank, receipt_reference,
             notes, recorded_by, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(payment.id.as_uuid())
    .bind(payment.order_id.as_uuid())
    .bind(payment.amount.hundredths())
    .bind(payment.method.as_str())
    .bind(payment.bank.as_deref())
    .bind(payment.receipt_reference.as_deref())
    .bind(payment.notes.as_deref())
    .bind(&payment.recorded_by)
    .bind(payment.recorded_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("record_payment", e))?;

    reconcile_order_tx(tx, payment.order_id, total).await?;
    Ok(payment)
}

impl PostgresEngine {
    async fn record_payment_once(&self, new_payment: &NewPayment) -> EngineResult<PartialPayment> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| map_sqlx_error("record_payment", e))?;
        let payment = record_payment_tx(&mut tx, new_payment).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("record_payment", e))?;
        Ok(payment)
    }

    async fn reverse_payment_once(&self, payment_id: PaymentId) -> EngineResult<()> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| map_sqlx_error("reverse_payment", e))?;

        let row = sqlx::query("SELECT order_id FROM order_payments WHERE payment_id = $1")
            .bind(payment_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("reverse_payment", e))?
            .ok_or_else(|| EngineError::not_found(format!("payment {payment_id}")))?;
        let order_id = OrderId::from_uuid(
            row.try_get("order_id")
                .map_err(|e| corrupt_row("reverse_payment", e))?,
        );

        // Same lock order as record_payment: order row first.
        let (total, _status) = lock_order_tx(&mut tx, order_id).await?;

        let deleted = sqlx::query("DELETE FROM order_payments WHERE payment_id = $1")
            .bind(payment_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("reverse_payment", e))?;
        if deleted.rows_affected() != 1 {
            return Err(EngineError::not_found(format!("payment {payment_id}")));
        }

        reconcile_order_tx(&mut tx, order_id, total).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("reverse_payment", e))?;
        Ok(())
    }
}

#[async_trait]
impl PaymentReconciler for PostgresEngine {
    #[instrument(skip(self, new_payment), fields(order_id = %new_payment.order_id, amount = %new_payment.amount))]
    async fn record_payment(&self, new_payment: NewPayment) -> EngineResult<PartialPayment> {
        self.run("record_payment", || self.record_payment_once(&new_payment))
            .await
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    async fn reverse_payment(&self, payment_id: PaymentId) -> EngineResult<()> {
        self.run("reverse_payment", || self.reverse_payment_once(payment_id))
            .await
    }

    async fn payments_for_order(&self, order_id: OrderId) -> EngineResult<Vec<PartialPayment>> {
        self.run("payments_for_order", || async {
            let exists = sqlx::query("SELECT 1 AS one FROM orders WHERE order_id = $1")
                .bind(order_id.as_uuid())
                .fetch_optional(self.pool())
                .await
                .map_err(|e| map_sqlx_error("payments_for_order", e))?;
            if exists.is_none() {
                return Err(order_not_found(order_id));
            }

            let rows = sqlx::query(
                r#"
                SELECT payment_id, order_id, amount, method, bank, receipt_reference,
                       notes, recorded_by, recorded_at
                FROM order_payments
                WHERE order_id = $1
                ORDER BY recorded_at ASC, payment_id ASC
                "#,
            )
            .bind(order_id.as_uuid())
            .fetch_all(self.pool())
            .await
            .map_err(|e| map_sqlx_error("payments_for_order", e))?;

            rows.iter().map(payment_from_row).collect()
        })
        .await
    }
}

fn payment_from_row(row: &sqlx::postgres::PgRow) -> EngineResult<PartialPayment> {
    let method: String = row
        .try_get("method")
        .map_err(|e| corrupt_row("payments_for_order", e))?;
    Ok(PartialPayment {
        id: PaymentId::from_uuid(
            row.try_get("payment_id")
                .map_err(|e| corrupt_row("payments_for_order", e))?,
        ),
        order_id: OrderId::from_uuid(
            row.try_get("order_id")
                .map_err(|e| corrupt_row("payments_for_order", e))?,
        ),
        amount: Money::from_hundredths(
            row.try_get("amount")
                .map_err(|e| corrupt_row("payments_for_order", e))?,
        ),
        method: PaymentMethod::parse(&method)
            .ok_or_else(|| corrupt_row("payments_for_order", &method))?,
        bank: row
            .try_get("bank")
            .map_err(|e| corrupt_row("payments_for_order", e))?,
        receipt_reference: row
            .try_get("receipt_reference")
            .map_err(|e| corrupt_row("payments_for_order", e))?,
        notes: row
            .try_get("notes")
            .map_err(|e| corrupt_row("payments_for_order", e))?,
        recorded_by: row
            .try_get("recorded_by")
            .map_err(|e| corrupt_row("payments_for_order", e))?,
        recorded_at: row
            .try_get::<DateTime<Utc>, _>("recorded_at")
            .map_err(|e| corrupt_row("payments_for_order", e))?,
    })
}
