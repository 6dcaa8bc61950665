//! Receipt sequencing and the order ledger on Postgres.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Postgres, Row, Transaction};
use tracing::instrument;

use printdesk_core::{
    ClientId, EngineError, EngineResult, Length, Money, OrderId,
};
use printdesk_orders::{
    CostComponent, LineItem, MaterialPolicy, NewOrder, Order, OrderLedger, OrderStatus,
    ReceiptNumber, ReceiptSequencer, WorkType, order_total, required_material_length,
};
use printdesk_payments::{NewPayment, PaymentStatus};
use printdesk_rolls::{AllocationRequest, MaterialType};

use super::payments::record_payment_tx;
use super::rolls::{allocate_fifo_tx, allocate_from_roll_tx};
use super::{PostgresEngine, corrupt_row, map_sqlx_error};

fn order_not_found(order_id: OrderId) -> EngineError {
    EngineError::not_found(format!("order {order_id}"))
}

#[async_trait]
impl ReceiptSequencer for PostgresEngine {
    /// One atomic upsert-increment per day bucket; the database serializes
    /// concurrent callers, so no two receipts of the same day collide.
    async fn next(&self, date: NaiveDate) -> EngineResult<ReceiptNumber> {
        self.run("next_receipt", || async {
            let prefix = ReceiptNumber::day_prefix(date);
            let row = sqlx::query(
                r#"
                INSERT INTO receipt_counters (day_prefix, last_seq)
                VALUES ($1, 1)
                ON CONFLICT (day_prefix)
                DO UPDATE SET last_seq = receipt_counters.last_seq + 1
                RETURNING last_seq
                "#,
            )
            .bind(&prefix)
            .fetch_one(self.pool())
            .await
            .map_err(|e| map_sqlx_error("next_receipt", e))?;

            let seq: i32 = row
                .try_get("last_seq")
                .map_err(|e| corrupt_row("next_receipt", e))?;
            ReceiptNumber::compose(date, seq as u32)
        })
        .await
    }
}

async fn insert_items_tx(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
    items: &[LineItem],
) -> EngineResult<()> {
    for (index, item) in items.iter().enumerate() {
        let component = |c: &Option<CostComponent>| {
            (
                c.as_ref().map(|c| c.quantity as i32),
                c.as_ref().map(|c| c.unit_cost.hundredths()),
            )
        };
        let (print_qty, print_unit_cost) = component(&item.print);
        let (pressing_qty, pressing_unit_cost) = component(&item.pressing);
        let (badge_qty, badge_unit_cost) = component(&item.badge);

        sqlx::query(
            r#"
            INSERT INTO order_items
                (order_id, line_no, description, print_qty, print_unit_cost,
                 pressing_qty, pressing_unit_cost, badge_qty, badge_unit_cost,
                 material_length)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind((index + 1) as i32)
        .bind(&item.description)
        .bind(print_qty)
        .bind(print_unit_cost)
        .bind(pressing_qty)
        .bind(pressing_unit_cost)
        .bind(badge_qty)
        .bind(badge_unit_cost)
        .bind(item.material_length.map(|l| l.hundredths()))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_items", e))?;
    }
    Ok(())
}

async fn fetch_items<'e, E>(executor: E, order_id: OrderId) -> EngineResult<Vec<LineItem>>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        SELECT description, print_qty, print_unit_cost, pressing_qty,
               pressing_unit_cost, badge_qty, badge_unit_cost, material_length
        FROM order_items
        WHERE order_id = $1
        ORDER BY line_no ASC
        "#,
    )
    .bind(order_id.as_uuid())
    .fetch_all(executor)
    .await
    .map_err(|e| map_sqlx_error("fetch_items", e))?;

    rows.iter().map(item_from_row).collect()
}

fn item_from_row(row: &sqlx::postgres::PgRow) -> EngineResult<LineItem> {
    let component = |qty_col: &str, cost_col: &str| -> EngineResult<Option<CostComponent>> {
        let quantity: Option<i32> = row
            .try_get(qty_col)
            .map_err(|e| corrupt_row("fetch_items", e))?;
        let unit_cost: Option<i64> = row
            .try_get(cost_col)
            .map_err(|e| corrupt_row("fetch_items", e))?;
        Ok(match (quantity, unit_cost) {
            (Some(quantity), Some(unit_cost)) => Some(CostComponent {
                quantity: quantity as u32,
                unit_cost: Money::from_hundredths(unit_cost),
            }),
            _ => None,
        })
    };

    Ok(LineItem {
        description: row
            .try_get("description")
            .map_err(|e| corrupt_row("fetch_items", e))?,
        print: component("print_qty", "print_unit_cost")?,
        pressing: component("pressing_qty", "pressing_unit_cost")?,
        badge: component("badge_qty", "badge_unit_cost")?,
        material_length: row
            .try_get::<Option<i64>, _>("material_length")
            .map_err(|e| corrupt_row("fetch_items", e))?
            .map(Length::from_hundredths),
    })
}

fn order_from_row(row: &sqlx::postgres::PgRow, items: Vec<LineItem>) -> EngineResult<Order> {
    let payment_status: String = row
        .try_get("payment_status")
        .map_err(|e| corrupt_row("fetch_order", e))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| corrupt_row("fetch_order", e))?;
    let receipt_number: String = row
        .try_get("receipt_number")
        .map_err(|e| corrupt_row("fetch_order", e))?;
    let work_type: String = row
        .try_get("work_type")
        .map_err(|e| corrupt_row("fetch_order", e))?;

    Ok(Order {
        id: OrderId::from_uuid(
            row.try_get("order_id")
                .map_err(|e| corrupt_row("fetch_order", e))?,
        ),
        receipt_number: ReceiptNumber::parse(&receipt_number)
            .map_err(|e| corrupt_row("fetch_order", e))?,
        client_id: ClientId::from_uuid(
            row.try_get("client_id")
                .map_err(|e| corrupt_row("fetch_order", e))?,
        ),
        client_name: row
            .try_get("client_name")
            .map_err(|e| corrupt_row("fetch_order", e))?,
        work_type: WorkType::new(&work_type).map_err(|e| corrupt_row("fetch_order", e))?,
        items,
        total: Money::from_hundredths(
            row.try_get("total")
                .map_err(|e| corrupt_row("fetch_order", e))?,
        ),
        amount_paid: Money::from_hundredths(
            row.try_get("amount_paid")
                .map_err(|e| corrupt_row("fetch_order", e))?,
        ),
        payment_status: PaymentStatus::parse(&payment_status)
            .ok_or_else(|| corrupt_row("fetch_order", &payment_status))?,
        status: OrderStatus::parse(&status).ok_or_else(|| corrupt_row("fetch_order", &status))?,
        notes: row
            .try_get("notes")
            .map_err(|e| corrupt_row("fetch_order", e))?,
        created_by: row
            .try_get("created_by")
            .map_err(|e| corrupt_row("fetch_order", e))?,
        created_at: row
            .try_get::<DateTime<Utc>, _>("created_at")
            .map_err(|e| corrupt_row("fetch_order", e))?,
        updated_at: row
            .try_get::<DateTime<Utc>, _>("updated_at")
            .map_err(|e| corrupt_row("fetch_order", e))?,
    })
}

const SELECT_ORDER: &str = r#"
    SELECT order_id, receipt_number, client_id, client_name, work_type,
           total, amount_paid, payment_status, status, notes, created_by,
           created_at, updated_at
    FROM orders
"#;

impl PostgresEngine {
    async fn fetch_order(&self, order_id: OrderId) -> EngineResult<Order> {
        let row = sqlx::query(&format!("{SELECT_ORDER} WHERE order_id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| map_sqlx_error("fetch_order", e))?
            .ok_or_else(|| order_not_found(order_id))?;

        let items = fetch_items(self.pool(), order_id).await?;
        order_from_row(&row, items)
    }

    async fn create_order_once(
        &self,
        new_order: &NewOrder,
        receipt_number: &ReceiptNumber,
        total: Money,
        required: Length,
    ) -> EngineResult<OrderId> {
        let order_id = OrderId::new();
        let now = Utc::now();
        let policy = self.policies().for_work_type(&new_order.work_type).clone();

        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| map_sqlx_error("create_order", e))?;

        sqlx::query(
            r#"
            INSERT INTO orders
                (order_id, receipt_number, client_id, client_name, work_type,
                 total, amount_paid, payment_status, status, notes, created_by,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, $9, $10, $11, $11)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(receipt_number.as_str())
        .bind(new_order.client_id.as_uuid())
        .bind(&new_order.client_name)
        .bind(new_order.work_type.as_str())
        .bind(total.hundredths())
        .bind(PaymentStatus::Pending.as_str())
        .bind(OrderStatus::Active.as_str())
        .bind(new_order.notes.as_deref())
        .bind(&new_order.created_by)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_order", e))?;

        insert_items_tx(&mut tx, order_id, &new_order.items).await?;

        if !required.is_zero() {
            let request_for = |material_type: &MaterialType| AllocationRequest {
                material_type: material_type.clone(),
                required_length: required,
                order_id: Some(order_id),
                recorded_by: new_order.created_by.clone(),
                notes: Some(format!("order {receipt_number}")),
            };
            match &policy {
                MaterialPolicy::None => {}
                MaterialPolicy::Fifo { material_type } => {
                    allocate_fifo_tx(&mut tx, &request_for(material_type)).await?;
                }
                MaterialPolicy::Operator { material_type } => {
                    let roll_number = new_order.requested_roll.ok_or_else(|| {
                        EngineError::validation(format!(
                            "work type {} requires an explicit roll selection",
                            new_order.work_type
                        ))
                    })?;
                    allocate_from_roll_tx(&mut tx, roll_number, &request_for(material_type))
                        .await?;
                }
            }
        }

        if new_order.mark_paid && total > Money::ZERO {
            let method = new_order
                .initial_payment_method
                .ok_or_else(|| EngineError::validation("initial_payment_method is required"))?;
            record_payment_tx(
                &mut tx,
                &NewPayment {
                    order_id,
                    amount: total,
                    method,
                    bank: None,
                    receipt_reference: None,
                    notes: None,
                    recorded_by: new_order.created_by.clone(),
                },
            )
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("create_order", e))?;
        Ok(order_id)
    }
}

#[async_trait]
impl OrderLedger for PostgresEngine {
    #[instrument(skip(self, new_order), fields(work_type = %new_order.work_type, client = %new_order.client_name))]
    async fn create_order(&self, new_order: NewOrder) -> EngineResult<Order> {
        new_order.validate()?;
        let total = order_total(&new_order.items)?;
        let required = required_material_length(&new_order.items)?;

        // The receipt commits independently; a creation that fails past this
        // point abandons its number (gaps are acceptable, duplicates never).
        let receipt_number = self.next(Utc::now().date_naive()).await?;

        let order_id = self
            .run("create_order", || {
                self.create_order_once(&new_order, &receipt_number, total, required)
            })
            .await?;
        self.fetch_order(order_id).await
    }

    async fn get_order(&self, order_id: OrderId) -> EngineResult<Order> {
        self.run("get_order", || self.fetch_order(order_id)).await
    }

    async fn list_orders(&self) -> EngineResult<Vec<Order>> {
        self.run("list_orders", || async {
            let rows = sqlx::query(&format!("{SELECT_ORDER} ORDER BY created_at DESC"))
                .fetch_all(self.pool())
                .await
                .map_err(|e| map_sqlx_error("list_orders", e))?;

            let mut orders = Vec::with_capacity(rows.len());
            for row in &rows {
                let mut order = order_from_row(row, Vec::new())?;
                order.items = fetch_items(self.pool(), order.id).await?;
                orders.push(order);
            }
            Ok(orders)
        })
        .await
    }

    async fn update_items(&self, order_id: OrderId, items: Vec<LineItem>) -> EngineResult<Order> {
        if items.is_empty() {
            return Err(EngineError::validation("order needs at least one line item"));
        }
        for item in &items {
            item.validate()?;
        }
        let total = order_total(&items)?;

        self.run("update_items", || async {
            let mut tx = self
                .pool()
                .begin()
                .await
                .map_err(|e| map_sqlx_error("update_items", e))?;

            let status = lock_order_status_tx(&mut tx, order_id).await?;
            if status != OrderStatus::Active {
                return Err(EngineError::validation(format!(
                    "only active orders can be edited (order is {})",
                    status.as_str()
                )));
            }

            sqlx::query("DELETE FROM order_items WHERE order_id = $1")
                .bind(order_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("update_items", e))?;
            insert_items_tx(&mut tx, order_id, &items).await?;

            // Total follows the items; amount_paid/payment_status stay
            // untouched (reconciler-owned).
            sqlx::query("UPDATE orders SET total = $2, updated_at = $3 WHERE order_id = $1")
                .bind(order_id.as_uuid())
                .bind(total.hundredths())
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("update_items", e))?;

            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("update_items", e))?;
            Ok(())
        })
        .await?;

        self.fetch_order(order_id).await
    }

    async fn complete_order(&self, order_id: OrderId) -> EngineResult<Order> {
        self.transition_order(order_id, OrderStatus::Completed, "completed")
            .await
    }

    async fn cancel_order(&self, order_id: OrderId) -> EngineResult<Order> {
        self.transition_order(order_id, OrderStatus::Cancelled, "cancelled")
            .await
    }
}

impl PostgresEngine {
    async fn transition_order(
        &self,
        order_id: OrderId,
        to: OrderStatus,
        verb: &str,
    ) -> EngineResult<Order> {
        self.run("transition_order", || async {
            let mut tx = self
                .pool()
                .begin()
                .await
                .map_err(|e| map_sqlx_error("transition_order", e))?;

            let status = lock_order_status_tx(&mut tx, order_id).await?;
            if status != OrderStatus::Active {
                return Err(EngineError::validation(format!(
                    "only active orders can be {verb} (order is {})",
                    status.as_str()
                )));
            }

            sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE order_id = $1")
                .bind(order_id.as_uuid())
                .bind(to.as_str())
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("transition_order", e))?;

            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("transition_order", e))?;
            Ok(())
        })
        .await?;

        self.fetch_order(order_id).await
    }
}

async fn lock_order_status_tx(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
) -> EngineResult<OrderStatus> {
    let (_total, status) = super::payments::lock_order_tx(tx, order_id).await?;
    Ok(status)
}
