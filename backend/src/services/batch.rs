//! Batch ledger service
//!
//! Owns batch rows: creation, conditional decrement, and lookup of
//! consumable batches for a product unit. Batches are created only through
//! receiving and decremented only through allocation.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Batch;
use crate::services::receiving::ensure_receipt_mutable;

/// Batch service for managing the stock batch ledger
#[derive(Clone)]
pub struct BatchService {
    db: PgPool,
}

/// Input for creating a batch
#[derive(Debug, Deserialize)]
pub struct CreateBatchInput {
    pub receipt_id: Uuid,
    pub product_unit_id: Uuid,
    pub quantity: i32,
    pub inbound_price: Decimal,
    pub discount: Option<Decimal>,
    pub expired_at: Option<NaiveDate>,
}

type BatchRow = (
    Uuid,
    Uuid,
    Uuid,
    Decimal,
    Decimal,
    i32,
    i32,
    Option<NaiveDate>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

const BATCH_COLUMNS: &str = "id, receipt_id, product_unit_id, inbound_price, discount, \
     inbound_quantity, invent_quantity, expired_at, deleted_at, created_at";

fn map_batch(row: BatchRow) -> Batch {
    Batch {
        id: row.0,
        receipt_id: row.1,
        product_unit_id: row.2,
        inbound_price: row.3,
        discount: row.4,
        inbound_quantity: row.5,
        invent_quantity: row.6,
        expired_at: row.7,
        deleted_at: row.8,
        created_at: row.9,
    }
}

impl BatchService {
    /// Create a new BatchService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a batch with `invent_quantity = inbound_quantity = quantity`
    pub async fn create_batch(&self, input: CreateBatchInput) -> AppResult<Batch> {
        shared::validate_positive_quantity(input.quantity).map_err(|msg| {
            AppError::validation("quantity", msg)
        })?;
        shared::validate_non_negative_amount(input.inbound_price)
            .map_err(|msg| AppError::validation("inbound_price", msg))?;

        let mut tx = self.db.begin().await?;

        // Lock the receipt row so a concurrent payment cannot land between
        // the paid check and the insert
        let is_paid = sqlx::query_scalar::<_, bool>(
            "SELECT is_paid FROM inbound_receipts WHERE id = $1 FOR UPDATE",
        )
        .bind(input.receipt_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Inbound receipt".to_string()))?;

        ensure_receipt_mutable(is_paid, None)
            .map_err(|_| AppError::conflict("receipt", "Cannot add batches to a paid receipt"))?;

        let unit_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM product_units WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(input.product_unit_id)
        .fetch_one(&mut *tx)
        .await?;

        if !unit_exists {
            return Err(AppError::NotFound("Product unit".to_string()));
        }

        let discount = input.discount.unwrap_or(Decimal::ZERO);

        let row = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            INSERT INTO batches (receipt_id, product_unit_id, inbound_price, discount,
                                 inbound_quantity, invent_quantity, expired_at)
            VALUES ($1, $2, $3, $4, $5, $5, $6)
            RETURNING {BATCH_COLUMNS}
            "#,
        ))
        .bind(input.receipt_id)
        .bind(input.product_unit_id)
        .bind(input.inbound_price)
        .bind(discount)
        .bind(input.quantity)
        .bind(input.expired_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(map_batch(row))
    }

    /// Get a batch by ID
    pub async fn get_batch(&self, batch_id: Uuid) -> AppResult<Batch> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1 AND deleted_at IS NULL",
        ))
        .bind(batch_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;

        Ok(map_batch(row))
    }

    /// All non-deleted batches of a unit with stock remaining, soonest expiry first
    ///
    /// Batches without an expiry date sort last: dated stock is spent before
    /// non-perishable stock.
    pub async fn find_consumable_batches(&self, unit_id: Uuid) -> AppResult<Vec<Batch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            SELECT {BATCH_COLUMNS}
            FROM batches
            WHERE product_unit_id = $1 AND deleted_at IS NULL AND invent_quantity > 0
            ORDER BY expired_at ASC NULLS LAST, id ASC
            "#,
        ))
        .bind(unit_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(map_batch).collect())
    }

    /// Same as [`find_consumable_batches`], but inside a transaction with the
    /// rows locked for the remainder of it
    ///
    /// [`find_consumable_batches`]: BatchService::find_consumable_batches
    pub(crate) async fn lock_consumable_batches(
        conn: &mut PgConnection,
        unit_id: Uuid,
    ) -> AppResult<Vec<Batch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            SELECT {BATCH_COLUMNS}
            FROM batches
            WHERE product_unit_id = $1 AND deleted_at IS NULL AND invent_quantity > 0
            ORDER BY expired_at ASC NULLS LAST, id ASC
            FOR UPDATE
            "#,
        ))
        .bind(unit_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(map_batch).collect())
    }

    /// Lock a single batch row for the remainder of the transaction
    pub(crate) async fn lock_batch(
        conn: &mut PgConnection,
        batch_id: Uuid,
    ) -> AppResult<Batch> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches \
             WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        ))
        .bind(batch_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;

        Ok(map_batch(row))
    }

    /// Atomically reduce a batch's remaining quantity
    ///
    /// The decrement is conditional on `invent_quantity >= amount`, so the
    /// result can never go negative even when two allocations race.
    pub async fn decrement(&self, batch_id: Uuid, amount: i32) -> AppResult<Batch> {
        let mut tx = self.db.begin().await?;
        let batch = Self::decrement_on(&mut *tx, batch_id, amount).await?;
        tx.commit().await?;
        Ok(batch)
    }

    /// Transaction-scoped variant of [`decrement`](BatchService::decrement)
    pub(crate) async fn decrement_on(
        conn: &mut PgConnection,
        batch_id: Uuid,
        amount: i32,
    ) -> AppResult<Batch> {
        shared::validate_positive_quantity(amount)
            .map_err(|msg| AppError::validation("amount", msg))?;

        let row = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            UPDATE batches
            SET invent_quantity = invent_quantity - $2
            WHERE id = $1 AND deleted_at IS NULL AND invent_quantity >= $2
            RETURNING {BATCH_COLUMNS}
            "#,
        ))
        .bind(batch_id)
        .bind(amount)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(map_batch(row)),
            None => {
                // Either the batch is gone or the stock check failed
                let remaining = sqlx::query_scalar::<_, i32>(
                    "SELECT invent_quantity FROM batches WHERE id = $1 AND deleted_at IS NULL",
                )
                .bind(batch_id)
                .fetch_optional(&mut *conn)
                .await?;

                match remaining {
                    Some(remaining) => Err(AppError::InsufficientStock(format!(
                        "Requested {} but batch has {} remaining",
                        amount, remaining
                    ))),
                    None => Err(AppError::NotFound("Batch".to_string())),
                }
            }
        }
    }

    /// All batches belonging to a receipt, including exhausted ones
    pub(crate) async fn list_for_receipt_on(
        conn: &mut PgConnection,
        receipt_id: Uuid,
    ) -> AppResult<Vec<Batch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            SELECT {BATCH_COLUMNS}
            FROM batches
            WHERE receipt_id = $1 AND deleted_at IS NULL
            ORDER BY created_at ASC, id ASC
            "#,
        ))
        .bind(receipt_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(map_batch).collect())
    }
}
