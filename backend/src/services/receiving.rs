//! Receiving service
//!
//! Creates and updates supplier receipts together with their batches as one
//! unit of work, and drives the receipt lifecycle
//! (draft -> received -> paid). A paid receipt is frozen: neither the
//! receipt nor any of its batches accepts further writes.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{InboundReceipt, ReceiptStatus, ReceiptWithBatches};
use crate::services::batch::BatchService;

/// Receiving service for supplier receipt and batch intake
#[derive(Clone)]
pub struct ReceivingService {
    db: PgPool,
}

/// Input for creating an inbound receipt
#[derive(Debug, Deserialize)]
pub struct CreateReceiptInput {
    pub supplier_id: Uuid,
    pub user_id: Uuid,
    pub total_price: Decimal,
    pub discount: Option<Decimal>,
    pub vat: Option<Decimal>,
}

/// One batch to receive as part of a receipt
#[derive(Debug, Deserialize)]
pub struct ReceiptBatchInput {
    pub product_unit_id: Uuid,
    pub quantity: i32,
    pub inbound_price: Decimal,
    pub discount: Option<Decimal>,
    pub expired_at: Option<NaiveDate>,
}

/// Input for updating an inbound receipt
///
/// Absent fields keep their stored values. `is_paid` present and true is
/// rejected outright: marking a receipt paid goes through
/// [`ReceivingService::mark_paid`], never through a field update.
#[derive(Debug, Deserialize)]
pub struct UpdateReceiptInput {
    pub supplier_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub total_price: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub vat: Option<Decimal>,
    pub is_paid: Option<bool>,
}

/// Correction to one existing batch of a receipt
#[derive(Debug, Deserialize)]
pub struct UpdateReceiptBatchInput {
    pub id: Uuid,
    pub inbound_price: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub inbound_quantity: Option<i32>,
    pub invent_quantity: Option<i32>,
    pub expired_at: Option<NaiveDate>,
}

/// Guard for writes against a stored receipt
///
/// A write is rejected when the stored receipt is already paid, or when the
/// incoming payload itself tries to set the paid flag.
pub fn ensure_receipt_mutable(
    stored_is_paid: bool,
    incoming_is_paid: Option<bool>,
) -> Result<(), &'static str> {
    if stored_is_paid || incoming_is_paid == Some(true) {
        return Err("Cannot modify a paid receipt");
    }
    Ok(())
}

type ReceiptRow = (
    Uuid,
    Uuid,
    Uuid,
    Decimal,
    Decimal,
    Decimal,
    bool,
    bool,
    chrono::DateTime<chrono::Utc>,
);

const RECEIPT_COLUMNS: &str =
    "id, supplier_id, user_id, total_price, discount, vat, is_received, is_paid, created_at";

fn map_receipt(row: ReceiptRow) -> InboundReceipt {
    InboundReceipt {
        id: row.0,
        supplier_id: row.1,
        user_id: row.2,
        total_price: row.3,
        discount: row.4,
        vat: row.5,
        is_received: row.6,
        is_paid: row.7,
        created_at: row.8,
    }
}

impl ReceivingService {
    /// Create a new ReceivingService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a receipt and all of its batches in one transaction
    pub async fn create_receipt_with_batches(
        &self,
        input: CreateReceiptInput,
        batches: Vec<ReceiptBatchInput>,
    ) -> AppResult<ReceiptWithBatches> {
        shared::validate_non_negative_amount(input.total_price)
            .map_err(|msg| AppError::validation("total_price", msg))?;

        Self::ensure_staff_exists(&self.db, input.user_id).await?;
        Self::ensure_supplier_exists(&self.db, input.supplier_id).await?;

        let mut tx = self.db.begin().await?;

        let receipt = sqlx::query_as::<_, ReceiptRow>(&format!(
            r#"
            INSERT INTO inbound_receipts (supplier_id, user_id, total_price, discount, vat)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {RECEIPT_COLUMNS}
            "#,
        ))
        .bind(input.supplier_id)
        .bind(input.user_id)
        .bind(input.total_price)
        .bind(input.discount.unwrap_or(Decimal::ZERO))
        .bind(input.vat.unwrap_or(Decimal::ZERO))
        .fetch_one(&mut *tx)
        .await?;
        let receipt = map_receipt(receipt);

        for batch in &batches {
            shared::validate_positive_quantity(batch.quantity)
                .map_err(|msg| AppError::validation("quantity", msg))?;
            shared::validate_non_negative_amount(batch.inbound_price)
                .map_err(|msg| AppError::validation("inbound_price", msg))?;

            let unit_exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM product_units WHERE id = $1 AND deleted_at IS NULL)",
            )
            .bind(batch.product_unit_id)
            .fetch_one(&mut *tx)
            .await?;

            if !unit_exists {
                return Err(AppError::NotFound("Product unit".to_string()));
            }

            sqlx::query(
                r#"
                INSERT INTO batches (receipt_id, product_unit_id, inbound_price, discount,
                                     inbound_quantity, invent_quantity, expired_at)
                VALUES ($1, $2, $3, $4, $5, $5, $6)
                "#,
            )
            .bind(receipt.id)
            .bind(batch.product_unit_id)
            .bind(batch.inbound_price)
            .bind(batch.discount.unwrap_or(Decimal::ZERO))
            .bind(batch.quantity)
            .bind(batch.expired_at)
            .execute(&mut *tx)
            .await?;
        }

        let stored_batches = BatchService::list_for_receipt_on(&mut *tx, receipt.id).await?;
        tx.commit().await?;

        tracing::info!(
            receipt_id = %receipt.id,
            supplier_id = %receipt.supplier_id,
            batches = stored_batches.len(),
            "created inbound receipt"
        );

        Ok(ReceiptWithBatches {
            receipt,
            batches: stored_batches,
        })
    }

    /// Update a receipt and correct its existing batches in one transaction
    ///
    /// This path never creates batches; every batch input must reference a
    /// batch already belonging to the receipt. Rejected entirely when the
    /// receipt is paid or the payload tries to set the paid flag.
    pub async fn update_receipt_with_batches(
        &self,
        receipt_id: Uuid,
        input: UpdateReceiptInput,
        batches: Vec<UpdateReceiptBatchInput>,
    ) -> AppResult<ReceiptWithBatches> {
        let mut tx = self.db.begin().await?;

        // Lock the receipt row so a concurrent mark_paid cannot slip between
        // the guard and the writes
        let existing = sqlx::query_as::<_, ReceiptRow>(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM inbound_receipts WHERE id = $1 FOR UPDATE",
        ))
        .bind(receipt_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Inbound receipt".to_string()))?;
        let existing = map_receipt(existing);

        ensure_receipt_mutable(existing.is_paid, input.is_paid)
            .map_err(|msg| AppError::conflict("receipt", msg))?;

        let supplier_id = input.supplier_id.unwrap_or(existing.supplier_id);
        let user_id = input.user_id.unwrap_or(existing.user_id);

        if supplier_id != existing.supplier_id {
            Self::ensure_supplier_exists_on(&mut *tx, supplier_id).await?;
        }
        if user_id != existing.user_id {
            Self::ensure_staff_exists_on(&mut *tx, user_id).await?;
        }

        let total_price = input.total_price.unwrap_or(existing.total_price);
        let discount = input.discount.unwrap_or(existing.discount);
        let vat = input.vat.unwrap_or(existing.vat);

        shared::validate_non_negative_amount(total_price)
            .map_err(|msg| AppError::validation("total_price", msg))?;

        let receipt = sqlx::query_as::<_, ReceiptRow>(&format!(
            r#"
            UPDATE inbound_receipts
            SET supplier_id = $1, user_id = $2, total_price = $3, discount = $4, vat = $5
            WHERE id = $6
            RETURNING {RECEIPT_COLUMNS}
            "#,
        ))
        .bind(supplier_id)
        .bind(user_id)
        .bind(total_price)
        .bind(discount)
        .bind(vat)
        .bind(receipt_id)
        .fetch_one(&mut *tx)
        .await?;
        let receipt = map_receipt(receipt);

        for batch in &batches {
            Self::update_batch_on(&mut tx, receipt_id, batch).await?;
        }

        let stored_batches = BatchService::list_for_receipt_on(&mut *tx, receipt_id).await?;
        tx.commit().await?;

        tracing::info!(receipt_id = %receipt_id, "updated inbound receipt");

        Ok(ReceiptWithBatches {
            receipt,
            batches: stored_batches,
        })
    }

    /// Mark a draft receipt as received
    pub async fn mark_received(&self, receipt_id: Uuid) -> AppResult<InboundReceipt> {
        self.transition(receipt_id, ReceiptStatus::Received).await
    }

    /// Mark a received receipt as paid; this is terminal and irreversible
    pub async fn mark_paid(&self, receipt_id: Uuid) -> AppResult<InboundReceipt> {
        self.transition(receipt_id, ReceiptStatus::Paid).await
    }

    async fn transition(
        &self,
        receipt_id: Uuid,
        next: ReceiptStatus,
    ) -> AppResult<InboundReceipt> {
        let mut tx = self.db.begin().await?;

        let existing = sqlx::query_as::<_, ReceiptRow>(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM inbound_receipts WHERE id = $1 FOR UPDATE",
        ))
        .bind(receipt_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Inbound receipt".to_string()))?;
        let existing = map_receipt(existing);

        let current = existing.status();
        if !current.can_transition_to(next) {
            return Err(AppError::InvalidStateTransition(format!(
                "Receipt is {} and cannot become {}",
                current, next
            )));
        }

        let receipt = sqlx::query_as::<_, ReceiptRow>(&format!(
            r#"
            UPDATE inbound_receipts
            SET is_received = is_received OR $2, is_paid = is_paid OR $3
            WHERE id = $1
            RETURNING {RECEIPT_COLUMNS}
            "#,
        ))
        .bind(receipt_id)
        .bind(next == ReceiptStatus::Received)
        .bind(next == ReceiptStatus::Paid)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(receipt_id = %receipt_id, status = %next, "receipt transitioned");

        Ok(map_receipt(receipt))
    }

    /// Get a receipt together with its batches
    pub async fn get_receipt_with_batches(
        &self,
        receipt_id: Uuid,
    ) -> AppResult<ReceiptWithBatches> {
        let mut conn = self.db.acquire().await?;

        let receipt = sqlx::query_as::<_, ReceiptRow>(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM inbound_receipts WHERE id = $1",
        ))
        .bind(receipt_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Inbound receipt".to_string()))?;

        let batches = BatchService::list_for_receipt_on(&mut *conn, receipt_id).await?;

        Ok(ReceiptWithBatches {
            receipt: map_receipt(receipt),
            batches,
        })
    }

    async fn update_batch_on(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        receipt_id: Uuid,
        input: &UpdateReceiptBatchInput,
    ) -> AppResult<()> {
        let existing = sqlx::query_as::<_, (i32, i32)>(
            "SELECT inbound_quantity, invent_quantity FROM batches \
             WHERE id = $1 AND receipt_id = $2 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(input.id)
        .bind(receipt_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;

        let inbound_quantity = input.inbound_quantity.unwrap_or(existing.0);
        let invent_quantity = input.invent_quantity.unwrap_or(existing.1);

        shared::validate_batch_quantities(inbound_quantity, invent_quantity)
            .map_err(|msg| AppError::validation("invent_quantity", msg))?;

        sqlx::query(
            r#"
            UPDATE batches
            SET inbound_price = COALESCE($3, inbound_price),
                discount = COALESCE($4, discount),
                inbound_quantity = $5,
                invent_quantity = $6,
                expired_at = COALESCE($7, expired_at)
            WHERE id = $1 AND receipt_id = $2
            "#,
        )
        .bind(input.id)
        .bind(receipt_id)
        .bind(input.inbound_price)
        .bind(input.discount)
        .bind(inbound_quantity)
        .bind(invent_quantity)
        .bind(input.expired_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn ensure_supplier_exists(db: &PgPool, supplier_id: Uuid) -> AppResult<()> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM suppliers WHERE id = $1)",
        )
        .bind(supplier_id)
        .fetch_one(db)
        .await?;

        if !exists {
            return Err(AppError::NotFound("Supplier".to_string()));
        }
        Ok(())
    }

    async fn ensure_staff_exists(db: &PgPool, user_id: Uuid) -> AppResult<()> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(db)
                .await?;

        if !exists {
            return Err(AppError::NotFound("User".to_string()));
        }
        Ok(())
    }

    async fn ensure_supplier_exists_on(
        conn: &mut PgConnection,
        supplier_id: Uuid,
    ) -> AppResult<()> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM suppliers WHERE id = $1)",
        )
        .bind(supplier_id)
        .fetch_one(&mut *conn)
        .await?;

        if !exists {
            return Err(AppError::NotFound("Supplier".to_string()));
        }
        Ok(())
    }

    async fn ensure_staff_exists_on(conn: &mut PgConnection, user_id: Uuid) -> AppResult<()> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&mut *conn)
                .await?;

        if !exists {
            return Err(AppError::NotFound("User".to_string()));
        }
        Ok(())
    }
}
