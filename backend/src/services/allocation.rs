//! Stock allocation service
//!
//! Satisfies order demand from stock batches. Planning is a pure function
//! over batch snapshots (soonest-expiry-first, pre-checked against total
//! availability); execution runs the plan inside one transaction with the
//! candidate rows locked, so concurrent allocations cannot oversell.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Batch, OrderDetail};
use crate::services::batch::BatchService;

/// Allocation service for consuming batch stock on order creation
#[derive(Clone)]
pub struct AllocationService {
    db: PgPool,
}

/// Stock snapshot of one batch, as seen by the planner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchAvailability {
    pub batch_id: Uuid,
    pub invent_quantity: i32,
    pub expired_at: Option<NaiveDate>,
}

impl From<&Batch> for BatchAvailability {
    fn from(batch: &Batch) -> Self {
        Self {
            batch_id: batch.id,
            invent_quantity: batch.invent_quantity,
            expired_at: batch.expired_at,
        }
    }
}

/// One take from one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub batch_id: Uuid,
    pub amount: i32,
}

/// Input for allocating stock to an order line
#[derive(Debug, Deserialize)]
pub struct AllocateInput {
    pub order_id: Uuid,
    pub product_unit_id: Uuid,
    pub quantity: i32,
    /// When set, consume exactly this batch instead of auto-selecting
    pub batch_id: Option<Uuid>,
    /// Sale price override; defaults to the unit's catalog price
    pub current_price: Option<Decimal>,
}

/// Result of a successful allocation
#[derive(Debug, Clone, Serialize)]
pub struct AllocationOutcome {
    pub order_detail: OrderDetail,
    pub allocations: Vec<Allocation>,
}

/// Plan which batches satisfy `quantity`, soonest expiry first
///
/// The plan is computed against the snapshots only; nothing is mutated.
/// Availability is summed up front, so a shortfall fails before any take is
/// planned. Batches without an expiry date are spent last; ties break on
/// batch id for determinism.
pub fn plan_allocation(
    quantity: i32,
    batches: &[BatchAvailability],
) -> AppResult<Vec<Allocation>> {
    shared::validate_positive_quantity(quantity)
        .map_err(|msg| AppError::validation("quantity", msg))?;

    let available: i64 = batches
        .iter()
        .filter(|b| b.invent_quantity > 0)
        .map(|b| i64::from(b.invent_quantity))
        .sum();

    if available < i64::from(quantity) {
        return Err(AppError::InsufficientStock(format!(
            "Requested {} but only {} available across all batches",
            quantity, available
        )));
    }

    let mut candidates: Vec<&BatchAvailability> =
        batches.iter().filter(|b| b.invent_quantity > 0).collect();
    // FEFO: dated stock first, NULL expiry last
    candidates.sort_by_key(|b| (b.expired_at.is_none(), b.expired_at, b.batch_id));

    let mut plan = Vec::new();
    let mut remaining = quantity;
    for batch in candidates {
        if remaining == 0 {
            break;
        }
        let amount = remaining.min(batch.invent_quantity);
        plan.push(Allocation {
            batch_id: batch.batch_id,
            amount,
        });
        remaining -= amount;
    }

    debug_assert_eq!(remaining, 0);
    Ok(plan)
}

/// Plan a take against one explicitly chosen batch
pub fn plan_from_batch(quantity: i32, batch: &BatchAvailability) -> AppResult<Allocation> {
    shared::validate_positive_quantity(quantity)
        .map_err(|msg| AppError::validation("quantity", msg))?;

    if batch.invent_quantity < quantity {
        return Err(AppError::InsufficientStock(format!(
            "Requested {} exceeds batch stock of {}",
            quantity, batch.invent_quantity
        )));
    }

    Ok(Allocation {
        batch_id: batch.batch_id,
        amount: quantity,
    })
}

impl AllocationService {
    /// Create a new AllocationService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Allocate stock for one order line and record the order detail
    ///
    /// All-or-nothing: every batch decrement and the order detail insert
    /// commit together, or the transaction rolls back and stock is untouched.
    pub async fn allocate(&self, input: AllocateInput) -> AppResult<AllocationOutcome> {
        shared::validate_positive_quantity(input.quantity)
            .map_err(|msg| AppError::validation("quantity", msg))?;

        let mut tx = self.db.begin().await?;

        let order_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)",
        )
        .bind(input.order_id)
        .fetch_one(&mut *tx)
        .await?;

        if !order_exists {
            return Err(AppError::NotFound("Order".to_string()));
        }

        let unit_price = sqlx::query_scalar::<_, Decimal>(
            "SELECT price FROM product_units WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(input.product_unit_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product unit".to_string()))?;

        let plan = match input.batch_id {
            Some(batch_id) => {
                let batch = BatchService::lock_batch(&mut *tx, batch_id).await?;
                if batch.product_unit_id != input.product_unit_id {
                    return Err(AppError::NotFound("Batch".to_string()));
                }
                vec![plan_from_batch(input.quantity, &(&batch).into())?]
            }
            None => {
                let batches =
                    BatchService::lock_consumable_batches(&mut *tx, input.product_unit_id)
                        .await?;
                let availability: Vec<BatchAvailability> =
                    batches.iter().map(Into::into).collect();
                plan_allocation(input.quantity, &availability)?
            }
        };

        for allocation in &plan {
            BatchService::decrement_on(&mut *tx, allocation.batch_id, allocation.amount)
                .await?;
        }

        // Only a single-batch fulfillment pins the order line to a batch
        let batch_ref = match plan.as_slice() {
            [only] => Some(only.batch_id),
            _ => None,
        };

        let current_price = input.current_price.unwrap_or(unit_price);

        let detail = sqlx::query_as::<_, (Uuid, Uuid, Uuid, Option<Uuid>, i32, Decimal, chrono::DateTime<chrono::Utc>)>(
            r#"
            INSERT INTO order_details (order_id, product_unit_id, batch_id, quantity, current_price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, order_id, product_unit_id, batch_id, quantity, current_price, created_at
            "#,
        )
        .bind(input.order_id)
        .bind(input.product_unit_id)
        .bind(batch_ref)
        .bind(input.quantity)
        .bind(current_price)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %input.order_id,
            unit_id = %input.product_unit_id,
            quantity = input.quantity,
            batches = plan.len(),
            "allocated stock for order line"
        );

        Ok(AllocationOutcome {
            order_detail: OrderDetail {
                id: detail.0,
                order_id: detail.1,
                product_unit_id: detail.2,
                batch_id: detail.3,
                quantity: detail.4,
                current_price: detail.5,
                created_at: detail.6,
            },
            allocations: plan,
        })
    }
}
