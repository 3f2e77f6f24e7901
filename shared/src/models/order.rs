//! Order models
//!
//! The stock core only creates `OrderDetail` rows (the allocation trigger);
//! the enclosing order workflow lives outside it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A customer order header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A line item linking an order to a product unit
///
/// `batch_id` is set only when the whole line was satisfied from a single
/// batch; multi-batch allocations leave it empty and are reconstructed from
/// the batch ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_unit_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub quantity: i32,
    /// Unit price captured at sale time
    pub current_price: Decimal,
    pub created_at: DateTime<Utc>,
}
