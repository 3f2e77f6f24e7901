//! Stock batch models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A lot of received stock for one product unit
///
/// Invariant: `0 <= invent_quantity <= inbound_quantity` at all times.
/// `inbound_quantity` is the received total and never changes after the
/// owning receipt is paid; `invent_quantity` is what remains on the shelf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub receipt_id: Uuid,
    pub product_unit_id: Uuid,
    pub inbound_price: Decimal,
    pub discount: Decimal,
    pub inbound_quantity: i32,
    pub invent_quantity: i32,
    pub expired_at: Option<NaiveDate>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Batch {
    /// Whether this batch can still satisfy order demand
    pub fn is_consumable(&self) -> bool {
        self.deleted_at.is_none() && self.invent_quantity > 0
    }
}

/// Check the batch quantity invariant for a pair of values about to be stored
pub fn validate_batch_quantities(
    inbound_quantity: i32,
    invent_quantity: i32,
) -> Result<(), &'static str> {
    if inbound_quantity <= 0 {
        return Err("Inbound quantity must be positive");
    }
    if invent_quantity < 0 {
        return Err("Remaining quantity cannot be negative");
    }
    if invent_quantity > inbound_quantity {
        return Err("Remaining quantity cannot exceed inbound quantity");
    }
    Ok(())
}
