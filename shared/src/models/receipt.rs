//! Inbound receipt models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Batch;

/// A receiving event from one supplier performed by one staff user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundReceipt {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub user_id: Uuid,
    pub total_price: Decimal,
    pub discount: Decimal,
    pub vat: Decimal,
    pub is_received: bool,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
}

impl InboundReceipt {
    pub fn status(&self) -> ReceiptStatus {
        ReceiptStatus::from_flags(self.is_received, self.is_paid)
    }
}

/// A receipt together with its batches
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptWithBatches {
    #[serde(flatten)]
    pub receipt: InboundReceipt,
    pub batches: Vec<Batch>,
}

/// Lifecycle of an inbound receipt
///
/// Draft -> Received -> Paid. Paid is terminal: no field of the receipt or
/// any of its batches may be mutated afterward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Draft,
    Received,
    Paid,
}

impl ReceiptStatus {
    /// Derive the status from the stored flags
    pub fn from_flags(is_received: bool, is_paid: bool) -> Self {
        if is_paid {
            ReceiptStatus::Paid
        } else if is_received {
            ReceiptStatus::Received
        } else {
            ReceiptStatus::Draft
        }
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step
    pub fn can_transition_to(self, next: ReceiptStatus) -> bool {
        matches!(
            (self, next),
            (ReceiptStatus::Draft, ReceiptStatus::Received)
                | (ReceiptStatus::Received, ReceiptStatus::Paid)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ReceiptStatus::Paid
    }
}

impl std::fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReceiptStatus::Draft => write!(f, "draft"),
            ReceiptStatus::Received => write!(f, "received"),
            ReceiptStatus::Paid => write!(f, "paid"),
        }
    }
}
