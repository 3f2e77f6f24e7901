//! Product catalog models
//!
//! A `ProductSample` is the named catalog entry; its sellable variants are
//! `ProductUnit`s (specific packaging/measure). Batches and order details
//! reference units by id, never the other way around.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A catalog grouping for product samples (e.g. "Beverages")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductLine {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A unit of measure referenced by product units (e.g. "bottle", "crate")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitOfMeasure {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A named catalog entry owning a set of sellable unit variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSample {
    pub id: Uuid,
    pub product_line_id: Uuid,
    /// Unique across all samples
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A sellable variant of a product sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductUnit {
    pub id: Uuid,
    pub sample_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub unit_of_measure_id: Uuid,
    /// How many base units one of this variant represents
    pub conversion_rate: Decimal,
    pub image_url: Option<String>,
    pub volume: Option<Decimal>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A sample together with its unit variants
#[derive(Debug, Clone, Serialize)]
pub struct SampleWithUnits {
    #[serde(flatten)]
    pub sample: ProductSample,
    pub units: Vec<ProductUnit>,
}
