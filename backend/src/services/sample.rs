//! Product sample service
//!
//! Applies changes to a sample and its whole set of unit variants as one
//! all-or-nothing aggregate write. The variant set is reconciled through a
//! pure diff (remove absent, update present, create new) before any row is
//! touched.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{ProductSample, ProductUnit, SampleWithUnits};

/// Sample service for catalog aggregate updates
#[derive(Clone)]
pub struct SampleService {
    db: PgPool,
}

/// Input for creating a product sample
#[derive(Debug, Deserialize)]
pub struct CreateSampleInput {
    pub product_line_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Input for updating a product sample
#[derive(Debug, Deserialize)]
pub struct UpdateSampleInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub product_line_id: Option<Uuid>,
}

/// One unit variant in an aggregate payload
///
/// A present `id` updates that existing variant; an absent `id` creates a
/// new one. Variants of the sample missing from the payload are removed.
#[derive(Debug, Deserialize)]
pub struct SampleUnitInput {
    pub id: Option<Uuid>,
    pub name: String,
    pub price: Decimal,
    pub unit_of_measure_id: Uuid,
    pub conversion_rate: Decimal,
    pub image_url: Option<String>,
    pub volume: Option<Decimal>,
}

/// How an incoming variant payload reconciles against the stored set
///
/// `to_update` pairs a payload index with the stored variant id it targets;
/// `to_create` indexes id-less payload entries; `to_remove` holds ids of
/// stored variants absent from the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSetDiff {
    pub to_remove: Vec<Uuid>,
    pub to_update: Vec<(usize, Uuid)>,
    pub to_create: Vec<usize>,
}

/// Reconcile the incoming variant payload against the stored variant ids
pub fn diff_unit_set(
    existing_ids: &[Uuid],
    incoming: &[SampleUnitInput],
) -> Result<UnitSetDiff, DiffError> {
    let mut seen = Vec::new();
    let mut to_update = Vec::new();
    let mut to_create = Vec::new();

    for (idx, unit) in incoming.iter().enumerate() {
        match unit.id {
            Some(id) => {
                if !existing_ids.contains(&id) {
                    return Err(DiffError::UnknownUnit(id));
                }
                if seen.contains(&id) {
                    return Err(DiffError::DuplicateUnit(id));
                }
                seen.push(id);
                to_update.push((idx, id));
            }
            None => to_create.push(idx),
        }
    }

    let to_remove = existing_ids
        .iter()
        .copied()
        .filter(|id| !seen.contains(id))
        .collect();

    Ok(UnitSetDiff {
        to_remove,
        to_update,
        to_create,
    })
}

/// Failure while reconciling a variant payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffError {
    /// Payload references a variant that does not belong to the sample
    UnknownUnit(Uuid),
    /// Payload references the same variant twice
    DuplicateUnit(Uuid),
}

impl From<DiffError> for AppError {
    fn from(err: DiffError) -> Self {
        match err {
            DiffError::UnknownUnit(_) => AppError::NotFound("Product unit".to_string()),
            DiffError::DuplicateUnit(id) => {
                AppError::validation("units", format!("Unit {} appears more than once", id))
            }
        }
    }
}

type SampleRow = (
    Uuid,
    Uuid,
    String,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const SAMPLE_COLUMNS: &str =
    "id, product_line_id, name, description, created_at, updated_at";

fn map_sample(row: SampleRow) -> ProductSample {
    ProductSample {
        id: row.0,
        product_line_id: row.1,
        name: row.2,
        description: row.3,
        created_at: row.4,
        updated_at: row.5,
    }
}

type UnitRow = (
    Uuid,
    Uuid,
    String,
    Decimal,
    Uuid,
    Decimal,
    Option<String>,
    Option<Decimal>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const UNIT_COLUMNS: &str = "id, sample_id, name, price, unit_of_measure_id, conversion_rate, \
     image_url, volume, deleted_at, created_at, updated_at";

fn map_unit(row: UnitRow) -> ProductUnit {
    ProductUnit {
        id: row.0,
        sample_id: row.1,
        name: row.2,
        price: row.3,
        unit_of_measure_id: row.4,
        conversion_rate: row.5,
        image_url: row.6,
        volume: row.7,
        deleted_at: row.8,
        created_at: row.9,
        updated_at: row.10,
    }
}

impl SampleService {
    /// Create a new SampleService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a sample and its initial unit variants in one transaction
    pub async fn create_sample_with_units(
        &self,
        input: CreateSampleInput,
        units: Vec<SampleUnitInput>,
    ) -> AppResult<SampleWithUnits> {
        shared::validate_entity_name(&input.name)
            .map_err(|msg| AppError::validation("name", msg))?;

        let name_taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM product_samples WHERE name = $1)",
        )
        .bind(input.name.trim())
        .fetch_one(&self.db)
        .await?;

        if name_taken {
            return Err(AppError::DuplicateEntry("name".to_string()));
        }

        let line_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM product_lines WHERE id = $1)",
        )
        .bind(input.product_line_id)
        .fetch_one(&self.db)
        .await?;

        if !line_exists {
            return Err(AppError::NotFound("Product line".to_string()));
        }

        let mut tx = self.db.begin().await?;

        let sample = sqlx::query_as::<_, SampleRow>(&format!(
            r#"
            INSERT INTO product_samples (product_line_id, name, description)
            VALUES ($1, $2, $3)
            RETURNING {SAMPLE_COLUMNS}
            "#,
        ))
        .bind(input.product_line_id)
        .bind(input.name.trim())
        .bind(&input.description)
        .fetch_one(&mut *tx)
        .await?;
        let sample = map_sample(sample);

        for unit in &units {
            Self::insert_unit_on(&mut *tx, sample.id, unit).await?;
        }

        let units = Self::list_units_on(&mut *tx, sample.id).await?;
        tx.commit().await?;

        tracing::info!(sample_id = %sample.id, units = units.len(), "created product sample");

        Ok(SampleWithUnits { sample, units })
    }

    /// Update a sample and replace its unit variant set in one transaction
    ///
    /// The root row is loaded under lock inside the transaction, so a sample
    /// removed concurrently is an ordinary not-found and the aggregate
    /// cannot change shape mid-update. Any failure rolls everything back.
    pub async fn update_sample_and_units(
        &self,
        sample_id: Uuid,
        input: UpdateSampleInput,
        units: Vec<SampleUnitInput>,
    ) -> AppResult<SampleWithUnits> {
        let mut tx = self.db.begin().await?;

        let existing = sqlx::query_as::<_, SampleRow>(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM product_samples WHERE id = $1 FOR UPDATE",
        ))
        .bind(sample_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product sample".to_string()))?;
        let existing = map_sample(existing);

        let name = match input.name {
            Some(name) => {
                shared::validate_entity_name(&name)
                    .map_err(|msg| AppError::validation("name", msg))?;
                name.trim().to_string()
            }
            None => existing.name.clone(),
        };
        let description = input.description.or(existing.description.clone());
        let product_line_id = input.product_line_id.unwrap_or(existing.product_line_id);

        if name != existing.name {
            let name_taken = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM product_samples WHERE name = $1 AND id <> $2)",
            )
            .bind(&name)
            .bind(sample_id)
            .fetch_one(&mut *tx)
            .await?;

            if name_taken {
                return Err(AppError::DuplicateEntry("name".to_string()));
            }
        }

        if product_line_id != existing.product_line_id {
            let line_exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM product_lines WHERE id = $1)",
            )
            .bind(product_line_id)
            .fetch_one(&mut *tx)
            .await?;

            if !line_exists {
                return Err(AppError::NotFound("Product line".to_string()));
            }
        }

        let existing_unit_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM product_units \
             WHERE sample_id = $1 AND deleted_at IS NULL ORDER BY id FOR UPDATE",
        )
        .bind(sample_id)
        .fetch_all(&mut *tx)
        .await?;

        let diff = diff_unit_set(&existing_unit_ids, &units).map_err(AppError::from)?;

        if !diff.to_remove.is_empty() {
            sqlx::query("UPDATE product_units SET deleted_at = NOW() WHERE id = ANY($1)")
                .bind(&diff.to_remove)
                .execute(&mut *tx)
                .await?;
        }

        for (idx, unit_id) in &diff.to_update {
            let unit = &units[*idx];
            Self::validate_unit_input(&mut *tx, unit).await?;

            sqlx::query(
                r#"
                UPDATE product_units
                SET name = $2, price = $3, unit_of_measure_id = $4, conversion_rate = $5,
                    image_url = $6, volume = $7, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(unit_id)
            .bind(unit.name.trim())
            .bind(unit.price)
            .bind(unit.unit_of_measure_id)
            .bind(unit.conversion_rate)
            .bind(&unit.image_url)
            .bind(unit.volume)
            .execute(&mut *tx)
            .await?;
        }

        for idx in &diff.to_create {
            Self::insert_unit_on(&mut *tx, sample_id, &units[*idx]).await?;
        }

        let sample = sqlx::query_as::<_, SampleRow>(&format!(
            r#"
            UPDATE product_samples
            SET name = $2, description = $3, product_line_id = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {SAMPLE_COLUMNS}
            "#,
        ))
        .bind(sample_id)
        .bind(&name)
        .bind(&description)
        .bind(product_line_id)
        .fetch_one(&mut *tx)
        .await?;
        let sample = map_sample(sample);

        let stored_units = Self::list_units_on(&mut *tx, sample_id).await?;
        tx.commit().await?;

        tracing::info!(
            sample_id = %sample_id,
            removed = diff.to_remove.len(),
            updated = diff.to_update.len(),
            created = diff.to_create.len(),
            "updated product sample aggregate"
        );

        Ok(SampleWithUnits {
            sample,
            units: stored_units,
        })
    }

    /// Get a sample together with its live unit variants
    pub async fn get_sample_with_units(&self, sample_id: Uuid) -> AppResult<SampleWithUnits> {
        let sample = sqlx::query_as::<_, SampleRow>(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM product_samples WHERE id = $1",
        ))
        .bind(sample_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product sample".to_string()))?;

        let mut conn = self.db.acquire().await?;
        let units = Self::list_units_on(&mut *conn, sample_id).await?;

        Ok(SampleWithUnits {
            sample: map_sample(sample),
            units,
        })
    }

    async fn validate_unit_input(
        conn: &mut PgConnection,
        unit: &SampleUnitInput,
    ) -> AppResult<()> {
        shared::validate_entity_name(&unit.name)
            .map_err(|msg| AppError::validation("units.name", msg))?;
        shared::validate_non_negative_amount(unit.price)
            .map_err(|msg| AppError::validation("units.price", msg))?;
        shared::validate_conversion_rate(unit.conversion_rate)
            .map_err(|msg| AppError::validation("units.conversion_rate", msg))?;

        let uom_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM unit_of_measures WHERE id = $1)",
        )
        .bind(unit.unit_of_measure_id)
        .fetch_one(&mut *conn)
        .await?;

        if !uom_exists {
            return Err(AppError::NotFound("Unit of measure".to_string()));
        }
        Ok(())
    }

    async fn insert_unit_on(
        conn: &mut PgConnection,
        sample_id: Uuid,
        unit: &SampleUnitInput,
    ) -> AppResult<()> {
        Self::validate_unit_input(&mut *conn, unit).await?;

        sqlx::query(
            r#"
            INSERT INTO product_units (sample_id, name, price, unit_of_measure_id,
                                       conversion_rate, image_url, volume)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(sample_id)
        .bind(unit.name.trim())
        .bind(unit.price)
        .bind(unit.unit_of_measure_id)
        .bind(unit.conversion_rate)
        .bind(&unit.image_url)
        .bind(unit.volume)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn list_units_on(
        conn: &mut PgConnection,
        sample_id: Uuid,
    ) -> AppResult<Vec<ProductUnit>> {
        let rows = sqlx::query_as::<_, UnitRow>(&format!(
            r#"
            SELECT {UNIT_COLUMNS}
            FROM product_units
            WHERE sample_id = $1 AND deleted_at IS NULL
            ORDER BY created_at ASC, id ASC
            "#,
        ))
        .bind(sample_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(map_unit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn unit_input(id: Option<Uuid>) -> SampleUnitInput {
        SampleUnitInput {
            id,
            name: "Bottle 500ml".to_string(),
            price: Decimal::from_str("12.50").unwrap(),
            unit_of_measure_id: Uuid::new_v4(),
            conversion_rate: Decimal::ONE,
            image_url: None,
            volume: None,
        }
    }

    #[test]
    fn test_diff_partitions_payload() {
        let keep = Uuid::new_v4();
        let drop = Uuid::new_v4();
        let incoming = vec![unit_input(Some(keep)), unit_input(None)];

        let diff = diff_unit_set(&[keep, drop], &incoming).unwrap();
        assert_eq!(diff.to_remove, vec![drop]);
        assert_eq!(diff.to_update, vec![(0, keep)]);
        assert_eq!(diff.to_create, vec![1]);
    }

    #[test]
    fn test_diff_rejects_foreign_unit_id() {
        let incoming = vec![unit_input(Some(Uuid::new_v4()))];
        let err = diff_unit_set(&[], &incoming).unwrap_err();
        assert!(matches!(err, DiffError::UnknownUnit(_)));
    }

    #[test]
    fn test_diff_rejects_duplicate_unit_id() {
        let id = Uuid::new_v4();
        let incoming = vec![unit_input(Some(id)), unit_input(Some(id))];
        let err = diff_unit_set(&[id], &incoming).unwrap_err();
        assert!(matches!(err, DiffError::DuplicateUnit(_)));
    }

    #[test]
    fn test_empty_payload_removes_everything() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let diff = diff_unit_set(&[a, b], &[]).unwrap();
        assert_eq!(diff.to_remove, vec![a, b]);
        assert!(diff.to_update.is_empty());
        assert!(diff.to_create.is_empty());
    }
}
