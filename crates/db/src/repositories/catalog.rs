use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;

use rxroute_core::domain::actor::UserId;
use rxroute_core::domain::pharmacy::{Pharmacy, PharmacyId};
use rxroute_core::domain::pricing::{OverrideScope, PriceOverride, RepProductVisibility};
use rxroute_core::domain::product::{Product, ProductId};
use rxroute_core::domain::state::StateCode;
use rxroute_core::errors::StoreError;
use rxroute_core::ports::CatalogStore;

use super::{format_timestamp, parse_decimal, parse_optional_decimal, parse_u32, RepositoryError};
use crate::DbPool;

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                name,
                dosage,
                base_price,
                topline_price,
                downline_price,
                retail_price,
                requires_prescription,
                active
             FROM product
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let pharmacy_ids: Vec<String> = sqlx::query_scalar(
            "SELECT pharmacy_id FROM product_pharmacy WHERE product_id = ? ORDER BY pharmacy_id",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        product_from_row(row, pharmacy_ids.into_iter().map(PharmacyId).collect()).map(Some)
    }

    pub async fn pharmacies_for_product(
        &self,
        id: &ProductId,
    ) -> Result<Vec<Pharmacy>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                p.id,
                p.name,
                p.active,
                ps.state_code,
                ps.serviced,
                ps.priority
             FROM product_pharmacy pp
             JOIN pharmacy p ON p.id = pp.pharmacy_id
             LEFT JOIN pharmacy_state ps ON ps.pharmacy_id = p.id
             WHERE pp.product_id = ?
             ORDER BY p.id, ps.state_code",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        pharmacies_from_rows(rows)
    }

    pub async fn find_pharmacy(&self, id: &PharmacyId) -> Result<Option<Pharmacy>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                p.id,
                p.name,
                p.active,
                ps.state_code,
                ps.serviced,
                ps.priority
             FROM pharmacy p
             LEFT JOIN pharmacy_state ps ON ps.pharmacy_id = p.id
             WHERE p.id = ?
             ORDER BY ps.state_code",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(pharmacies_from_rows(rows)?.into_iter().next())
    }

    pub async fn find_override(
        &self,
        product_id: &ProductId,
        scope: &OverrideScope,
    ) -> Result<Option<PriceOverride>, RepositoryError> {
        let row = sqlx::query(
            "SELECT retail_price, topline_price, downline_price
             FROM price_override
             WHERE product_id = ? AND scope_kind = ? AND scope_id = ?",
        )
        .bind(&product_id.0)
        .bind(scope.kind())
        .bind(scope.id())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(PriceOverride {
                product_id: product_id.clone(),
                scope: scope.clone(),
                retail_price: parse_optional_decimal("retail_price", row.try_get("retail_price")?)?,
                topline_price: parse_optional_decimal("topline_price", row.try_get("topline_price")?)?,
                downline_price: parse_optional_decimal(
                    "downline_price",
                    row.try_get("downline_price")?,
                )?,
            })
        })
        .transpose()
    }

    pub async fn excluded_pharmacies(
        &self,
        rep_scope_id: &UserId,
    ) -> Result<Vec<PharmacyId>, RepositoryError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT pharmacy_id FROM rep_pharmacy_exclusion WHERE topline_rep_id = ? ORDER BY pharmacy_id",
        )
        .bind(&rep_scope_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(PharmacyId).collect())
    }

    pub async fn visibility_for_rep(
        &self,
        topline_rep_id: &UserId,
    ) -> Result<Vec<RepProductVisibility>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT product_id, visible
             FROM rep_product_visibility
             WHERE topline_rep_id = ?
             ORDER BY product_id",
        )
        .bind(&topline_rep_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(RepProductVisibility {
                    topline_rep_id: topline_rep_id.clone(),
                    product_id: ProductId(row.try_get("product_id")?),
                    visible: row.try_get::<i64, _>("visible")? != 0,
                })
            })
            .collect()
    }

    /// Upserts the product row and replaces its pharmacy assignments.
    pub async fn save_product(&self, product: &Product) -> Result<(), RepositoryError> {
        let now = format_timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO product (
                id,
                name,
                dosage,
                base_price,
                topline_price,
                downline_price,
                retail_price,
                requires_prescription,
                active,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                dosage = excluded.dosage,
                base_price = excluded.base_price,
                topline_price = excluded.topline_price,
                downline_price = excluded.downline_price,
                retail_price = excluded.retail_price,
                requires_prescription = excluded.requires_prescription,
                active = excluded.active,
                updated_at = excluded.updated_at",
        )
        .bind(&product.id.0)
        .bind(&product.name)
        .bind(product.dosage.as_deref())
        .bind(product.base_price.to_string())
        .bind(product.topline_price.map(|price| price.to_string()))
        .bind(product.downline_price.map(|price| price.to_string()))
        .bind(product.retail_price.map(|price| price.to_string()))
        .bind(i64::from(product.requires_prescription))
        .bind(i64::from(product.active))
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        write_assignments(&mut tx, &product.id, &product.pharmacy_ids).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete-all-then-insert, in one transaction.
    pub async fn replace_assignments(
        &self,
        product_id: &ProductId,
        pharmacy_ids: &[PharmacyId],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        write_assignments(&mut tx, product_id, pharmacy_ids).await?;
        tx.commit().await?;

        debug!(
            event_name = "catalog.assignments_replaced",
            product_id = %product_id,
            assignments = pharmacy_ids.len(),
            "replaced pharmacy assignments"
        );
        Ok(())
    }

    pub async fn save_pharmacy(&self, pharmacy: &Pharmacy) -> Result<(), RepositoryError> {
        let now = format_timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO pharmacy (id, name, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                active = excluded.active,
                updated_at = excluded.updated_at",
        )
        .bind(&pharmacy.id.0)
        .bind(&pharmacy.name)
        .bind(i64::from(pharmacy.active))
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM pharmacy_state WHERE pharmacy_id = ?")
            .bind(&pharmacy.id.0)
            .execute(&mut *tx)
            .await?;

        let states: BTreeSet<StateCode> =
            pharmacy.states_serviced.iter().chain(pharmacy.priority_map.keys()).copied().collect();
        for state in states {
            sqlx::query(
                "INSERT INTO pharmacy_state (pharmacy_id, state_code, serviced, priority)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&pharmacy.id.0)
            .bind(state.as_str())
            .bind(i64::from(pharmacy.states_serviced.contains(&state)))
            .bind(pharmacy.explicit_priority(state).map(i64::from))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn save_override(&self, price_override: &PriceOverride) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO price_override (
                product_id,
                scope_kind,
                scope_id,
                retail_price,
                topline_price,
                downline_price,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(product_id, scope_kind, scope_id) DO UPDATE SET
                retail_price = excluded.retail_price,
                topline_price = excluded.topline_price,
                downline_price = excluded.downline_price,
                updated_at = excluded.updated_at",
        )
        .bind(&price_override.product_id.0)
        .bind(price_override.scope.kind())
        .bind(price_override.scope.id())
        .bind(price_override.retail_price.map(|price| price.to_string()))
        .bind(price_override.topline_price.map(|price| price.to_string()))
        .bind(price_override.downline_price.map(|price| price.to_string()))
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_visibility(&self, visibility: &RepProductVisibility) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO rep_product_visibility (topline_rep_id, product_id, visible)
             VALUES (?, ?, ?)
             ON CONFLICT(topline_rep_id, product_id) DO UPDATE SET visible = excluded.visible",
        )
        .bind(&visibility.topline_rep_id.0)
        .bind(&visibility.product_id.0)
        .bind(i64::from(visibility.visible))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn exclude_pharmacy(
        &self,
        topline_rep_id: &UserId,
        pharmacy_id: &PharmacyId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO rep_pharmacy_exclusion (topline_rep_id, pharmacy_id)
             VALUES (?, ?)
             ON CONFLICT(topline_rep_id, pharmacy_id) DO NOTHING",
        )
        .bind(&topline_rep_id.0)
        .bind(&pharmacy_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn write_assignments(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    product_id: &ProductId,
    pharmacy_ids: &[PharmacyId],
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM product_pharmacy WHERE product_id = ?")
        .bind(&product_id.0)
        .execute(&mut **tx)
        .await?;

    for pharmacy_id in pharmacy_ids {
        sqlx::query(
            "INSERT INTO product_pharmacy (product_id, pharmacy_id) VALUES (?, ?)
             ON CONFLICT(product_id, pharmacy_id) DO NOTHING",
        )
        .bind(&product_id.0)
        .bind(&pharmacy_id.0)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn product_from_row(row: SqliteRow, pharmacy_ids: Vec<PharmacyId>) -> Result<Product, RepositoryError> {
    Ok(Product {
        id: ProductId(row.try_get("id")?),
        name: row.try_get("name")?,
        dosage: row.try_get("dosage")?,
        base_price: parse_decimal("base_price", row.try_get("base_price")?)?,
        topline_price: parse_optional_decimal("topline_price", row.try_get("topline_price")?)?,
        downline_price: parse_optional_decimal("downline_price", row.try_get("downline_price")?)?,
        retail_price: parse_optional_decimal("retail_price", row.try_get("retail_price")?)?,
        requires_prescription: row.try_get::<i64, _>("requires_prescription")? != 0,
        active: row.try_get::<i64, _>("active")? != 0,
        pharmacy_ids,
    })
}

/// Folds pharmacy rows joined with their state rows, ordered by pharmacy id.
fn pharmacies_from_rows(rows: Vec<SqliteRow>) -> Result<Vec<Pharmacy>, RepositoryError> {
    let mut pharmacies: BTreeMap<String, Pharmacy> = BTreeMap::new();

    for row in rows {
        let id: String = row.try_get("id")?;
        if !pharmacies.contains_key(&id) {
            let pharmacy = Pharmacy {
                id: PharmacyId(id.clone()),
                name: row.try_get("name")?,
                active: row.try_get::<i64, _>("active")? != 0,
                states_serviced: BTreeSet::new(),
                priority_map: BTreeMap::new(),
            };
            pharmacies.insert(id.clone(), pharmacy);
        }

        let Some(raw_state) = row.try_get::<Option<String>, _>("state_code")? else {
            continue;
        };
        let state = StateCode::parse(&raw_state).map_err(|error| {
            RepositoryError::Decode(format!("pharmacy `{id}` has invalid state: {error}"))
        })?;
        let serviced = row.try_get::<Option<i64>, _>("serviced")?.unwrap_or(0) != 0;
        let priority = row
            .try_get::<Option<i64>, _>("priority")?
            .map(|priority| parse_u32("priority", priority))
            .transpose()?;

        if let Some(pharmacy) = pharmacies.get_mut(&id) {
            if serviced {
                pharmacy.states_serviced.insert(state);
            }
            if let Some(priority) = priority {
                pharmacy.priority_map.insert(state, priority);
            }
        }
    }

    Ok(pharmacies.into_values().collect())
}

#[async_trait]
impl CatalogStore for SqlCatalogRepository {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        Ok(SqlCatalogRepository::find_product(self, id).await?)
    }

    async fn pharmacies_for_product(&self, id: &ProductId) -> Result<Vec<Pharmacy>, StoreError> {
        Ok(SqlCatalogRepository::pharmacies_for_product(self, id).await?)
    }

    async fn find_override(
        &self,
        product_id: &ProductId,
        scope: &OverrideScope,
    ) -> Result<Option<PriceOverride>, StoreError> {
        Ok(SqlCatalogRepository::find_override(self, product_id, scope).await?)
    }

    async fn excluded_pharmacies(
        &self,
        rep_scope_id: &UserId,
    ) -> Result<Vec<PharmacyId>, StoreError> {
        Ok(SqlCatalogRepository::excluded_pharmacies(self, rep_scope_id).await?)
    }

    async fn visibility_for_rep(
        &self,
        topline_rep_id: &UserId,
    ) -> Result<Vec<RepProductVisibility>, StoreError> {
        Ok(SqlCatalogRepository::visibility_for_rep(self, topline_rep_id).await?)
    }
}
