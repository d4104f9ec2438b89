use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use rxroute_core::domain::actor::{ProviderId, UserId};
use rxroute_core::domain::cart::{Cart, CartId, CartLine, CartLineId, CartLineRecord, Destination};
use rxroute_core::domain::pharmacy::PharmacyId;
use rxroute_core::domain::product::ProductId;
use rxroute_core::domain::state::StateCode;
use rxroute_core::errors::StoreError;
use rxroute_core::ports::CartStore;

use super::{format_timestamp, parse_decimal, parse_timestamp, parse_u32, RepositoryError};
use crate::DbPool;

const LINE_COLUMNS: &str = "
    l.id,
    l.cart_id,
    l.product_id,
    l.quantity,
    l.price_snapshot,
    l.destination_state,
    l.assigned_pharmacy_id,
    l.destination_json,
    l.provider_id,
    l.prescription_url,
    l.created_at,
    l.expires_at";

pub struct SqlCartRepository {
    pool: DbPool,
}

impl SqlCartRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_or_create_cart(&self, owner_id: &UserId) -> Result<Cart, RepositoryError> {
        sqlx::query(
            "INSERT INTO cart (id, owner_id, created_at) VALUES (?, ?, ?)
             ON CONFLICT(owner_id) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&owner_id.0)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id, owner_id, created_at FROM cart WHERE owner_id = ?")
            .bind(&owner_id.0)
            .fetch_one(&self.pool)
            .await?;

        Ok(Cart {
            id: CartId(row.try_get("id")?),
            owner_id: UserId(row.try_get("owner_id")?),
            created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        })
    }

    /// The raw `addCartLine` write. A record without a pharmacy never reaches SQL.
    pub async fn add_cart_line(&self, record: CartLineRecord) -> Result<CartLine, RepositoryError> {
        let line = CartLine::try_from(record)
            .map_err(|error| RepositoryError::Invariant(error.to_string()))?;
        self.insert_line(&line).await?;
        Ok(line)
    }

    pub async fn insert_line(&self, line: &CartLine) -> Result<(), RepositoryError> {
        let destination_json = serde_json::to_string(&line.destination)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let (patient_id, practice_id) = match &line.destination {
            Destination::Patient { patient_id, .. } => (Some(patient_id.0.as_str()), None),
            Destination::Practice { practice_id, .. } => (None, Some(practice_id.0.as_str())),
        };

        sqlx::query(
            "INSERT INTO cart_line (
                id,
                cart_id,
                product_id,
                quantity,
                price_snapshot,
                destination_state,
                assigned_pharmacy_id,
                destination_kind,
                patient_id,
                practice_id,
                destination_json,
                provider_id,
                prescription_url,
                created_at,
                expires_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&line.id.0)
        .bind(&line.cart_id.0)
        .bind(&line.product_id.0)
        .bind(i64::from(line.quantity))
        .bind(line.price_snapshot.to_string())
        .bind(line.destination_state.as_str())
        .bind(&line.assigned_pharmacy_id.0)
        .bind(line.destination.kind())
        .bind(patient_id)
        .bind(practice_id)
        .bind(destination_json)
        .bind(line.provider_id.as_ref().map(|id| id.0.as_str()))
        .bind(line.prescription_url.as_deref())
        .bind(format_timestamp(line.created_at))
        .bind(format_timestamp(line.expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_line(
        &self,
        owner_id: &UserId,
        line_id: &CartLineId,
    ) -> Result<Option<CartLine>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS}
             FROM cart_line l
             JOIN cart c ON c.id = l.cart_id
             WHERE c.owner_id = ? AND l.id = ?"
        ))
        .bind(&owner_id.0)
        .bind(&line_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(line_from_row).transpose()
    }

    pub async fn list_active_lines(
        &self,
        owner_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS}
             FROM cart_line l
             JOIN cart c ON c.id = l.cart_id
             WHERE c.owner_id = ? AND l.expires_at > ?
             ORDER BY l.created_at ASC, l.id ASC"
        ))
        .bind(&owner_id.0)
        .bind(format_timestamp(now))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(line_from_row).collect()
    }

    pub async fn update_quantity(
        &self,
        owner_id: &UserId,
        line_id: &CartLineId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<CartLine>, RepositoryError> {
        if quantity == 0 {
            return Err(RepositoryError::Invariant(format!(
                "cart line {line_id} cannot have quantity 0"
            )));
        }

        let result = sqlx::query(
            "UPDATE cart_line SET quantity = ?
             WHERE id = ? AND expires_at > ?
               AND cart_id IN (SELECT id FROM cart WHERE owner_id = ?)",
        )
        .bind(i64::from(quantity))
        .bind(&line_id.0)
        .bind(format_timestamp(now))
        .bind(&owner_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_line(owner_id, line_id).await
    }

    pub async fn remove_line(
        &self,
        owner_id: &UserId,
        line_id: &CartLineId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM cart_line
             WHERE id = ? AND cart_id IN (SELECT id FROM cart WHERE owner_id = ?)",
        )
        .bind(&line_id.0)
        .bind(&owner_id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

}

fn line_from_row(row: SqliteRow) -> Result<CartLine, RepositoryError> {
    let id = CartLineId(row.try_get("id")?);
    let destination: Destination =
        serde_json::from_str(&row.try_get::<String, _>("destination_json")?).map_err(|error| {
            RepositoryError::Decode(format!("cart line {id} has invalid destination: {error}"))
        })?;
    let raw_state: String = row.try_get("destination_state")?;
    let destination_state = StateCode::parse(&raw_state)
        .map_err(|error| RepositoryError::Decode(format!("cart line {id}: {error}")))?;

    Ok(CartLine {
        cart_id: CartId(row.try_get("cart_id")?),
        product_id: ProductId(row.try_get("product_id")?),
        quantity: parse_u32("quantity", row.try_get("quantity")?)?,
        price_snapshot: parse_decimal("price_snapshot", row.try_get("price_snapshot")?)?,
        destination_state,
        assigned_pharmacy_id: PharmacyId(row.try_get("assigned_pharmacy_id")?),
        destination,
        provider_id: row.try_get::<Option<String>, _>("provider_id")?.map(ProviderId),
        prescription_url: row.try_get("prescription_url")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        expires_at: parse_timestamp("expires_at", row.try_get("expires_at")?)?,
        id,
    })
}

#[async_trait]
impl CartStore for SqlCartRepository {
    async fn find_or_create_cart(&self, owner_id: &UserId) -> Result<Cart, StoreError> {
        Ok(SqlCartRepository::find_or_create_cart(self, owner_id).await?)
    }

    async fn insert_line(&self, line: &CartLine) -> Result<(), StoreError> {
        Ok(SqlCartRepository::insert_line(self, line).await?)
    }

    async fn list_active_lines(
        &self,
        owner_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CartLine>, StoreError> {
        Ok(SqlCartRepository::list_active_lines(self, owner_id, now).await?)
    }

    async fn update_quantity(
        &self,
        owner_id: &UserId,
        line_id: &CartLineId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<CartLine>, StoreError> {
        Ok(SqlCartRepository::update_quantity(self, owner_id, line_id, quantity, now).await?)
    }

    async fn remove_line(
        &self,
        owner_id: &UserId,
        line_id: &CartLineId,
    ) -> Result<bool, StoreError> {
        Ok(SqlCartRepository::remove_line(self, owner_id, line_id).await?)
    }
}
