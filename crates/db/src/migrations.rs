use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Version of the newest applied migration, if any.
pub async fn current_version(pool: &DbPool) -> Result<Option<i64>, sqlx::Error> {
    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if table_exists == 0 {
        return Ok(None);
    }

    sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{current_version, run_pending};
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "product",
        "pharmacy",
        "pharmacy_state",
        "product_pharmacy",
        "price_override",
        "rep_product_visibility",
        "rep_pharmacy_exclusion",
        "cart",
        "cart_line",
        "idx_pharmacy_state_state_code",
        "idx_product_pharmacy_pharmacy_id",
        "idx_rep_pharmacy_exclusion_pharmacy_id",
        "idx_cart_line_cart_id",
        "idx_cart_line_expires_at",
    ];

    async fn table_count(pool: &sqlx::SqlitePool, name: &str) -> i64 {
        sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("check table")
        .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        assert_eq!(current_version(&pool).await.expect("version before"), None);

        run_pending(&pool).await.expect("run migrations");

        for table in ["product", "pharmacy", "pharmacy_state", "product_pharmacy", "cart", "cart_line"] {
            assert_eq!(table_count(&pool, table).await, 1, "missing table {table}");
        }
        assert_eq!(current_version(&pool).await.expect("version after"), Some(1));
    }

    #[tokio::test]
    async fn cart_line_rejects_null_pharmacy_at_the_schema_level() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO product (id, name, base_price, created_at, updated_at)
             VALUES ('p-1', 'Test', '10', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .expect("insert product");
        sqlx::query("INSERT INTO cart (id, owner_id, created_at) VALUES ('c-1', 'u-1', '2026-01-01T00:00:00Z')")
            .execute(&pool)
            .await
            .expect("insert cart");

        let result = sqlx::query(
            "INSERT INTO cart_line (
                id, cart_id, product_id, quantity, price_snapshot, destination_state,
                assigned_pharmacy_id, destination_kind, practice_id, destination_json,
                created_at, expires_at
             ) VALUES ('l-1', 'c-1', 'p-1', 1, '10', 'FL', NULL, 'practice', 'pr-1', '{}',
                '2026-01-01T00:00:00Z', '2026-01-02T00:00:00Z')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        assert_eq!(table_count(&pool, "cart_line").await, 0);
        assert_eq!(table_count(&pool, "product").await, 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
