use sqlx::Executor;
use tracing::info;

use rxroute_core::domain::product::ProductId;
use rxroute_core::routing::{LocalOrderRouter, OrderRouter, RouteRequest};

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlCatalogRepository};

const SEED_PRODUCT_IDS: &[&str] = &[
    "prod-tirzepatide-5mg",
    "prod-semaglutide-1mg",
    "prod-nad-plus",
    "prod-bpc-157",
    "prod-sermorelin",
];

const SEED_PHARMACY_IDS: &[&str] = &["ph-sunrise", "ph-gulfcoast", "ph-pacific", "ph-legacy"];

/// Routing outcomes the demo catalog is expected to produce.
const SEED_ROUTES: &[SeedRouteContract] = &[
    SeedRouteContract {
        label: "tirzepatide-fl-routes-to-sunrise",
        product_id: "prod-tirzepatide-5mg",
        state: "FL",
        rep_scope_id: None,
        expected_pharmacy: Some("ph-sunrise"),
    },
    SeedRouteContract {
        label: "tirzepatide-tx-routes-to-gulfcoast",
        product_id: "prod-tirzepatide-5mg",
        state: "TX",
        rep_scope_id: None,
        expected_pharmacy: Some("ph-gulfcoast"),
    },
    SeedRouteContract {
        label: "tirzepatide-ny-blocked-by-inactive-pharmacy",
        product_id: "prod-tirzepatide-5mg",
        state: "NY",
        rep_scope_id: None,
        expected_pharmacy: None,
    },
    SeedRouteContract {
        label: "tirzepatide-fl-excluded-for-rep-002",
        product_id: "prod-tirzepatide-5mg",
        state: "FL",
        rep_scope_id: Some("rep-topline-002"),
        expected_pharmacy: Some("ph-gulfcoast"),
    },
    SeedRouteContract {
        label: "bpc-157-unassigned-blocked",
        product_id: "prod-bpc-157",
        state: "FL",
        rep_scope_id: None,
        expected_pharmacy: None,
    },
];

struct SeedRouteContract {
    label: &'static str,
    product_id: &'static str,
    state: &'static str,
    rep_scope_id: Option<&'static str>,
    expected_pharmacy: Option<&'static str>,
}

/// Demo catalog with pharmacies, assignments, overrides and rep scoping.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        info!(
            event_name = "fixtures.demo_seed_loaded",
            products = SEED_PRODUCT_IDS.len(),
            pharmacies = SEED_PHARMACY_IDS.len(),
            "demo seed loaded"
        );

        Ok(SeedResult {
            products_seeded: SEED_PRODUCT_IDS.to_vec(),
            pharmacies_seeded: SEED_PHARMACY_IDS.to_vec(),
        })
    }

    /// Checks that the seeded rows exist and still route the way they should.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let quoted_products = sql_array_from_ids(SEED_PRODUCT_IDS);
        let product_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM product WHERE id IN {quoted_products}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("products", product_count == SEED_PRODUCT_IDS.len() as i64));

        let quoted_pharmacies = sql_array_from_ids(SEED_PHARMACY_IDS);
        let pharmacy_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM pharmacy WHERE id IN {quoted_pharmacies}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("pharmacies", pharmacy_count == SEED_PHARMACY_IDS.len() as i64));

        let unassigned: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM product_pharmacy WHERE product_id = 'prod-bpc-157'",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("bpc-157-has-no-assignments", unassigned == 0));

        let router = LocalOrderRouter::new(SqlCatalogRepository::new(pool.clone()));
        for route in SEED_ROUTES {
            let request = RouteRequest::new(ProductId(route.product_id.to_string()), route.state)
                .with_rep_scope(route.rep_scope_id.map(|id| rxroute_core::UserId(id.to_string())));
            let decision = router
                .route(&request)
                .await
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;
            let routed = decision.routed().map(|id| id.0.as_str());
            checks.push((route.label, routed == route.expected_pharmacy));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub products_seeded: Vec<&'static str>,
    pub pharmacies_seeded: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!DemoSeedDataset::SQL.is_empty());
        assert!(DemoSeedDataset::SQL.contains("ON CONFLICT"));
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");

        migrations::run_pending(&pool).await.expect("run migrations");

        let first = DemoSeedDataset::load(&pool).await.expect("load seed fixtures");
        let first_verification = DemoSeedDataset::verify(&pool).await.expect("verify seed fixtures");
        assert!(first_verification.all_present, "{:?}", first_verification.checks);
        assert_eq!(first.products_seeded.len(), 5);

        let second = DemoSeedDataset::load(&pool).await.expect("reload seed fixtures");
        let second_verification =
            DemoSeedDataset::verify(&pool).await.expect("re-verify seed fixtures");
        assert!(second_verification.all_present);
        assert_eq!(second.pharmacies_seeded.len(), 4);
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn verify_reports_missing_seed() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");

        let verification = DemoSeedDataset::verify(&pool).await.expect("verify empty database");
        assert!(!verification.all_present);
        assert!(verification.checks.contains(&("products", false)));
    }

    #[tokio::test]
    async fn seeded_overrides_decode() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        DemoSeedDataset::load(&pool).await.expect("load seed fixtures");

        let repo = SqlCatalogRepository::new(pool);
        let scope = rxroute_core::domain::pricing::OverrideScope::Practice(
            rxroute_core::domain::actor::PracticeId("pr-demo-001".to_string()),
        );
        let price_override = repo
            .find_override(&ProductId("prod-tirzepatide-5mg".to_string()), &scope)
            .await
            .expect("find override")
            .expect("override present");
        assert_eq!(price_override.retail_price, Some(rust_decimal::Decimal::new(27900, 2)));
    }
}
