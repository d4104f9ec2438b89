use crate::commands::{open_database, prepare, CommandResult};
use rxroute_core::domain::actor::UserId;
use rxroute_core::domain::product::ProductId;
use rxroute_core::routing::{
    LocalOrderRouter, OrderRouter, RouteRequest, RoutingDecision, RoutingError,
};
use rxroute_db::SqlCatalogRepository;

/// Always routes in-process against the configured database, whatever
/// `routing.mode` the server runs with.
pub fn run(product_id: &str, state: &str, rep_scope_id: Option<&str>) -> CommandResult {
    let (config, runtime) = match prepare("route") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let rep_scope_id =
        rep_scope_id.filter(|id| !id.trim().is_empty()).map(|id| UserId(id.to_string()));
    let request =
        RouteRequest::new(ProductId(product_id.to_string()), state).with_rep_scope(rep_scope_id);

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let router = LocalOrderRouter::new(SqlCatalogRepository::new(pool.clone()));
        let decision = router.route(&request).await.map_err(|error| match error {
            RoutingError::InvalidState(invalid) => ("invalid_state", invalid.to_string(), 6u8),
            other => ("routing_lookup", other.to_string(), 4u8),
        });
        pool.close().await;
        decision
    });

    match result {
        Ok(RoutingDecision::Routed { pharmacy_id, reason, .. }) => {
            let state = state.trim().to_ascii_uppercase();
            CommandResult::success(
                "route",
                format!("{product_id} ships to {state} from {pharmacy_id} ({reason})"),
            )
        }
        Ok(RoutingDecision::Blocked { reason }) => {
            CommandResult::failure("route", "not_eligible", reason.to_string(), 7)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("route", error_class, message, exit_code)
        }
    }
}
