//! JSON API over the routing core.
//!
//! Endpoints:
//! - `POST   /api/v1/route-order`                        routing decision for one product and state
//! - `POST   /api/v1/effective-price`                    tier prices through the caller's override scope
//! - `POST   /api/v1/catalog/visible-products`           drop products hidden by the caller's topline rep
//! - `POST   /api/v1/cart/lines`                         admit a cart line
//! - `POST   /api/v1/cart/{owner_id}/view`               active lines and their total
//! - `PATCH  /api/v1/cart/{owner_id}/lines/{line_id}`    change a line's quantity
//! - `DELETE /api/v1/cart/{owner_id}/lines/{line_id}`    remove a line
//!
//! Session handling lives upstream, so every call that acts on behalf of a
//! user carries its resolved `actor` in the body.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{patch, post},
    Json, Router,
};
use rxroute_core::admission::{
    AddToCartRequest, AdmissionOutcome, AdmissionPolicy, AdmissionRejection, CartAdmission,
    CartCommandError, CartView,
};
use rxroute_core::audit::AuditSink;
use rxroute_core::domain::actor::{ActorContext, UserId};
use rxroute_core::domain::cart::{CartLine, CartLineId};
use rxroute_core::domain::product::ProductId;
use rxroute_core::errors::{ApplicationError, InterfaceError};
use rxroute_core::ports::{CartStore, CatalogStore};
use rxroute_core::pricing::{EffectivePrices, PriceError, PriceResolver};
use rxroute_core::routing::{
    OrderRouter, RouteOrderRequest, RouteOrderResponse, RouteRequest, RoutingError,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

pub type ServerAdmission = CartAdmission<
    Arc<dyn CatalogStore>,
    Arc<dyn OrderRouter>,
    Arc<dyn CartStore>,
    Arc<dyn AuditSink>,
>;

#[derive(Clone)]
pub struct ApiState {
    prices: Arc<PriceResolver<Arc<dyn CatalogStore>>>,
    router: Arc<dyn OrderRouter>,
    admission: Arc<ServerAdmission>,
}

impl ApiState {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        router: Arc<dyn OrderRouter>,
        carts: Arc<dyn CartStore>,
        audit: Arc<dyn AuditSink>,
        policy: AdmissionPolicy,
    ) -> Self {
        let admission =
            CartAdmission::new(catalog.clone(), router.clone(), carts, audit, policy);
        Self {
            prices: Arc::new(PriceResolver::new(catalog)),
            router,
            admission: Arc::new(admission),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EffectivePriceRequest {
    pub product_id: ProductId,
    pub actor: ActorContext,
}

#[derive(Debug, Deserialize)]
pub struct VisibleProductsRequest {
    pub actor: ActorContext,
    pub product_ids: Vec<ProductId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VisibleProductsResponse {
    pub product_ids: Vec<ProductId>,
}

#[derive(Debug, Deserialize)]
pub struct AddLineRequest {
    pub actor: ActorContext,
    pub line: AddToCartRequest,
}

#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    pub actor: ActorContext,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLineRequest {
    pub actor: ActorContext,
    pub quantity: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error_class: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

type ApiFailure = (StatusCode, Json<ApiError>);

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/route-order", post(route_order))
        .route("/api/v1/effective-price", post(effective_price))
        .route("/api/v1/catalog/visible-products", post(visible_products))
        .route("/api/v1/cart/lines", post(add_line))
        .route("/api/v1/cart/{owner_id}/view", post(list_lines))
        .route("/api/v1/cart/{owner_id}/lines/{line_id}", patch(update_line).delete(remove_line))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn route_order(
    State(state): State<ApiState>,
    Json(body): Json<RouteOrderRequest>,
) -> Result<Json<RouteOrderResponse>, ApiFailure> {
    let request = RouteRequest::from(body);
    match state.router.route(&request).await {
        Ok(decision) => Ok(Json(RouteOrderResponse::from(&decision))),
        Err(RoutingError::InvalidState(invalid)) => {
            Err(failure(StatusCode::BAD_REQUEST, "invalid_state", invalid.to_string(), None))
        }
        Err(RoutingError::Store(store)) => Err(interface_failure(store.into(), new_correlation_id())),
        Err(RoutingError::Remote(message)) => {
            Err(interface_failure(ApplicationError::Integration(message), new_correlation_id()))
        }
    }
}

async fn effective_price(
    State(state): State<ApiState>,
    Json(body): Json<EffectivePriceRequest>,
) -> Result<Json<EffectivePrices>, ApiFailure> {
    match state.prices.effective_prices(&body.product_id, &body.actor).await {
        Ok(prices) => Ok(Json(prices)),
        Err(PriceError::NotFound(product_id)) => {
            Err(rejection_failure(&AdmissionRejection::ProductNotFound { product_id }))
        }
        Err(PriceError::InactiveProduct(product_id)) => {
            Err(rejection_failure(&AdmissionRejection::InactiveProduct { product_id }))
        }
        Err(PriceError::Store(store)) => Err(interface_failure(store.into(), new_correlation_id())),
    }
}

async fn visible_products(
    State(state): State<ApiState>,
    Json(body): Json<VisibleProductsRequest>,
) -> Result<Json<VisibleProductsResponse>, ApiFailure> {
    match state.prices.visible_products(&body.actor, &body.product_ids).await {
        Ok(product_ids) => Ok(Json(VisibleProductsResponse { product_ids })),
        Err(PriceError::Store(store)) => Err(interface_failure(store.into(), new_correlation_id())),
        Err(other) => Err(interface_failure(
            ApplicationError::Integration(other.to_string()),
            new_correlation_id(),
        )),
    }
}

async fn add_line(
    State(state): State<ApiState>,
    Json(body): Json<AddLineRequest>,
) -> Result<(StatusCode, Json<CartLine>), ApiFailure> {
    let mut request = body.line;
    let correlation_id = request.correlation_id.clone().unwrap_or_else(new_correlation_id);
    request.correlation_id = Some(correlation_id.clone());

    match state.admission.add_to_cart(request, &body.actor).await {
        Ok(AdmissionOutcome::Admitted { line }) => Ok((StatusCode::CREATED, Json(line))),
        Ok(AdmissionOutcome::Rejected { rejection }) => Err(rejection_failure(&rejection)),
        Err(error) => Err(interface_failure(error, correlation_id)),
    }
}

async fn list_lines(
    State(state): State<ApiState>,
    Path(owner_id): Path<String>,
    Json(body): Json<ActorRequest>,
) -> Result<Json<CartView>, ApiFailure> {
    state
        .admission
        .active_lines(&body.actor, &UserId(owner_id))
        .await
        .map(Json)
        .map_err(command_failure)
}

async fn update_line(
    State(state): State<ApiState>,
    Path((owner_id, line_id)): Path<(String, String)>,
    Json(body): Json<UpdateLineRequest>,
) -> Result<Json<CartLine>, ApiFailure> {
    state
        .admission
        .update_quantity(&body.actor, &UserId(owner_id), &CartLineId(line_id), body.quantity)
        .await
        .map(Json)
        .map_err(command_failure)
}

async fn remove_line(
    State(state): State<ApiState>,
    Path((owner_id, line_id)): Path<(String, String)>,
    Json(body): Json<ActorRequest>,
) -> Result<StatusCode, ApiFailure> {
    state
        .admission
        .remove_line(&body.actor, &UserId(owner_id), &CartLineId(line_id))
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(command_failure)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_correlation_id() -> String {
    format!("req-{}", Uuid::new_v4())
}

fn failure(
    status: StatusCode,
    error_class: &str,
    message: String,
    correlation_id: Option<String>,
) -> ApiFailure {
    (status, Json(ApiError { error_class: error_class.to_string(), message, correlation_id }))
}

fn rejection_failure(rejection: &AdmissionRejection) -> ApiFailure {
    let status = match rejection {
        AdmissionRejection::ForeignCart => StatusCode::FORBIDDEN,
        AdmissionRejection::ProductNotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    failure(status, rejection.error_class(), rejection.to_string(), None)
}

fn command_failure(error: CartCommandError) -> ApiFailure {
    match error {
        CartCommandError::Rejected(rejection) => rejection_failure(&rejection),
        CartCommandError::LineNotFound(line_id) => failure(
            StatusCode::NOT_FOUND,
            "line_not_found",
            format!("cart line `{line_id}` was not found"),
            None,
        ),
        CartCommandError::Application(error) => interface_failure(error, new_correlation_id()),
    }
}

/// Infrastructure trouble: the caller gets a generic retry message, the log gets the detail.
fn interface_failure(error: ApplicationError, correlation_id: String) -> ApiFailure {
    let interface = error.into_interface(correlation_id);
    let (status, error_class) = match &interface {
        InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
        InterfaceError::ServiceUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
        }
        InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(
            event_name = "api.request_failed",
            correlation_id = %interface.correlation_id(),
            error = %interface,
            "request failed with an internal error"
        );
    } else {
        warn!(
            event_name = "api.request_failed",
            correlation_id = %interface.correlation_id(),
            error = %interface,
            "request failed with a retryable error"
        );
    }

    failure(
        status,
        error_class,
        interface.user_message().to_string(),
        Some(interface.correlation_id().to_string()),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use rust_decimal::Decimal;
    use rxroute_core::admission::{AdmissionPolicy, CartView};
    use rxroute_core::audit::InMemoryAuditSink;
    use rxroute_core::domain::cart::CartLine;
    use rxroute_core::pricing::EffectivePrices;
    use rxroute_core::routing::{LocalOrderRouter, RouteOrderResponse};
    use rxroute_db::{
        connect_with_settings, migrations, DbPool, DemoSeedDataset, SqlCartRepository,
        SqlCatalogRepository,
    };
    use serde::de::DeserializeOwned;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, ApiError, ApiState, VisibleProductsResponse};

    async fn seeded_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeedDataset::load(&pool).await.expect("seed");
        pool
    }

    fn app(pool: &DbPool, audit: InMemoryAuditSink) -> Router {
        let catalog = Arc::new(SqlCatalogRepository::new(pool.clone()));
        router(ApiState::new(
            catalog.clone(),
            Arc::new(LocalOrderRouter::new(catalog)),
            Arc::new(SqlCartRepository::new(pool.clone())),
            Arc::new(audit),
            AdmissionPolicy::default(),
        ))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, bytes.to_vec())
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).expect("json body")
    }

    fn practice_actor() -> Value {
        json!({
            "user_id": "user-practice-001",
            "role": "practice",
            "practice_id": "pr-demo-001",
            "provider_id": "prov-001",
            "linked_topline_rep_id": "rep-topline-001"
        })
    }

    fn patient_line(product_id: &str, state: &str) -> Value {
        json!({
            "cart_owner_id": "user-practice-001",
            "product_id": product_id,
            "quantity": 2,
            "destination": {
                "kind": "patient",
                "patient_id": "pt-001",
                "address": {
                    "street": "400 Ocean Dr",
                    "city": "Miami Beach",
                    "state": state,
                    "zip": "33139"
                }
            }
        })
    }

    #[tokio::test]
    async fn route_order_returns_pharmacy_or_null_with_reason() {
        let pool = seeded_pool().await;
        let app = app(&pool, InMemoryAuditSink::default());

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/route-order",
            json!({ "product_id": "prod-tirzepatide-5mg", "destination_state": "TX" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let routed: RouteOrderResponse = decode(&body);
        assert_eq!(routed.pharmacy_id.as_deref(), Some("ph-gulfcoast"));

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/route-order",
            json!({
                "product_id": "prod-tirzepatide-5mg",
                "destination_state": "NY",
                "user_topline_rep_id": null
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let blocked: Value = decode(&body);
        assert_eq!(blocked["pharmacy_id"], Value::Null);
        assert_eq!(blocked["reason"], "no pharmacy serves NY for this product");
    }

    #[tokio::test]
    async fn route_order_rejects_unknown_state_code() {
        let pool = seeded_pool().await;
        let app = app(&pool, InMemoryAuditSink::default());

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/route-order",
            json!({ "product_id": "prod-tirzepatide-5mg", "destination_state": "XX" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ApiError = decode(&body);
        assert_eq!(error.error_class, "invalid_state");
    }

    #[tokio::test]
    async fn effective_price_reports_override_for_scoped_rep_only() {
        let pool = seeded_pool().await;
        let app = app(&pool, InMemoryAuditSink::default());

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/effective-price",
            json!({
                "product_id": "prod-nad-plus",
                "actor": { "user_id": "rep-topline-001", "role": "topline" }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let scoped: EffectivePrices = decode(&body);
        assert_eq!(scoped.effective_topline_price, Decimal::from(70));
        assert!(scoped.has_override);

        let (_, body) = call(
            &app,
            "POST",
            "/api/v1/effective-price",
            json!({
                "product_id": "prod-nad-plus",
                "actor": { "user_id": "rep-topline-002", "role": "topline" }
            }),
        )
        .await;
        let other: EffectivePrices = decode(&body);
        assert_eq!(other.effective_topline_price, Decimal::from(75));
        assert!(!other.has_override);

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/effective-price",
            json!({
                "product_id": "prod-missing",
                "actor": { "user_id": "rep-topline-001", "role": "topline" }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(decode::<ApiError>(&body).error_class, "product_not_found");
    }

    #[tokio::test]
    async fn effective_price_for_inactive_product_is_unprocessable() {
        let pool = seeded_pool().await;
        let app = app(&pool, InMemoryAuditSink::default());

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/effective-price",
            json!({
                "product_id": "prod-sermorelin",
                "actor": { "user_id": "rep-topline-001", "role": "topline" }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(decode::<ApiError>(&body).error_class, "inactive_product");
    }

    #[tokio::test]
    async fn visible_products_hides_rows_only_below_the_topline_rep() {
        let pool = seeded_pool().await;
        let app = app(&pool, InMemoryAuditSink::default());
        let products = json!(["prod-nad-plus", "prod-bpc-157"]);

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/catalog/visible-products",
            json!({
                "actor": {
                    "user_id": "rep-downline-001",
                    "role": "downline",
                    "linked_topline_rep_id": "rep-topline-001"
                },
                "product_ids": products
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let visible: VisibleProductsResponse = decode(&body);
        let ids: Vec<&str> = visible.product_ids.iter().map(|id| id.0.as_str()).collect();
        assert_eq!(ids, vec!["prod-nad-plus"]);

        let (_, body) = call(
            &app,
            "POST",
            "/api/v1/catalog/visible-products",
            json!({
                "actor": { "user_id": "rep-topline-001", "role": "topline" },
                "product_ids": products
            }),
        )
        .await;
        let visible: VisibleProductsResponse = decode(&body);
        assert_eq!(visible.product_ids.len(), 2);
    }

    #[tokio::test]
    async fn add_line_creates_routed_line_with_snapshot() {
        let pool = seeded_pool().await;
        let audit = InMemoryAuditSink::default();
        let app = app(&pool, audit.clone());

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/cart/lines",
            json!({ "actor": practice_actor(), "line": patient_line("prod-tirzepatide-5mg", "FL") }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let line: CartLine = decode(&body);
        assert_eq!(line.assigned_pharmacy_id.0, "ph-sunrise");
        assert_eq!(line.price_snapshot, Decimal::new(27900, 2));
        assert_eq!(line.quantity, 2);
        assert_eq!(audit.events().len(), 1);
    }

    #[tokio::test]
    async fn add_line_to_unserved_state_is_unprocessable_and_writes_nothing() {
        let pool = seeded_pool().await;
        let app = app(&pool, InMemoryAuditSink::default());

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/cart/lines",
            json!({ "actor": practice_actor(), "line": patient_line("prod-tirzepatide-5mg", "NY") }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let error: ApiError = decode(&body);
        assert_eq!(error.error_class, "not_eligible");
        assert_eq!(
            error.message,
            "Tirzepatide 5mg cannot be fulfilled in NY: no pharmacy serves NY for this product"
        );

        let lines: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cart_line")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(lines, 0);
    }

    #[tokio::test]
    async fn add_line_for_someone_elses_cart_is_forbidden() {
        let pool = seeded_pool().await;
        let app = app(&pool, InMemoryAuditSink::default());

        let mut line = patient_line("prod-tirzepatide-5mg", "FL");
        line["cart_owner_id"] = json!("user-practice-999");
        let (status, body) =
            call(&app, "POST", "/api/v1/cart/lines", json!({ "actor": practice_actor(), "line": line }))
                .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(decode::<ApiError>(&body).error_class, "foreign_cart");
    }

    #[tokio::test]
    async fn infrastructure_failure_returns_generic_retry_message() {
        let pool = seeded_pool().await;
        let app = app(&pool, InMemoryAuditSink::default());
        pool.close().await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/cart/lines",
            json!({ "actor": practice_actor(), "line": patient_line("prod-tirzepatide-5mg", "FL") }),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let error: ApiError = decode(&body);
        assert_eq!(error.error_class, "service_unavailable");
        assert_eq!(error.message, "The service is temporarily unavailable. Please retry shortly.");
        assert!(error.correlation_id.is_some());
    }

    #[tokio::test]
    async fn cart_lines_can_be_listed_updated_and_removed() {
        let pool = seeded_pool().await;
        let app = app(&pool, InMemoryAuditSink::default());

        let (_, body) = call(
            &app,
            "POST",
            "/api/v1/cart/lines",
            json!({ "actor": practice_actor(), "line": patient_line("prod-tirzepatide-5mg", "FL") }),
        )
        .await;
        let line: CartLine = decode(&body);
        let line_uri = format!("/api/v1/cart/user-practice-001/lines/{}", line.id.0);

        let (status, body) = call(
            &app,
            "PATCH",
            &line_uri,
            json!({ "actor": practice_actor(), "quantity": 3 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let updated: CartLine = decode(&body);
        assert_eq!(updated.quantity, 3);
        assert_eq!(updated.price_snapshot, line.price_snapshot);

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/cart/user-practice-001/view",
            json!({ "actor": practice_actor() }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let view: CartView = decode(&body);
        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.active_total, Decimal::new(83700, 2));

        let (status, body) =
            call(&app, "PATCH", &line_uri, json!({ "actor": practice_actor(), "quantity": 0 }))
                .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(decode::<ApiError>(&body).error_class, "invalid_quantity");

        let (status, _) = call(&app, "DELETE", &line_uri, json!({ "actor": practice_actor() })).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) =
            call(&app, "DELETE", &line_uri, json!({ "actor": practice_actor() })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(decode::<ApiError>(&body).error_class, "line_not_found");
    }
}
