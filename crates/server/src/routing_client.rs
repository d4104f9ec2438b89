//! `routeOrder` over HTTP, for deployments where routing runs as its own service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rxroute_core::config::RoutingConfig;
use rxroute_core::domain::state::StateCode;
use rxroute_core::routing::{
    OrderRouter, RouteOrderRequest, RouteOrderResponse, RouteRequest, RoutingDecision,
    RoutingError,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

pub struct HttpOrderRouter {
    client: Client,
    endpoint: String,
    api_key: SecretString,
}

impl HttpOrderRouter {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint: endpoint.into(), api_key })
    }

    /// `None` when the config carries no remote endpoint or key.
    pub fn from_config(config: &RoutingConfig) -> Option<Result<Self, reqwest::Error>> {
        let endpoint = config.remote_url.as_deref()?.trim();
        let api_key = config.api_key.clone()?;
        Some(Self::new(endpoint, api_key, config.timeout()))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl OrderRouter for HttpOrderRouter {
    async fn route(&self, request: &RouteRequest) -> Result<RoutingDecision, RoutingError> {
        // A bad state never leaves the process.
        let state = StateCode::parse(&request.destination_state)?;
        let body = RouteOrderRequest::from(request);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                warn!(
                    event_name = "routing.remote_failed",
                    product_id = %request.product_id,
                    error = %error,
                    "routing service request failed"
                );
                RoutingError::Remote(format!("routing service request failed: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                event_name = "routing.remote_failed",
                product_id = %request.product_id,
                status = status.as_u16(),
                "routing service returned an error status"
            );
            return Err(RoutingError::Remote(format!("routing service returned {status}")));
        }

        let payload: RouteOrderResponse = response.json().await.map_err(|error| {
            RoutingError::Remote(format!("failed to decode routing service response: {error}"))
        })?;
        let decision = payload.into_decision(state);

        info!(
            event_name = "routing.decided",
            product_id = %request.product_id,
            destination_state = %state,
            pharmacy_id = decision.routed().map(|id| id.0.as_str()).unwrap_or(""),
            source = "remote",
            "routing decision received"
        );
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use rxroute_core::domain::pharmacy::PharmacyId;
    use rxroute_core::domain::product::ProductId;
    use rxroute_core::routing::{
        BlockReason, OrderRouter, RouteOrderRequest, RouteRequest, RoutingBasis, RoutingDecision,
        RoutingError,
    };
    use secrecy::SecretString;
    use serde_json::{json, Value};

    use super::HttpOrderRouter;

    async fn fake_route(
        headers: HeaderMap,
        Json(body): Json<RouteOrderRequest>,
    ) -> (StatusCode, Json<Value>) {
        let authorized = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(|value| value == "Bearer test-key")
            .unwrap_or(false);
        if !authorized {
            return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" })));
        }

        match body.destination_state.as_str() {
            "FL" => {
                let pharmacy = if body.user_topline_rep_id.is_some() { "ph-b" } else { "ph-a" };
                (StatusCode::OK, Json(json!({ "pharmacy_id": pharmacy })))
            }
            "TX" => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" }))),
            state => (
                StatusCode::OK,
                Json(json!({
                    "pharmacy_id": null,
                    "reason": format!("no pharmacy serves {state} for this product"),
                })),
            ),
        }
    }

    async fn spawn_fake() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        let app = Router::new().route("/route-order", post(fake_route));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{address}/route-order")
    }

    fn router(endpoint: String, key: &str) -> HttpOrderRouter {
        HttpOrderRouter::new(endpoint, SecretString::from(key.to_string()), Duration::from_secs(5))
            .expect("client")
    }

    fn request(state: &str) -> RouteRequest {
        RouteRequest::new(ProductId("prod-1".to_string()), state)
    }

    #[tokio::test]
    async fn routed_answer_becomes_remote_route() {
        let router = router(spawn_fake().await, "test-key");

        let decision = router.route(&request("FL")).await.expect("routes");
        assert_eq!(
            decision,
            RoutingDecision::Routed {
                pharmacy_id: PharmacyId("ph-a".to_string()),
                priority: None,
                basis: RoutingBasis::Remote,
                reason: "selected by routing service".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn rep_scope_is_forwarded() {
        let router = router(spawn_fake().await, "test-key");

        let scoped = request("FL").with_rep_scope(Some(rxroute_core::UserId("rep-1".to_string())));
        let decision = router.route(&scoped).await.expect("routes");
        assert_eq!(decision.routed(), Some(&PharmacyId("ph-b".to_string())));
    }

    #[tokio::test]
    async fn null_pharmacy_is_a_block_not_an_error() {
        let router = router(spawn_fake().await, "test-key");

        let decision = router.route(&request("NY")).await.expect("decision");
        assert!(matches!(
            decision,
            RoutingDecision::Blocked { reason: BlockReason::Declined { ref reason } }
                if reason == "no pharmacy serves NY for this product"
        ));
    }

    #[tokio::test]
    async fn error_status_and_bad_key_surface_as_remote_failures() {
        let endpoint = spawn_fake().await;

        let failing = router(endpoint.clone(), "test-key").route(&request("TX")).await;
        assert!(matches!(failing, Err(RoutingError::Remote(ref message)) if message.contains("500")));

        let unauthorized = router(endpoint, "wrong-key").route(&request("FL")).await;
        assert!(
            matches!(unauthorized, Err(RoutingError::Remote(ref message)) if message.contains("401"))
        );
    }

    #[tokio::test]
    async fn invalid_state_fails_before_any_request() {
        // Nothing listens on this endpoint; a network attempt would be a Remote error.
        let router = router("http://127.0.0.1:9/route-order".to_string(), "test-key");

        let result = router.route(&request("ZZ")).await;
        assert!(matches!(result, Err(RoutingError::InvalidState(_))));
    }
}
