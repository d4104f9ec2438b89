use std::future::Future;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::admission::{AddToCartRequest, AdmissionOutcome, AdmissionPolicy, AdmissionRejection};
use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::actor::{ActorContext, ProviderId, Role};
use crate::domain::cart::{CartId, CartLine, CartLineId};
use crate::domain::pharmacy::PharmacyId;
use crate::domain::state::StateCode;
use crate::errors::{ApplicationError, DomainError};
use crate::ports::{CartStore, CatalogStore};
use crate::pricing::{PriceError, PricedProduct, PriceResolver};
use crate::routing::{OrderRouter, RouteRequest, RoutingDecision, RoutingError};

pub struct CartAdmission<S, R, C, A> {
    prices: PriceResolver<S>,
    router: R,
    pub(crate) carts: C,
    pub(crate) audit: A,
    policy: AdmissionPolicy,
}

impl<S, R, C, A> CartAdmission<S, R, C, A> {
    pub fn new(catalog: S, router: R, carts: C, audit: A, policy: AdmissionPolicy) -> Self {
        Self { prices: PriceResolver::new(catalog), router, carts, audit, policy }
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }
}

/// Everything the local checks established about a request.
struct Checked {
    state: StateCode,
    provider_id: Option<ProviderId>,
}

/// The checks that need no store access, in the order they are reported.
fn check_request(
    request: &AddToCartRequest,
    actor: &ActorContext,
) -> Result<Checked, AdmissionRejection> {
    if request.quantity < 1 || u32::try_from(request.quantity).is_err() {
        return Err(AdmissionRejection::InvalidQuantity { quantity: request.quantity });
    }

    let state = request.destination.resolve_state().map_err(|_| AdmissionRejection::InvalidAddress {
        field: request.destination.state_field_label().to_string(),
    })?;

    let provider_id = request.provider_id.clone().or_else(|| actor.provider_id.clone());
    let orders_for_patient = request.destination.patient_id().is_some();
    if orders_for_patient
        && matches!(actor.role, Role::Practice | Role::Provider)
        && provider_id.is_none()
    {
        return Err(AdmissionRejection::MissingProvider);
    }

    if request.cart_owner_id != actor.user_id {
        return Err(AdmissionRejection::ForeignCart);
    }

    Ok(Checked { state, provider_id })
}

impl<S, R, C, A> CartAdmission<S, R, C, A>
where
    S: CatalogStore,
    R: OrderRouter,
    C: CartStore,
    A: AuditSink,
{
    /// `addToCart`. Rejections are returned as values; only infrastructure
    /// trouble (store failures, timeouts) comes back as `Err`.
    pub async fn add_to_cart(
        &self,
        request: AddToCartRequest,
        actor: &ActorContext,
    ) -> Result<AdmissionOutcome, ApplicationError> {
        let correlation_id =
            request.correlation_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());

        let outcome = match self.admit(&request, actor).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(
                    event_name = "cart.admission_failed",
                    correlation_id = %correlation_id,
                    product_id = %request.product_id,
                    error = %error,
                    "cart admission aborted"
                );
                return Err(error);
            }
        };

        self.record(&request, actor, &correlation_id, &outcome);
        Ok(outcome)
    }

    async fn admit(
        &self,
        request: &AddToCartRequest,
        actor: &ActorContext,
    ) -> Result<AdmissionOutcome, ApplicationError> {
        let checked = match check_request(request, actor) {
            Ok(checked) => checked,
            Err(rejection) => return Ok(AdmissionOutcome::Rejected { rejection }),
        };

        let pricing = self.prices.resolve(&request.product_id, actor);
        let priced = match self.bounded("price resolution", pricing).await? {
            Ok(priced) => priced,
            Err(PriceError::NotFound(product_id)) => {
                return Ok(rejected(AdmissionRejection::ProductNotFound { product_id }));
            }
            Err(PriceError::InactiveProduct(product_id)) => {
                return Ok(rejected(AdmissionRejection::InactiveProduct { product_id }));
            }
            Err(PriceError::Store(error)) => return Err(error.into()),
        };

        let route = RouteRequest::new(priced.product.id.clone(), checked.state.as_str())
            .with_rep_scope(actor.rep_scope().cloned());
        let decision = self
            .bounded("routing lookup", self.router.route(&route))
            .await?
            .map_err(routing_failure)?;

        let pharmacy_id = match decision {
            RoutingDecision::Routed { pharmacy_id, .. } => pharmacy_id,
            RoutingDecision::Blocked { reason } => {
                return Ok(rejected(AdmissionRejection::NotEligible {
                    product_name: priced.product.display_name(),
                    state: checked.state.to_string(),
                    reason: reason.to_string(),
                }));
            }
        };

        let cart = self.carts.find_or_create_cart(&request.cart_owner_id).await?;
        let line = build_line(request, &priced, checked, pharmacy_id, cart.id, self.policy);
        self.carts.insert_line(&line).await?;

        Ok(AdmissionOutcome::Admitted { line })
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        future: impl Future<Output = T>,
    ) -> Result<T, ApplicationError> {
        let limit = self.policy.lookup_timeout;
        tokio::time::timeout(limit, future).await.map_err(|_| ApplicationError::Timeout {
            operation,
            millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        })
    }

    fn record(
        &self,
        request: &AddToCartRequest,
        actor: &ActorContext,
        correlation_id: &str,
        outcome: &AdmissionOutcome,
    ) {
        let event = match outcome {
            AdmissionOutcome::Admitted { line } => {
                info!(
                    event_name = "cart.line_admitted",
                    correlation_id = %correlation_id,
                    line_id = %line.id,
                    product_id = %line.product_id,
                    pharmacy_id = %line.assigned_pharmacy_id,
                    state = %line.destination_state,
                    "cart line admitted"
                );
                cart_event(request, actor, correlation_id, "cart.line_admitted", AuditOutcome::Success)
                    .with_metadata("line_id", line.id.0.clone())
                    .with_metadata("pharmacy_id", line.assigned_pharmacy_id.0.clone())
                    .with_metadata("state", line.destination_state.as_str())
                    .with_metadata("price_snapshot", line.price_snapshot.to_string())
                    .with_metadata("quantity", line.quantity.to_string())
            }
            AdmissionOutcome::Rejected { rejection } => {
                info!(
                    event_name = "cart.line_rejected",
                    correlation_id = %correlation_id,
                    product_id = %request.product_id,
                    error_class = rejection.error_class(),
                    reason = %rejection,
                    "cart line rejected"
                );
                cart_event(request, actor, correlation_id, "cart.line_rejected", AuditOutcome::Rejected)
                    .with_metadata("error_class", rejection.error_class())
                    .with_metadata("reason", rejection.to_string())
            }
        };
        self.audit.emit(event);
    }
}

fn rejected(rejection: AdmissionRejection) -> AdmissionOutcome {
    AdmissionOutcome::Rejected { rejection }
}

fn routing_failure(error: RoutingError) -> ApplicationError {
    match error {
        RoutingError::Store(error) => error.into(),
        RoutingError::Remote(message) => ApplicationError::Integration(message),
        RoutingError::InvalidState(error) => {
            DomainError::InvariantViolation(format!("validated state rejected by router: {error}")).into()
        }
    }
}

fn cart_event(
    request: &AddToCartRequest,
    actor: &ActorContext,
    correlation_id: &str,
    event_type: &str,
    outcome: AuditOutcome,
) -> AuditEvent {
    AuditEvent::new(
        Some(request.cart_owner_id.clone()),
        correlation_id,
        event_type,
        AuditCategory::Cart,
        actor.user_id.0.clone(),
        outcome,
    )
    .with_metadata("product_id", request.product_id.0.clone())
    .with_metadata("destination", request.destination.kind())
}

fn build_line(
    request: &AddToCartRequest,
    priced: &PricedProduct,
    checked: Checked,
    pharmacy_id: PharmacyId,
    cart_id: CartId,
    policy: AdmissionPolicy,
) -> CartLine {
    let now = Utc::now();
    CartLine {
        id: CartLineId(Uuid::new_v4().to_string()),
        cart_id,
        product_id: priced.product.id.clone(),
        // Range was checked in `check_request`.
        quantity: u32::try_from(request.quantity).unwrap_or(1),
        price_snapshot: priced.price.tier_price,
        destination_state: checked.state,
        assigned_pharmacy_id: pharmacy_id,
        destination: request.destination.clone(),
        provider_id: checked.provider_id,
        prescription_url: request.prescription_url.clone().filter(|url| !url.trim().is_empty()),
        created_at: now,
        expires_at: now + policy.line_ttl,
    }
}
