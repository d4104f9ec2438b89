//! Picks the pharmacy an order line ships from, or says why none can.
//!
//! Decisions are pure reads. A blocked decision is an ordinary result and
//! never an error; `RoutingError` is reserved for bad input and store trouble.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::actor::UserId;
use crate::domain::pharmacy::PharmacyId;
use crate::domain::product::ProductId;
use crate::domain::state::StateCode;
use crate::ports::CatalogStore;
use crate::routing::eligibility::{EligiblePharmacy, PharmacyEligibilityIndex};
use crate::routing::RoutingError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingBasis {
    StatePriority,
    Fallback,
    Remote,
}

impl RoutingBasis {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::StatePriority => "state-specific priority match",
            Self::Fallback => "default/fallback pharmacy",
            Self::Remote => "selected by routing service",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockReason {
    NoPharmacyForState { state: StateCode },
    /// A remote router refused without a structured reason we understand.
    Declined { reason: String },
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPharmacyForState { state } => {
                write!(f, "no pharmacy serves {state} for this product")
            }
            Self::Declined { reason } => f.write_str(reason),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoutingDecision {
    Routed { pharmacy_id: PharmacyId, priority: Option<u32>, basis: RoutingBasis, reason: String },
    Blocked { reason: BlockReason },
}

impl RoutingDecision {
    pub fn routed(&self) -> Option<&PharmacyId> {
        match self {
            Self::Routed { pharmacy_id, .. } => Some(pharmacy_id),
            Self::Blocked { .. } => None,
        }
    }

    pub fn reason_text(&self) -> String {
        match self {
            Self::Routed { reason, .. } => reason.clone(),
            Self::Blocked { reason } => reason.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteRequest {
    pub product_id: ProductId,
    pub destination_state: String,
    pub rep_scope_id: Option<UserId>,
}

impl RouteRequest {
    pub fn new(product_id: ProductId, destination_state: impl Into<String>) -> Self {
        Self { product_id, destination_state: destination_state.into(), rep_scope_id: None }
    }

    pub fn with_rep_scope(mut self, rep_scope_id: Option<UserId>) -> Self {
        self.rep_scope_id = rep_scope_id;
        self
    }
}

/// Turns an ordered candidate list into a decision. The head of the list wins.
pub fn decide(state: StateCode, candidates: &[EligiblePharmacy]) -> RoutingDecision {
    match candidates.first() {
        Some(best) => {
            let basis =
                if best.explicit_priority { RoutingBasis::StatePriority } else { RoutingBasis::Fallback };
            RoutingDecision::Routed {
                pharmacy_id: best.pharmacy_id.clone(),
                priority: best.explicit_priority.then_some(best.priority),
                basis,
                reason: basis.reason().to_string(),
            }
        }
        None => RoutingDecision::Blocked { reason: BlockReason::NoPharmacyForState { state } },
    }
}

/// The `routeOrder` seam. Implementations must not write anything.
#[async_trait]
pub trait OrderRouter: Send + Sync {
    async fn route(&self, request: &RouteRequest) -> Result<RoutingDecision, RoutingError>;
}

#[async_trait]
impl<T: OrderRouter + ?Sized> OrderRouter for Arc<T> {
    async fn route(&self, request: &RouteRequest) -> Result<RoutingDecision, RoutingError> {
        (**self).route(request).await
    }
}

pub struct LocalOrderRouter<S> {
    index: PharmacyEligibilityIndex<S>,
}

impl<S> LocalOrderRouter<S> {
    pub fn new(store: S) -> Self {
        Self { index: PharmacyEligibilityIndex::new(store) }
    }
}

#[async_trait]
impl<S: CatalogStore> OrderRouter for LocalOrderRouter<S> {
    async fn route(&self, request: &RouteRequest) -> Result<RoutingDecision, RoutingError> {
        let state = StateCode::parse(&request.destination_state)?;
        let candidates = self
            .index
            .eligible(&request.product_id, state.as_str(), request.rep_scope_id.as_ref())
            .await?;
        let decision = decide(state, &candidates);

        info!(
            event_name = "routing.decided",
            product_id = %request.product_id,
            state = %state,
            candidates = candidates.len(),
            pharmacy_id = decision.routed().map(|id| id.0.as_str()).unwrap_or(""),
            reason = %decision.reason_text(),
            "routing decision computed"
        );

        Ok(decision)
    }
}

/// `routeOrder` request body as exchanged with a routing service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOrderRequest {
    pub product_id: String,
    pub destination_state: String,
    #[serde(default)]
    pub user_topline_rep_id: Option<String>,
}

impl From<&RouteRequest> for RouteOrderRequest {
    fn from(request: &RouteRequest) -> Self {
        Self {
            product_id: request.product_id.0.clone(),
            destination_state: request.destination_state.clone(),
            user_topline_rep_id: request.rep_scope_id.as_ref().map(|id| id.0.clone()),
        }
    }
}

impl From<RouteOrderRequest> for RouteRequest {
    fn from(body: RouteOrderRequest) -> Self {
        Self {
            product_id: ProductId(body.product_id),
            destination_state: body.destination_state,
            rep_scope_id: body
                .user_topline_rep_id
                .filter(|id| !id.trim().is_empty())
                .map(UserId),
        }
    }
}

/// `{ pharmacy_id }` on success, `{ pharmacy_id: null, reason }` when blocked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOrderResponse {
    pub pharmacy_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basis: Option<RoutingBasis>,
}

impl From<&RoutingDecision> for RouteOrderResponse {
    fn from(decision: &RoutingDecision) -> Self {
        match decision {
            RoutingDecision::Routed { pharmacy_id, priority, basis, reason } => Self {
                pharmacy_id: Some(pharmacy_id.0.clone()),
                reason: Some(reason.clone()),
                priority: *priority,
                basis: Some(*basis),
            },
            RoutingDecision::Blocked { reason } => {
                Self { pharmacy_id: None, reason: Some(reason.to_string()), priority: None, basis: None }
            }
        }
    }
}

impl RouteOrderResponse {
    /// Reads a remote answer back into a decision for `state`.
    pub fn into_decision(self, state: StateCode) -> RoutingDecision {
        match self.pharmacy_id.filter(|id| !id.trim().is_empty()) {
            Some(pharmacy_id) => {
                let basis = self.basis.unwrap_or(RoutingBasis::Remote);
                RoutingDecision::Routed {
                    pharmacy_id: PharmacyId(pharmacy_id),
                    priority: self.priority,
                    basis,
                    reason: self.reason.unwrap_or_else(|| basis.reason().to_string()),
                }
            }
            None => {
                let reason = match self.reason {
                    Some(reason) if !reason.trim().is_empty() => BlockReason::Declined { reason },
                    _ => BlockReason::NoPharmacyForState { state },
                };
                RoutingDecision::Blocked { reason }
            }
        }
    }
}
