pub mod eligibility;
pub mod engine;

use thiserror::Error;

use crate::domain::state::InvalidStateCode;
use crate::errors::StoreError;

pub use eligibility::{eligible_pharmacies, EligiblePharmacy, PharmacyEligibilityIndex};
pub use engine::{
    decide, BlockReason, LocalOrderRouter, OrderRouter, RouteOrderRequest, RouteOrderResponse,
    RouteRequest, RoutingBasis, RoutingDecision,
};

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error(transparent)]
    InvalidState(#[from] InvalidStateCode),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("remote routing service failed: {0}")]
    Remote(String),
}
