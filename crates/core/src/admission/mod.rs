//! Cart line admission: the only path by which a cart line comes to exist.
//!
//! Every precondition is checked before anything is written, and a line is
//! inserted in one write only after routing has named a pharmacy for it.

pub mod cart;
pub mod service;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppConfig;
use crate::domain::actor::{ProviderId, UserId};
use crate::domain::cart::{CartLine, CartLineId, Destination};
use crate::domain::product::ProductId;
use crate::errors::ApplicationError;

pub use cart::CartView;
pub use service::CartAdmission;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdmissionPolicy {
    pub line_ttl: chrono::Duration,
    /// Upper bound on each price or routing lookup.
    pub lookup_timeout: Duration,
}

impl AdmissionPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self { line_ttl: config.cart.line_ttl(), lookup_timeout: config.routing.timeout() }
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self { line_ttl: chrono::Duration::hours(24), lookup_timeout: Duration::from_millis(5_000) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddToCartRequest {
    pub cart_owner_id: UserId,
    pub product_id: ProductId,
    /// Kept signed so that zero and negative input reach the quantity check.
    pub quantity: i64,
    pub destination: Destination,
    #[serde(default)]
    pub provider_id: Option<ProviderId>,
    #[serde(default)]
    pub prescription_url: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// A business refusal. These are expected outcomes shown to the user verbatim.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdmissionRejection {
    #[error("quantity must be at least 1, got {quantity}")]
    InvalidQuantity { quantity: i64 },
    #[error("{field} is missing or is not a valid US state code")]
    InvalidAddress { field: String },
    #[error("select a provider before ordering for a patient")]
    MissingProvider,
    #[error("this cart belongs to another user")]
    ForeignCart,
    #[error("product `{product_id}` was not found")]
    ProductNotFound { product_id: ProductId },
    #[error("product `{product_id}` is inactive and cannot be ordered")]
    InactiveProduct { product_id: ProductId },
    #[error("{product_name} cannot be fulfilled in {state}: {reason}")]
    NotEligible { product_name: String, state: String, reason: String },
}

impl AdmissionRejection {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::InvalidQuantity { .. } => "invalid_quantity",
            Self::InvalidAddress { .. } => "invalid_address",
            Self::MissingProvider => "missing_provider",
            Self::ForeignCart => "foreign_cart",
            Self::ProductNotFound { .. } => "product_not_found",
            Self::InactiveProduct { .. } => "inactive_product",
            Self::NotEligible { .. } => "not_eligible",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdmissionOutcome {
    Admitted { line: CartLine },
    Rejected { rejection: AdmissionRejection },
}

impl AdmissionOutcome {
    pub fn line(&self) -> Option<&CartLine> {
        match self {
            Self::Admitted { line } => Some(line),
            Self::Rejected { .. } => None,
        }
    }

    pub fn rejection(&self) -> Option<&AdmissionRejection> {
        match self {
            Self::Admitted { .. } => None,
            Self::Rejected { rejection } => Some(rejection),
        }
    }
}

/// Failure of a read or edit against an existing cart.
#[derive(Debug, Error)]
pub enum CartCommandError {
    #[error(transparent)]
    Rejected(AdmissionRejection),
    #[error("cart line `{0}` was not found")]
    LineNotFound(CartLineId),
    #[error(transparent)]
    Application(#[from] ApplicationError),
}
