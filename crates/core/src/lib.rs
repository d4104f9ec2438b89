pub mod admission;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ports;
pub mod pricing;
pub mod routing;

#[cfg(test)]
mod test_support;

pub use admission::{
    AddToCartRequest, AdmissionOutcome, AdmissionPolicy, AdmissionRejection, CartAdmission,
    CartCommandError, CartView,
};
pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use domain::actor::{ActorContext, Role, UserId};
pub use domain::cart::{CartLine, CartLineId, Destination, ShippingAddress};
pub use domain::pharmacy::{Pharmacy, PharmacyId};
pub use domain::product::{Product, ProductId};
pub use domain::state::StateCode;
pub use errors::{ApplicationError, DomainError, InterfaceError, StoreError};
pub use ports::{CartStore, CatalogStore};
pub use pricing::{EffectivePrices, PriceError, PriceResolver, ResolvedPrice};
pub use routing::{
    LocalOrderRouter, OrderRouter, RouteOrderRequest, RouteOrderResponse, RouteRequest,
    RoutingDecision, RoutingError,
};
