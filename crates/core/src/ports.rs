//! Storage seams the routing core reads from and writes to.
//!
//! Catalog data (products, pharmacies, overrides, rep scoping) is read-only
//! from the core's point of view. Cart writes are always scoped by owner.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::actor::UserId;
use crate::domain::cart::{Cart, CartLine, CartLineId};
use crate::domain::pharmacy::{Pharmacy, PharmacyId};
use crate::domain::pricing::{OverrideScope, PriceOverride, RepProductVisibility};
use crate::domain::product::{Product, ProductId};
use crate::errors::StoreError;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, StoreError>;

    /// Pharmacies assigned to the product, in any order.
    async fn pharmacies_for_product(&self, id: &ProductId) -> Result<Vec<Pharmacy>, StoreError>;

    async fn find_override(
        &self,
        product_id: &ProductId,
        scope: &OverrideScope,
    ) -> Result<Option<PriceOverride>, StoreError>;

    /// Pharmacies hidden from orders placed under a topline rep's scope.
    async fn excluded_pharmacies(&self, rep_scope_id: &UserId)
        -> Result<Vec<PharmacyId>, StoreError>;

    async fn visibility_for_rep(
        &self,
        topline_rep_id: &UserId,
    ) -> Result<Vec<RepProductVisibility>, StoreError>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn find_or_create_cart(&self, owner_id: &UserId) -> Result<Cart, StoreError>;

    /// Single all-or-nothing write of a fully resolved line.
    async fn insert_line(&self, line: &CartLine) -> Result<(), StoreError>;

    async fn list_active_lines(
        &self,
        owner_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CartLine>, StoreError>;

    /// Changes only the quantity; returns `None` when the owner has no such
    /// line or the line expired before `now`.
    async fn update_quantity(
        &self,
        owner_id: &UserId,
        line_id: &CartLineId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<CartLine>, StoreError>;

    async fn remove_line(&self, owner_id: &UserId, line_id: &CartLineId)
        -> Result<bool, StoreError>;
}

#[async_trait]
impl<T: CatalogStore + ?Sized> CatalogStore for Arc<T> {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        (**self).find_product(id).await
    }

    async fn pharmacies_for_product(&self, id: &ProductId) -> Result<Vec<Pharmacy>, StoreError> {
        (**self).pharmacies_for_product(id).await
    }

    async fn find_override(
        &self,
        product_id: &ProductId,
        scope: &OverrideScope,
    ) -> Result<Option<PriceOverride>, StoreError> {
        (**self).find_override(product_id, scope).await
    }

    async fn excluded_pharmacies(
        &self,
        rep_scope_id: &UserId,
    ) -> Result<Vec<PharmacyId>, StoreError> {
        (**self).excluded_pharmacies(rep_scope_id).await
    }

    async fn visibility_for_rep(
        &self,
        topline_rep_id: &UserId,
    ) -> Result<Vec<RepProductVisibility>, StoreError> {
        (**self).visibility_for_rep(topline_rep_id).await
    }
}

#[async_trait]
impl<T: CartStore + ?Sized> CartStore for Arc<T> {
    async fn find_or_create_cart(&self, owner_id: &UserId) -> Result<Cart, StoreError> {
        (**self).find_or_create_cart(owner_id).await
    }

    async fn insert_line(&self, line: &CartLine) -> Result<(), StoreError> {
        (**self).insert_line(line).await
    }

    async fn list_active_lines(
        &self,
        owner_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CartLine>, StoreError> {
        (**self).list_active_lines(owner_id, now).await
    }

    async fn update_quantity(
        &self,
        owner_id: &UserId,
        line_id: &CartLineId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<CartLine>, StoreError> {
        (**self).update_quantity(owner_id, line_id, quantity, now).await
    }

    async fn remove_line(
        &self,
        owner_id: &UserId,
        line_id: &CartLineId,
    ) -> Result<bool, StoreError> {
        (**self).remove_line(owner_id, line_id).await
    }
}
