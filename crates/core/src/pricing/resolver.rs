use tracing::debug;

use crate::domain::actor::{ActorContext, Role};
use crate::domain::pricing::filter_visible_products;
use crate::domain::product::{Product, ProductId};
use crate::ports::CatalogStore;
use crate::pricing::{
    override_scope_for, resolve_effective_prices, resolve_price, EffectivePrices, PriceError,
    ResolvedPrice,
};

/// A product together with the price its actor would pay for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricedProduct {
    pub product: Product,
    pub price: ResolvedPrice,
}

pub struct PriceResolver<S> {
    store: S,
}

impl<S> PriceResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: CatalogStore> PriceResolver<S> {
    pub async fn resolve(
        &self,
        product_id: &ProductId,
        actor: &ActorContext,
    ) -> Result<PricedProduct, PriceError> {
        let product = self
            .store
            .find_product(product_id)
            .await?
            .ok_or_else(|| PriceError::NotFound(product_id.clone()))?;
        if !product.active {
            return Err(PriceError::InactiveProduct(product.id));
        }

        let price_override = match override_scope_for(actor) {
            Some(scope) => self.store.find_override(&product.id, &scope).await?,
            None => None,
        };
        let price = resolve_price(&product, actor, price_override.as_ref())?;

        debug!(
            event_name = "pricing.resolved",
            product_id = %product.id,
            role = actor.role.as_str(),
            tier = ?price.tier,
            has_override = price.has_override,
            "resolved tier price"
        );

        Ok(PricedProduct { product, price })
    }

    /// `resolveEffectivePrice`: every tier as seen through the actor's override scope.
    pub async fn effective_prices(
        &self,
        product_id: &ProductId,
        actor: &ActorContext,
    ) -> Result<EffectivePrices, PriceError> {
        let product = self
            .store
            .find_product(product_id)
            .await?
            .ok_or_else(|| PriceError::NotFound(product_id.clone()))?;
        if !product.active {
            return Err(PriceError::InactiveProduct(product.id));
        }

        let price_override = match override_scope_for(actor) {
            Some(scope) => self.store.find_override(&product.id, &scope).await?,
            None => None,
        };

        Ok(resolve_effective_prices(&product, price_override.as_ref()))
    }

    /// Narrows `product_ids` to what the actor's topline rep lets them order.
    ///
    /// Admins and the topline rep themselves always see everything. Routing
    /// never consults this.
    pub async fn visible_products(
        &self,
        actor: &ActorContext,
        product_ids: &[ProductId],
    ) -> Result<Vec<ProductId>, PriceError> {
        let topline_rep_id = match (actor.role, actor.rep_scope()) {
            (Role::Admin | Role::Topline, _) | (_, None) => return Ok(product_ids.to_vec()),
            (_, Some(rep_id)) => rep_id,
        };

        let visibility = self.store.visibility_for_rep(topline_rep_id).await?;
        Ok(filter_visible_products(product_ids, &visibility, |id| id).into_iter().cloned().collect())
    }
}
