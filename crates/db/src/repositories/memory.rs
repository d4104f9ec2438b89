use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use rxroute_core::domain::actor::UserId;
use rxroute_core::domain::cart::{Cart, CartId, CartLine, CartLineId};
use rxroute_core::domain::pharmacy::{Pharmacy, PharmacyId};
use rxroute_core::domain::pricing::{OverrideScope, PriceOverride, RepProductVisibility};
use rxroute_core::domain::product::{Product, ProductId};
use rxroute_core::errors::StoreError;
use rxroute_core::ports::{CartStore, CatalogStore};

#[derive(Default)]
pub struct InMemoryCatalogRepository {
    products: RwLock<HashMap<String, Product>>,
    pharmacies: RwLock<HashMap<String, Pharmacy>>,
    overrides: RwLock<HashMap<(String, OverrideScope), PriceOverride>>,
    visibility: RwLock<HashMap<(String, String), bool>>,
    exclusions: RwLock<Vec<(UserId, PharmacyId)>>,
}

impl InMemoryCatalogRepository {
    pub async fn save_product(&self, product: Product) {
        self.products.write().await.insert(product.id.0.clone(), product);
    }

    pub async fn save_pharmacy(&self, pharmacy: Pharmacy) {
        self.pharmacies.write().await.insert(pharmacy.id.0.clone(), pharmacy);
    }

    pub async fn save_override(&self, price_override: PriceOverride) {
        let key = (price_override.product_id.0.clone(), price_override.scope.clone());
        self.overrides.write().await.insert(key, price_override);
    }

    pub async fn set_visibility(&self, visibility: RepProductVisibility) {
        self.visibility.write().await.insert(
            (visibility.topline_rep_id.0, visibility.product_id.0),
            visibility.visible,
        );
    }

    pub async fn exclude_pharmacy(&self, topline_rep_id: UserId, pharmacy_id: PharmacyId) {
        let mut exclusions = self.exclusions.write().await;
        if !exclusions.iter().any(|(rep, pharmacy)| rep == &topline_rep_id && pharmacy == &pharmacy_id)
        {
            exclusions.push((topline_rep_id, pharmacy_id));
        }
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogRepository {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        let products = self.products.read().await;
        Ok(products.get(&id.0).cloned())
    }

    async fn pharmacies_for_product(&self, id: &ProductId) -> Result<Vec<Pharmacy>, StoreError> {
        let products = self.products.read().await;
        let Some(product) = products.get(&id.0) else {
            return Ok(Vec::new());
        };
        let pharmacies = self.pharmacies.read().await;
        Ok(product
            .pharmacy_ids
            .iter()
            .filter_map(|pharmacy_id| pharmacies.get(&pharmacy_id.0).cloned())
            .collect())
    }

    async fn find_override(
        &self,
        product_id: &ProductId,
        scope: &OverrideScope,
    ) -> Result<Option<PriceOverride>, StoreError> {
        let overrides = self.overrides.read().await;
        Ok(overrides.get(&(product_id.0.clone(), scope.clone())).cloned())
    }

    async fn excluded_pharmacies(
        &self,
        rep_scope_id: &UserId,
    ) -> Result<Vec<PharmacyId>, StoreError> {
        let exclusions = self.exclusions.read().await;
        Ok(exclusions
            .iter()
            .filter(|(rep, _)| rep == rep_scope_id)
            .map(|(_, pharmacy)| pharmacy.clone())
            .collect())
    }

    async fn visibility_for_rep(
        &self,
        topline_rep_id: &UserId,
    ) -> Result<Vec<RepProductVisibility>, StoreError> {
        let visibility = self.visibility.read().await;
        let mut rows: Vec<RepProductVisibility> = visibility
            .iter()
            .filter(|((rep, _), _)| rep == &topline_rep_id.0)
            .map(|((rep, product), visible)| RepProductVisibility {
                topline_rep_id: UserId(rep.clone()),
                product_id: ProductId(product.clone()),
                visible: *visible,
            })
            .collect();
        rows.sort_by(|left, right| left.product_id.0.cmp(&right.product_id.0));
        Ok(rows)
    }
}

#[derive(Default)]
pub struct InMemoryCartRepository {
    carts: RwLock<HashMap<String, Cart>>,
    lines: RwLock<Vec<CartLine>>,
}

impl InMemoryCartRepository {
    async fn cart_id_for(&self, owner_id: &UserId) -> Option<CartId> {
        self.carts.read().await.get(&owner_id.0).map(|cart| cart.id.clone())
    }
}

#[async_trait]
impl CartStore for InMemoryCartRepository {
    async fn find_or_create_cart(&self, owner_id: &UserId) -> Result<Cart, StoreError> {
        let mut carts = self.carts.write().await;
        let cart = carts.entry(owner_id.0.clone()).or_insert_with(|| Cart {
            id: CartId(Uuid::new_v4().to_string()),
            owner_id: owner_id.clone(),
            created_at: Utc::now(),
        });
        Ok(cart.clone())
    }

    async fn insert_line(&self, line: &CartLine) -> Result<(), StoreError> {
        let known_cart = self.carts.read().await.values().any(|cart| cart.id == line.cart_id);
        if !known_cart {
            return Err(StoreError::Invariant(format!(
                "cart line {} references unknown cart {}",
                line.id, line.cart_id.0
            )));
        }
        let mut lines = self.lines.write().await;
        if lines.iter().any(|existing| existing.id == line.id) {
            return Err(StoreError::Invariant(format!("cart line {} already exists", line.id)));
        }
        lines.push(line.clone());
        Ok(())
    }

    async fn list_active_lines(
        &self,
        owner_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CartLine>, StoreError> {
        let Some(cart_id) = self.cart_id_for(owner_id).await else {
            return Ok(Vec::new());
        };
        let lines = self.lines.read().await;
        Ok(lines
            .iter()
            .filter(|line| line.cart_id == cart_id && !line.is_expired(now))
            .cloned()
            .collect())
    }

    async fn update_quantity(
        &self,
        owner_id: &UserId,
        line_id: &CartLineId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<CartLine>, StoreError> {
        if quantity == 0 {
            return Err(StoreError::Invariant(format!("cart line {line_id} cannot have quantity 0")));
        }
        let Some(cart_id) = self.cart_id_for(owner_id).await else {
            return Ok(None);
        };
        let mut lines = self.lines.write().await;
        Ok(lines
            .iter_mut()
            .find(|line| &line.id == line_id && line.cart_id == cart_id && !line.is_expired(now))
            .map(|line| {
                line.quantity = quantity;
                line.clone()
            }))
    }

    async fn remove_line(
        &self,
        owner_id: &UserId,
        line_id: &CartLineId,
    ) -> Result<bool, StoreError> {
        let Some(cart_id) = self.cart_id_for(owner_id).await else {
            return Ok(false);
        };
        let mut lines = self.lines.write().await;
        let before = lines.len();
        lines.retain(|line| !(&line.id == line_id && line.cart_id == cart_id));
        Ok(lines.len() != before)
    }
}
