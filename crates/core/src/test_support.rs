//! In-process fakes for exercising the core against its store ports.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::actor::UserId;
use crate::domain::cart::{Cart, CartId, CartLine, CartLineId};
use crate::domain::pharmacy::{Pharmacy, PharmacyId};
use crate::domain::pricing::{OverrideScope, PriceOverride, RepProductVisibility};
use crate::domain::product::{Product, ProductId};
use crate::domain::state::StateCode;
use crate::errors::StoreError;
use crate::ports::{CartStore, CatalogStore};

pub fn state(code: &str) -> StateCode {
    StateCode::parse(code).expect("valid state code")
}

pub fn pharmacy(id: &str, states: &[(&str, Option<u32>)]) -> Pharmacy {
    Pharmacy {
        id: PharmacyId(id.to_string()),
        name: format!("Pharmacy {id}"),
        active: true,
        states_serviced: states.iter().map(|(code, _)| state(code)).collect(),
        priority_map: states
            .iter()
            .filter_map(|(code, priority)| priority.map(|value| (state(code), value)))
            .collect(),
    }
}

pub fn product(id: &str, pharmacy_ids: &[&str]) -> Product {
    Product {
        id: ProductId(id.to_string()),
        name: "Tirzepatide".to_string(),
        dosage: Some("5mg".to_string()),
        base_price: Decimal::from(60),
        topline_price: Some(Decimal::from(100)),
        downline_price: Some(Decimal::from(120)),
        retail_price: Some(Decimal::from(150)),
        requires_prescription: false,
        active: true,
        pharmacy_ids: pharmacy_ids.iter().map(|id| PharmacyId(id.to_string())).collect(),
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    products: Mutex<BTreeMap<ProductId, Product>>,
    pharmacies: Mutex<BTreeMap<PharmacyId, Pharmacy>>,
    overrides: Mutex<Vec<PriceOverride>>,
    exclusions: Mutex<Vec<(UserId, PharmacyId)>>,
    visibility: Mutex<Vec<RepProductVisibility>>,
    pub calls: AtomicUsize,
    pub delay: Mutex<Option<Duration>>,
    pub fail: Mutex<bool>,
}

impl FakeCatalog {
    pub fn with_product(self, product: Product) -> Self {
        lock(&self.products).insert(product.id.clone(), product);
        self
    }

    pub fn with_pharmacy(self, pharmacy: Pharmacy) -> Self {
        lock(&self.pharmacies).insert(pharmacy.id.clone(), pharmacy);
        self
    }

    pub fn with_override(self, price_override: PriceOverride) -> Self {
        lock(&self.overrides).push(price_override);
        self
    }

    pub fn with_exclusion(self, rep_id: &str, pharmacy_id: &str) -> Self {
        lock(&self.exclusions)
            .push((UserId(rep_id.to_string()), PharmacyId(pharmacy_id.to_string())));
        self
    }

    pub fn with_hidden_product(self, rep_id: &str, product_id: &str) -> Self {
        lock(&self.visibility).push(RepProductVisibility {
            topline_rep_id: UserId(rep_id.to_string()),
            product_id: ProductId(product_id.to_string()),
            visible: false,
        });
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn set_failing(&self) {
        *lock(&self.fail) = true;
    }

    async fn touch(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *lock(&self.fail) {
            return Err(StoreError::Unavailable("catalog connection refused".to_string()));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl CatalogStore for FakeCatalog {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        self.touch().await?;
        Ok(lock(&self.products).get(id).cloned())
    }

    async fn pharmacies_for_product(&self, id: &ProductId) -> Result<Vec<Pharmacy>, StoreError> {
        self.touch().await?;
        let assigned = lock(&self.products)
            .get(id)
            .map(|product| product.pharmacy_ids.clone())
            .unwrap_or_default();
        let pharmacies = lock(&self.pharmacies);
        Ok(assigned.iter().filter_map(|pharmacy_id| pharmacies.get(pharmacy_id).cloned()).collect())
    }

    async fn find_override(
        &self,
        product_id: &ProductId,
        scope: &OverrideScope,
    ) -> Result<Option<PriceOverride>, StoreError> {
        self.touch().await?;
        Ok(lock(&self.overrides)
            .iter()
            .find(|row| &row.product_id == product_id && &row.scope == scope)
            .cloned())
    }

    async fn excluded_pharmacies(
        &self,
        rep_scope_id: &UserId,
    ) -> Result<Vec<PharmacyId>, StoreError> {
        self.touch().await?;
        Ok(lock(&self.exclusions)
            .iter()
            .filter(|(rep, _)| rep == rep_scope_id)
            .map(|(_, pharmacy)| pharmacy.clone())
            .collect())
    }

    async fn visibility_for_rep(
        &self,
        topline_rep_id: &UserId,
    ) -> Result<Vec<RepProductVisibility>, StoreError> {
        self.touch().await?;
        Ok(lock(&self.visibility)
            .iter()
            .filter(|row| &row.topline_rep_id == topline_rep_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeCart {
    carts: Mutex<BTreeMap<String, Cart>>,
    lines: Mutex<Vec<CartLine>>,
    pub fail_inserts: Mutex<bool>,
}

impl FakeCart {
    pub fn lines(&self) -> Vec<CartLine> {
        lock(&self.lines).clone()
    }

    pub fn cart_count(&self) -> usize {
        lock(&self.carts).len()
    }
}

#[async_trait]
impl CartStore for FakeCart {
    async fn find_or_create_cart(&self, owner_id: &UserId) -> Result<Cart, StoreError> {
        let mut carts = lock(&self.carts);
        let cart = carts.entry(owner_id.0.clone()).or_insert_with(|| Cart {
            id: CartId(format!("cart-{}", owner_id.0)),
            owner_id: owner_id.clone(),
            created_at: Utc::now(),
        });
        Ok(cart.clone())
    }

    async fn insert_line(&self, line: &CartLine) -> Result<(), StoreError> {
        if *lock(&self.fail_inserts) {
            return Err(StoreError::Unavailable("cart_line insert failed".to_string()));
        }
        lock(&self.lines).push(line.clone());
        Ok(())
    }

    async fn list_active_lines(
        &self,
        owner_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<CartLine>, StoreError> {
        let cart_id = lock(&self.carts).get(&owner_id.0).map(|cart| cart.id.clone());
        Ok(lock(&self.lines)
            .iter()
            .filter(|line| Some(&line.cart_id) == cart_id.as_ref() && !line.is_expired(now))
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
        let cart_id = lock(&self.carts).get(&owner_id.0).map(|cart| cart.id.clone());
        let mut lines = lock(&self.lines);
        let found = lines
            .iter_mut()
            .find(|line| {
                &line.id == line_id && Some(&line.cart_id) == cart_id.as_ref() && !line.is_expired(now)
            });
        Ok(found.map(|line| {
            line.quantity = quantity;
            line.clone()
        }))
    }

    async fn remove_line(
        &self,
        owner_id: &UserId,
        line_id: &CartLineId,
    ) -> Result<bool, StoreError> {
        let cart_id = lock(&self.carts).get(&owner_id.0).map(|cart| cart.id.clone());
        let mut lines = lock(&self.lines);
        let before = lines.len();
        lines.retain(|line| !(&line.id == line_id && Some(&line.cart_id) == cart_id.as_ref()));
        Ok(lines.len() != before)
    }
}
