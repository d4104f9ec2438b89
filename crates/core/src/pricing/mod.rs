//! Tier price resolution for an ordering actor.

pub mod resolver;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::actor::{ActorContext, Role};
use crate::domain::pricing::{OverrideScope, PriceOverride};
use crate::domain::product::{Product, ProductId};
use crate::errors::StoreError;

pub use resolver::{PricedProduct, PriceResolver};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTier {
    AdminCost,
    Topline,
    Downline,
    Retail,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPrice {
    pub tier: PriceTier,
    pub tier_price: Decimal,
    pub has_override: bool,
}

/// All three tier prices as seen through one override scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePrices {
    pub effective_retail_price: Decimal,
    pub effective_topline_price: Decimal,
    pub effective_downline_price: Decimal,
    pub has_override: bool,
}

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("product `{0}` was not found")]
    NotFound(ProductId),
    #[error("product `{0}` is inactive")]
    InactiveProduct(ProductId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Tier an actor orders at. Prescription products carry no rep commission,
/// so reps see the retail view for them.
pub fn tier_for(role: Role, product: &Product) -> PriceTier {
    match role {
        Role::Admin => PriceTier::AdminCost,
        Role::Topline | Role::Downline if product.requires_prescription => PriceTier::Retail,
        Role::Topline => PriceTier::Topline,
        Role::Downline => PriceTier::Downline,
        Role::Practice | Role::Provider => PriceTier::Retail,
    }
}

pub fn default_tier_price(product: &Product, tier: PriceTier) -> Decimal {
    let tier_price = match tier {
        PriceTier::AdminCost => None,
        PriceTier::Topline => product.topline_price,
        PriceTier::Downline => product.downline_price,
        PriceTier::Retail => product.retail_price,
    };
    tier_price.unwrap_or(product.base_price)
}

/// Override scope consulted for an actor; admins never take overrides.
pub fn override_scope_for(actor: &ActorContext) -> Option<OverrideScope> {
    match actor.role {
        Role::Admin => None,
        Role::Topline | Role::Downline => Some(OverrideScope::Rep(actor.user_id.clone())),
        Role::Practice | Role::Provider => {
            actor.practice_id.clone().map(OverrideScope::Practice)
        }
    }
}

fn override_value(price_override: &PriceOverride, tier: PriceTier) -> Option<Decimal> {
    match tier {
        PriceTier::AdminCost => None,
        PriceTier::Topline => price_override.topline_price,
        PriceTier::Downline => price_override.downline_price,
        PriceTier::Retail => price_override.retail_price,
    }
}

/// Unit price for `actor`. An override only applies when it belongs to the
/// same product and to the actor's own scope.
pub fn resolve_price(
    product: &Product,
    actor: &ActorContext,
    price_override: Option<&PriceOverride>,
) -> Result<ResolvedPrice, PriceError> {
    if !product.active {
        return Err(PriceError::InactiveProduct(product.id.clone()));
    }

    let tier = tier_for(actor.role, product);
    let default_price = default_tier_price(product, tier);
    let scope = override_scope_for(actor);

    let overridden = price_override
        .filter(|candidate| candidate.product_id == product.id)
        .filter(|candidate| scope.as_ref() == Some(&candidate.scope))
        .and_then(|candidate| override_value(candidate, tier));

    Ok(match overridden {
        Some(tier_price) => ResolvedPrice { tier, tier_price, has_override: true },
        None => ResolvedPrice { tier, tier_price: default_price, has_override: false },
    })
}

pub fn resolve_effective_prices(
    product: &Product,
    price_override: Option<&PriceOverride>,
) -> EffectivePrices {
    let price_override = price_override.filter(|candidate| candidate.product_id == product.id);
    let pick = |tier: PriceTier| {
        price_override
            .and_then(|candidate| override_value(candidate, tier))
            .unwrap_or_else(|| default_tier_price(product, tier))
    };

    let effective_retail_price = pick(PriceTier::Retail);
    let (effective_topline_price, effective_downline_price) = if product.requires_prescription {
        (effective_retail_price, effective_retail_price)
    } else {
        (pick(PriceTier::Topline), pick(PriceTier::Downline))
    };
    let has_override = price_override
        .map(|candidate| {
            candidate.retail_price.is_some()
                || (!product.requires_prescription
                    && (candidate.topline_price.is_some() || candidate.downline_price.is_some()))
        })
        .unwrap_or(false);

    EffectivePrices {
        effective_retail_price,
        effective_topline_price,
        effective_downline_price,
        has_override,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{resolve_effective_prices, resolve_price, PriceError, PriceTier};
    use crate::domain::actor::{ActorContext, PracticeId, Role, UserId};
    use crate::domain::pricing::{OverrideScope, PriceOverride};
    use crate::domain::product::{Product, ProductId};

    fn product(requires_prescription: bool) -> Product {
        Product {
            id: ProductId("prod-nad".to_string()),
            name: "NAD+".to_string(),
            dosage: Some("100mg/mL".to_string()),
            base_price: Decimal::new(6000, 2),
            topline_price: Some(Decimal::from(100)),
            downline_price: Some(Decimal::from(120)),
            retail_price: Some(Decimal::from(150)),
            requires_prescription,
            active: true,
            pharmacy_ids: Vec::new(),
        }
    }

    fn topline_override(rep: &str, price: i64) -> PriceOverride {
        PriceOverride {
            product_id: ProductId("prod-nad".to_string()),
            scope: OverrideScope::Rep(UserId(rep.to_string())),
            retail_price: None,
            topline_price: Some(Decimal::from(price)),
            downline_price: None,
        }
    }

    #[test]
    fn each_role_gets_its_default_tier() {
        let product = product(false);
        let cases = [
            (Role::Admin, PriceTier::AdminCost, Decimal::new(6000, 2)),
            (Role::Topline, PriceTier::Topline, Decimal::from(100)),
            (Role::Downline, PriceTier::Downline, Decimal::from(120)),
            (Role::Practice, PriceTier::Retail, Decimal::from(150)),
            (Role::Provider, PriceTier::Retail, Decimal::from(150)),
        ];

        for (role, tier, expected) in cases {
            let resolved = resolve_price(&product, &ActorContext::new("user", role), None)
                .expect("active product resolves");
            assert_eq!(resolved.tier, tier, "tier for {role:?}");
            assert_eq!(resolved.tier_price, expected, "price for {role:?}");
            assert!(!resolved.has_override);
        }
    }

    #[test]
    fn missing_tier_price_falls_back_to_base_price() {
        let mut product = product(false);
        product.downline_price = None;

        let resolved =
            resolve_price(&product, &ActorContext::new("rep-down", Role::Downline), None)
                .expect("resolves");
        assert_eq!(resolved.tier_price, Decimal::new(6000, 2));
    }

    #[test]
    fn override_applies_only_to_its_own_rep() {
        let product = product(false);
        let price_override = topline_override("rep-a", 85);

        let owner = resolve_price(
            &product,
            &ActorContext::new("rep-a", Role::Topline),
            Some(&price_override),
        )
        .expect("resolves");
        assert_eq!(owner.tier_price, Decimal::from(85));
        assert!(owner.has_override);

        let other = resolve_price(
            &product,
            &ActorContext::new("rep-b", Role::Topline),
            Some(&price_override),
        )
        .expect("resolves");
        assert_eq!(other.tier_price, Decimal::from(100));
        assert!(!other.has_override);
    }

    #[test]
    fn practice_override_replaces_retail() {
        let product = product(false);
        let price_override = PriceOverride {
            product_id: ProductId("prod-nad".to_string()),
            scope: OverrideScope::Practice(PracticeId("pr-1".to_string())),
            retail_price: Some(Decimal::from(140)),
            topline_price: None,
            downline_price: None,
        };

        let actor = ActorContext::new("prov-user", Role::Provider).with_practice("pr-1");
        let resolved = resolve_price(&product, &actor, Some(&price_override)).expect("resolves");
        assert_eq!(resolved.tier, PriceTier::Retail);
        assert_eq!(resolved.tier_price, Decimal::from(140));
        assert!(resolved.has_override);
    }

    #[test]
    fn prescription_products_show_reps_the_retail_view() {
        let product = product(true);

        for role in [Role::Topline, Role::Downline] {
            let resolved = resolve_price(&product, &ActorContext::new("rep", role), None)
                .expect("resolves");
            assert_eq!(resolved.tier, PriceTier::Retail);
            assert_eq!(resolved.tier_price, Decimal::from(150));
        }

        let prices = resolve_effective_prices(&product, Some(&topline_override("rep-a", 85)));
        assert_eq!(prices.effective_topline_price, Decimal::from(150));
        assert_eq!(prices.effective_downline_price, Decimal::from(150));
        assert!(!prices.has_override, "commission-tier overrides do not apply to rx products");
    }

    #[test]
    fn effective_prices_report_override_flag() {
        let product = product(false);

        let plain = resolve_effective_prices(&product, None);
        assert_eq!(plain.effective_topline_price, Decimal::from(100));
        assert!(!plain.has_override);

        let overridden = resolve_effective_prices(&product, Some(&topline_override("rep-a", 85)));
        assert_eq!(overridden.effective_topline_price, Decimal::from(85));
        assert_eq!(overridden.effective_retail_price, Decimal::from(150));
        assert!(overridden.has_override);
    }

    #[test]
    fn inactive_product_is_rejected() {
        let mut product = product(false);
        product.active = false;

        let error = resolve_price(&product, &ActorContext::new("rep", Role::Topline), None)
            .expect_err("inactive product");
        assert!(matches!(error, PriceError::InactiveProduct(ref id) if id.0 == "prod-nad"));
    }
}
