use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::actor::UserId;
use crate::domain::pharmacy::{Pharmacy, PharmacyId};
use crate::domain::product::ProductId;
use crate::domain::state::StateCode;
use crate::ports::CatalogStore;
use crate::routing::RoutingError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligiblePharmacy {
    pub pharmacy_id: PharmacyId,
    pub priority: u32,
    /// Whether `priority` came from the pharmacy's map or the fallback sentinel.
    pub explicit_priority: bool,
}

/// Orders the pharmacies able to ship to `state`, best first.
///
/// Inactive pharmacies, pharmacies not servicing the state, and anything in
/// `exclusions` are dropped. Ties on priority break on pharmacy id.
pub fn eligible_pharmacies(
    pharmacies: &[Pharmacy],
    state: StateCode,
    exclusions: &[PharmacyId],
) -> Vec<EligiblePharmacy> {
    let mut eligible: Vec<EligiblePharmacy> = pharmacies
        .iter()
        .filter(|pharmacy| pharmacy.serves(state))
        .filter(|pharmacy| !exclusions.contains(&pharmacy.id))
        .map(|pharmacy| {
            let explicit = pharmacy.explicit_priority(state);
            EligiblePharmacy {
                pharmacy_id: pharmacy.id.clone(),
                priority: pharmacy.priority_for(state),
                explicit_priority: explicit.is_some(),
            }
        })
        .collect();

    eligible.sort_by(|left, right| {
        left.priority.cmp(&right.priority).then_with(|| left.pharmacy_id.cmp(&right.pharmacy_id))
    });
    eligible.dedup_by(|left, right| left.pharmacy_id == right.pharmacy_id);
    eligible
}

pub struct PharmacyEligibilityIndex<S> {
    store: S,
}

impl<S> PharmacyEligibilityIndex<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: CatalogStore> PharmacyEligibilityIndex<S> {
    /// An empty result is a normal answer meaning nobody can fulfil the order.
    pub async fn eligible(
        &self,
        product_id: &ProductId,
        destination_state: &str,
        rep_scope_id: Option<&UserId>,
    ) -> Result<Vec<EligiblePharmacy>, RoutingError> {
        let state = StateCode::parse(destination_state)?;

        let pharmacies = self.store.pharmacies_for_product(product_id).await?;
        let exclusions = match rep_scope_id {
            Some(rep_id) if !pharmacies.is_empty() => self.store.excluded_pharmacies(rep_id).await?,
            _ => Vec::new(),
        };

        let eligible = eligible_pharmacies(&pharmacies, state, &exclusions);
        debug!(
            event_name = "routing.eligibility_computed",
            product_id = %product_id,
            state = %state,
            assigned = pharmacies.len(),
            excluded = exclusions.len(),
            eligible = eligible.len(),
            "computed eligible pharmacies"
        );

        Ok(eligible)
    }
}
