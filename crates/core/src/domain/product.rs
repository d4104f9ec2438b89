use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::pharmacy::PharmacyId;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Catalog entry with per-tier list prices.
///
/// `base_price` is the admin cost and the fallback for any tier left unset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub dosage: Option<String>,
    pub base_price: Decimal,
    pub topline_price: Option<Decimal>,
    pub downline_price: Option<Decimal>,
    pub retail_price: Option<Decimal>,
    pub requires_prescription: bool,
    pub active: bool,
    pub pharmacy_ids: Vec<PharmacyId>,
}

impl Product {
    pub fn has_pharmacy_assignments(&self) -> bool {
        !self.pharmacy_ids.is_empty()
    }

    pub fn display_name(&self) -> String {
        match &self.dosage {
            Some(dosage) if !dosage.trim().is_empty() => format!("{} {}", self.name, dosage.trim()),
            _ => self.name.clone(),
        }
    }
}
