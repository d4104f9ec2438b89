use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::{PracticeId, UserId};
use crate::domain::product::ProductId;

/// Who a price override applies to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OverrideScope {
    Rep(UserId),
    Practice(PracticeId),
}

impl OverrideScope {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rep(_) => "rep",
            Self::Practice(_) => "practice",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Rep(id) => &id.0,
            Self::Practice(id) => &id.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceOverride {
    pub product_id: ProductId,
    pub scope: OverrideScope,
    pub retail_price: Option<Decimal>,
    pub topline_price: Option<Decimal>,
    pub downline_price: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepProductVisibility {
    pub topline_rep_id: UserId,
    pub product_id: ProductId,
    pub visible: bool,
}

/// Drops products a topline rep has hidden from their downline ordering views.
///
/// Products without a visibility row stay visible. This is a presentation
/// filter only; routing never consults it.
pub fn filter_visible_products<'a, T, F>(
    items: &'a [T],
    visibility: &[RepProductVisibility],
    product_id: F,
) -> Vec<&'a T>
where
    F: Fn(&T) -> &ProductId,
{
    items
        .iter()
        .filter(|item| {
            let id = product_id(item);
            visibility.iter().find(|row| &row.product_id == id).map(|row| row.visible).unwrap_or(true)
        })
        .collect()
}
