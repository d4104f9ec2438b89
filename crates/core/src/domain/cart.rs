use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::{PatientId, PracticeId, ProviderId, UserId};
use crate::domain::pharmacy::PharmacyId;
use crate::domain::product::ProductId;
use crate::domain::state::StateCode;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CartId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CartLineId(pub String);

impl std::fmt::Display for CartLineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
}

/// Where a cart line ships. A line goes either to a patient or to the
/// ordering practice, never both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Destination {
    Patient { patient_id: PatientId, address: ShippingAddress },
    Practice { practice_id: PracticeId, address: ShippingAddress },
}

impl Destination {
    pub fn address(&self) -> &ShippingAddress {
        match self {
            Self::Patient { address, .. } | Self::Practice { address, .. } => address,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Patient { .. } => "patient",
            Self::Practice { .. } => "practice",
        }
    }

    /// Name of the address field shown to the user when the state is unusable.
    pub fn state_field_label(&self) -> &'static str {
        match self {
            Self::Patient { .. } => "patient shipping address state",
            Self::Practice { .. } => "practice shipping address state",
        }
    }

    pub fn patient_id(&self) -> Option<&PatientId> {
        match self {
            Self::Patient { patient_id, .. } => Some(patient_id),
            Self::Practice { .. } => None,
        }
    }

    pub fn ships_to_practice(&self) -> bool {
        matches!(self, Self::Practice { .. })
    }

    pub fn resolve_state(&self) -> Result<StateCode, DomainError> {
        let raw = self.address().state.trim();
        if raw.is_empty() {
            return Err(DomainError::InvariantViolation(format!(
                "{} is missing",
                self.state_field_label()
            )));
        }
        StateCode::parse(raw).map_err(|error| {
            DomainError::InvariantViolation(format!("{}: {error}", self.state_field_label()))
        })
    }
}

/// A persisted cart line. The pharmacy assignment is not optional: a line
/// exists only once routing has picked a pharmacy for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price_snapshot: Decimal,
    pub destination_state: StateCode,
    pub assigned_pharmacy_id: PharmacyId,
    pub destination: Destination,
    pub provider_id: Option<ProviderId>,
    pub prescription_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CartLine {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn line_total(&self) -> Decimal {
        self.price_snapshot * Decimal::from(self.quantity)
    }
}

/// Sum of unexpired lines at `now`.
pub fn active_cart_total(lines: &[CartLine], now: DateTime<Utc>) -> Decimal {
    lines.iter().filter(|line| !line.is_expired(now)).map(CartLine::line_total).sum()
}

/// Raw `addCartLine` payload as it reaches the data-access layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineRecord {
    pub id: CartLineId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub price_snapshot: Decimal,
    pub destination_state: String,
    pub assigned_pharmacy_id: Option<PharmacyId>,
    pub destination: Destination,
    pub provider_id: Option<ProviderId>,
    pub prescription_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TryFrom<CartLineRecord> for CartLine {
    type Error = DomainError;

    fn try_from(record: CartLineRecord) -> Result<Self, Self::Error> {
        let assigned_pharmacy_id = record.assigned_pharmacy_id.ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "cart line {} has no assigned pharmacy",
                record.id
            ))
        })?;
        let quantity = u32::try_from(record.quantity)
            .ok()
            .filter(|quantity| *quantity >= 1)
            .ok_or_else(|| {
                DomainError::InvariantViolation(format!(
                    "cart line {} has invalid quantity {}",
                    record.id, record.quantity
                ))
            })?;
        let destination_state = StateCode::parse(&record.destination_state).map_err(|error| {
            DomainError::InvariantViolation(format!("cart line {}: {error}", record.id))
        })?;

        Ok(Self {
            id: record.id,
            cart_id: record.cart_id,
            product_id: record.product_id,
            quantity,
            price_snapshot: record.price_snapshot,
            destination_state,
            assigned_pharmacy_id,
            destination: record.destination,
            provider_id: record.provider_id,
            prescription_url: record.prescription_url,
            created_at: record.created_at,
            expires_at: record.expires_at,
        })
    }
}
