use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::admission::{AdmissionRejection, CartAdmission, CartCommandError};
use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::actor::{ActorContext, Role, UserId};
use crate::domain::cart::{active_cart_total, CartLine, CartLineId};
use crate::errors::ApplicationError;
use crate::ports::CartStore;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartView {
    pub owner_id: UserId,
    pub lines: Vec<CartLine>,
    pub active_total: Decimal,
}

fn ensure_owner(
    actor: &ActorContext,
    owner_id: &UserId,
    allow_admin: bool,
) -> Result<(), CartCommandError> {
    if &actor.user_id == owner_id || (allow_admin && actor.role == Role::Admin) {
        return Ok(());
    }
    Err(CartCommandError::Rejected(AdmissionRejection::ForeignCart))
}

impl<S, R, C, A> CartAdmission<S, R, C, A>
where
    C: CartStore,
    A: AuditSink,
{
    /// Unexpired lines of one cart. Admins may look at any cart.
    pub async fn active_lines(
        &self,
        actor: &ActorContext,
        owner_id: &UserId,
    ) -> Result<CartView, CartCommandError> {
        ensure_owner(actor, owner_id, true)?;
        let now = Utc::now();
        let lines = self.carts.list_active_lines(owner_id, now).await.map_err(ApplicationError::from)?;
        let active_total = active_cart_total(&lines, now);
        Ok(CartView { owner_id: owner_id.clone(), lines, active_total })
    }

    /// Only the quantity changes; the price snapshot and pharmacy stay as admitted.
    pub async fn update_quantity(
        &self,
        actor: &ActorContext,
        owner_id: &UserId,
        line_id: &CartLineId,
        quantity: i64,
    ) -> Result<CartLine, CartCommandError> {
        ensure_owner(actor, owner_id, false)?;
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|quantity| *quantity >= 1)
            .ok_or(CartCommandError::Rejected(AdmissionRejection::InvalidQuantity { quantity }))?;

        let line = self
            .carts
            .update_quantity(owner_id, line_id, quantity, Utc::now())
            .await
            .map_err(ApplicationError::from)?
            .ok_or_else(|| CartCommandError::LineNotFound(line_id.clone()))?;

        info!(
            event_name = "cart.line_quantity_updated",
            line_id = %line_id,
            quantity,
            "cart line quantity updated"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(owner_id.clone()),
                line_id.0.clone(),
                "cart.line_quantity_updated",
                AuditCategory::Cart,
                actor.user_id.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("quantity", quantity.to_string()),
        );
        Ok(line)
    }

    pub async fn remove_line(
        &self,
        actor: &ActorContext,
        owner_id: &UserId,
        line_id: &CartLineId,
    ) -> Result<(), CartCommandError> {
        ensure_owner(actor, owner_id, false)?;
        let removed =
            self.carts.remove_line(owner_id, line_id).await.map_err(ApplicationError::from)?;
        if !removed {
            return Err(CartCommandError::LineNotFound(line_id.clone()));
        }

        info!(event_name = "cart.line_removed", line_id = %line_id, "cart line removed");
        self.audit.emit(AuditEvent::new(
            Some(owner_id.clone()),
            line_id.0.clone(),
            "cart.line_removed",
            AuditCategory::Cart,
            actor.user_id.0.clone(),
            AuditOutcome::Success,
        ));
        Ok(())
    }
}
