//! Order finalization: the terminal, non-reversible step.
//!
//! Converting the draft into an immutable order is at-most-once on the
//! backend; an ambiguous failure is surfaced and never blindly retried,
//! since retrying a successful conversion could duplicate the order.

use serde::Serialize;
use tracing::instrument;

use tidepool_core::OrderLifecycle;

use crate::draft::DraftPatch;
use crate::error::CheckoutError;
use crate::remote::{DraftOrderApi, FinalOrder};
use crate::session::CheckoutSession;
use crate::store::{DurableStore, keys};

/// Terminal state handed to the "order complete" UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderComplete {
    pub order: FinalOrder,
}

impl<A: DraftOrderApi, S: DurableStore> CheckoutSession<A, S> {
    /// Promote the draft into a finalized order.
    ///
    /// Preconditions (checked with explicit reasons, without mutating remote
    /// state beyond the last draft update): a draft id exists, the address
    /// is fully populated, and methods requiring pre-authorization are
    /// settled. On success all local transient state is cleared; on failure
    /// the draft and cart are left intact so the shopper can retry.
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::FinalizationBlocked`] with the failing precondition.
    /// - [`CheckoutError::Remote`] if the conversion itself fails (always
    ///   blocking, always reported).
    #[instrument(skip(self))]
    pub async fn place_order(&self) -> Result<OrderComplete, CheckoutError> {
        let (id, snapshot, save_address, address) = {
            let state = self.state.lock().await;
            let draft = state.draft.as_ref().ok_or(CheckoutError::NoDraft)?;
            let id = draft.id.clone().ok_or_else(|| {
                CheckoutError::FinalizationBlocked(
                    "the draft order has not been created yet".to_owned(),
                )
            })?;

            let form = &state.address_form;
            if form.validate().is_err() {
                return Err(CheckoutError::FinalizationBlocked(
                    "the shipping address is incomplete".to_owned(),
                ));
            }

            let method = draft.payment_method.or(state.selected_method).ok_or_else(|| {
                CheckoutError::FinalizationBlocked("no payment method selected".to_owned())
            })?;
            if method.requires_preauthorization() && !draft.payment_status.is_settled() {
                return Err(CheckoutError::FinalizationBlocked(
                    "the payment has not been completed".to_owned(),
                ));
            }

            let remote_address = form.to_remote();
            let snapshot = DraftPatch {
                shipping_address: Some(remote_address.clone()),
                billing_address: Some(remote_address.clone()),
                shipping_method_id: draft.shipping_method_id.clone(),
                shipping_cost: Some(draft.shipping_cost),
                tax: Some(draft.tax),
                payment_method: Some(method),
                payment_details: draft.payment_details.clone(),
                payment_status: Some(draft.payment_status),
                lifecycle: Some(OrderLifecycle::Processing),
            };
            (id, snapshot, form.save_for_reuse, remote_address)
        };

        // Final address/shipping/payment snapshot onto the draft.
        self.apply_update(snapshot).await?;

        let order = match self.api.convert_draft_to_order(&id).await {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(error = %e, draft_id = %id, "Draft conversion failed");
                let mut state = self.state.lock().await;
                if let Some(draft) = state.draft.as_mut() {
                    draft.lifecycle = OrderLifecycle::Draft;
                }
                return Err(e.into());
            }
        };
        tracing::info!(draft_id = %id, order_id = %order.id, "Order placed");

        self.clear_transient_state().await;

        // Post-success side effect; its failure must not fail placement.
        if save_address {
            if let Err(e) = self.api.save_address(&address).await {
                tracing::warn!(error = %e, "Could not save address to the address book");
            }
        }

        Ok(OrderComplete { order })
    }

    /// Clear the cart, durable records, and in-memory checkout state after a
    /// successful conversion.
    async fn clear_transient_state(&self) {
        for key in [
            keys::DRAFT_ORDER_ID,
            keys::COMPLETED_PAYMENT,
            keys::CLEANUP_AFTER,
            keys::CART_SNAPSHOT,
        ] {
            if let Err(e) = self.store.remove_value(key).await {
                tracing::warn!(error = %e, key, "Could not clear durable checkout record");
            }
        }

        let mut state = self.state.lock().await;
        *state = crate::session::SessionState::default();
    }
}
