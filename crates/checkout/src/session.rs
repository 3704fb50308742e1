//! The checkout session: single source of truth for the order-in-progress.
//!
//! One `CheckoutSession` exists per shopper. It owns the draft order, the
//! raw form state, and the step position, and it is the only writer of the
//! durable draft-order id. Handlers construct a session per request, hydrate
//! it with [`CheckoutSession::reconcile`], run one operation, and drop it -
//! a server-rendered request is exactly the "reload" case the durable
//! records exist for.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::instrument;

use tidepool_core::DraftOrderId;

use crate::address::AddressFormData;
use crate::draft::{CartSnapshot, DraftOrder, DraftPatch, ShippingQuote, SyncState};
use crate::error::CheckoutError;
use crate::payment::{FxClient, PaymentFormData, PaymentMethod};
use crate::remote::DraftOrderApi;
use crate::steps::CheckoutStep;
use crate::store::{DurableStore, DurableStoreExt, keys};

/// Per-shopper checkout state behind the session's mutex.
#[derive(Default)]
pub(crate) struct SessionState {
    pub(crate) cart: Option<CartSnapshot>,
    pub(crate) draft: Option<DraftOrder>,
    pub(crate) step: CheckoutStep,
    pub(crate) address_form: AddressFormData,
    pub(crate) payment_form: PaymentFormData,
    pub(crate) selected_shipping: Option<ShippingQuote>,
    pub(crate) selected_method: Option<PaymentMethod>,
    /// Non-blocking warning from the last tolerated remote failure.
    pub(crate) warning: Option<String>,
}

/// The checkout session object.
///
/// Generic over the backend API and the durable record store so tests can
/// inject both. All methods take `&self`; state lives behind a
/// `tokio::sync::Mutex` because provider callbacks and step transitions can
/// interleave.
pub struct CheckoutSession<A, S> {
    pub(crate) api: Arc<A>,
    pub(crate) store: S,
    pub(crate) fx: Option<FxClient>,
    pub(crate) tax_rate: Decimal,
    pub(crate) state: Mutex<SessionState>,
    /// Reentrancy guard around remote draft creation. Held across the
    /// in-flight create so a concurrent caller waits and adopts the result
    /// instead of issuing a second request.
    create_lock: Mutex<()>,
}

impl<A: DraftOrderApi, S: DurableStore> CheckoutSession<A, S> {
    /// Create a fresh session.
    ///
    /// `tax_rate` is the externally supplied fraction applied to the
    /// subtotal when seeding a draft (tax engines are out of scope).
    pub fn new(api: Arc<A>, store: S, tax_rate: Decimal) -> Self {
        Self {
            api,
            store,
            fx: None,
            tax_rate,
            state: Mutex::new(SessionState::default()),
            create_lock: Mutex::new(()),
        }
    }

    /// Attach an FX client for display-only currency conversion.
    #[must_use]
    pub fn with_fx(mut self, fx: FxClient) -> Self {
        self.fx = Some(fx);
        self
    }

    /// Seed the session from a cart snapshot (read once from the cart
    /// provider). Persisted durably so later requests can recreate a draft.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::EmptyCart`] for an empty snapshot.
    pub async fn seed_cart(&self, cart: CartSnapshot) -> Result<(), CheckoutError> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        self.store.put_record(keys::CART_SNAPSHOT, &cart).await?;
        self.state.lock().await.cart = Some(cart);
        Ok(())
    }

    /// Replace the address form state.
    pub async fn set_address_form(&self, form: AddressFormData) {
        self.state.lock().await.address_form = form;
    }

    /// Replace the raw card form state (controlled-input handler).
    pub async fn set_payment_form(&self, form: PaymentFormData) {
        self.state.lock().await.payment_form = form;
    }

    /// Record the chosen shipping option (cost is externally quoted).
    pub async fn select_shipping(&self, quote: ShippingQuote) {
        self.state.lock().await.selected_shipping = Some(quote);
    }

    /// Record the chosen payment method.
    pub async fn select_payment_method(&self, method: PaymentMethod) {
        self.state.lock().await.selected_method = Some(method);
    }

    /// The backend-assigned draft id, if creation has happened.
    pub async fn current_draft_id(&self) -> Option<DraftOrderId> {
        self.state
            .lock()
            .await
            .draft
            .as_ref()
            .and_then(|draft| draft.id.clone())
    }

    /// The current step.
    pub async fn current_step(&self) -> CheckoutStep {
        self.state.lock().await.step
    }

    /// Take (and clear) the last non-blocking warning.
    pub async fn take_warning(&self) -> Option<String> {
        self.state.lock().await.warning.take()
    }

    /// Lazily create the remote draft order, exactly once per session.
    ///
    /// Safe to call concurrently with itself: the second caller blocks on
    /// the create guard, re-reads the id, and adopts the first caller's
    /// result without issuing its own request.
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::EmptyCart`] if no cart snapshot was seeded.
    /// - [`CheckoutError::Remote`] if the backend rejects the create. No
    ///   fake order is fabricated; the caller decides whether to retry.
    #[instrument(skip(self))]
    pub async fn ensure_draft(&self) -> Result<DraftOrderId, CheckoutError> {
        if let Some(id) = self.current_draft_id().await {
            return Ok(id);
        }

        let _guard = self.create_lock.lock().await;
        // Re-check: another caller may have created the draft while we
        // waited on the guard.
        if let Some(id) = self.current_draft_id().await {
            return Ok(id);
        }

        let draft = {
            let state = self.state.lock().await;
            let cart = state.cart.as_ref().ok_or(CheckoutError::EmptyCart)?;
            let mut draft = DraftOrder::from_cart(cart, self.tax_rate)?;

            // Carry whatever the shopper has already filled in.
            if state.address_form.is_complete() {
                let remote = state.address_form.to_remote();
                draft.shipping_address = Some(remote.clone());
                draft.billing_address = Some(remote);
            }
            if let Some(quote) = &state.selected_shipping {
                draft.shipping_method_id = Some(quote.method_id.clone());
                draft.shipping_cost = quote.cost;
            }
            if let Some(method) = state.selected_method {
                draft.payment_method = Some(method);
            }
            draft.recompute_totals();
            draft
        };

        let created = self.api.create_draft_order(&draft).await?;
        let id = created.id.clone().ok_or_else(|| {
            CheckoutError::InconsistentDraft("backend returned a draft without an id".to_owned())
        })?;

        self.store.put_record(keys::DRAFT_ORDER_ID, &id).await?;
        self.state.lock().await.draft = Some(DraftOrder {
            sync: SyncState::Clean,
            ..created
        });
        tracing::info!(draft_id = %id, "Draft order created");
        Ok(id)
    }

    /// [`Self::ensure_draft`] with one fallback re-attempt on remote failure.
    pub(crate) async fn ensure_draft_with_fallback(&self) -> Result<DraftOrderId, CheckoutError> {
        match self.ensure_draft().await {
            Err(CheckoutError::Remote(first)) => {
                tracing::warn!(error = %first, "Draft creation failed; re-attempting once");
                self.ensure_draft().await
            }
            other => other,
        }
    }

    /// Merge a partial update into the draft and persist it remotely.
    ///
    /// Degrades to creation when no draft id is known yet. The local merge
    /// always survives: if the remote update fails, the draft is marked
    /// [`SyncState::Error`] and a non-blocking warning is surfaced, because
    /// losing step progress is worse than a stale remote mirror.
    ///
    /// # Errors
    ///
    /// Only creation/store failures propagate; update failures are tolerated.
    #[instrument(skip(self, patch))]
    pub async fn apply_update(&self, patch: DraftPatch) -> Result<(), CheckoutError> {
        let id = self.ensure_draft().await?;

        {
            let mut state = self.state.lock().await;
            let draft = state.draft.as_mut().ok_or(CheckoutError::NoDraft)?;
            patch.apply_to(draft);
            draft.sync = SyncState::Dirty;
        }

        match self.api.update_draft_order(&id, &patch).await {
            Ok(remote) => {
                let mut state = self.state.lock().await;
                if let Some(draft) = state.draft.as_mut() {
                    draft.sync = SyncState::Clean;
                    draft.updated_at = remote.updated_at;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, draft_id = %id, "Draft update failed; keeping local merge");
                let mut state = self.state.lock().await;
                if let Some(draft) = state.draft.as_mut() {
                    draft.sync = SyncState::Error;
                }
                state.warning =
                    Some("Your progress is saved, but could not be synced yet.".to_owned());
            }
        }
        Ok(())
    }

    /// Rehydrate the session from durable records after a reload.
    ///
    /// If a durable draft id exists but no in-memory draft does, the draft
    /// is fetched and all dependent state (address form, shipping selection,
    /// payment method, step position) is inferred from it. A missing or
    /// unfetchable draft discards the durable id and starts fresh.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::InconsistentDraft`] if the remote draft has later
    /// checkout data without the earlier prerequisites.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<(), CheckoutError> {
        if self.state.lock().await.cart.is_none() {
            let cart: Option<CartSnapshot> = self.store.get_record(keys::CART_SNAPSHOT).await?;
            self.state.lock().await.cart = cart;
        }

        if self.state.lock().await.draft.is_some() {
            return Ok(());
        }
        let Some(id) = self
            .store
            .get_record::<DraftOrderId>(keys::DRAFT_ORDER_ID)
            .await?
        else {
            return Ok(());
        };

        match self.api.get_draft_order(&id).await {
            Ok(draft) => {
                let step = infer_step(&draft)?;
                let mut state = self.state.lock().await;
                if let Some(addr) = &draft.shipping_address {
                    state.address_form = AddressFormData::from_remote(addr);
                }
                if let Some(method_id) = &draft.shipping_method_id {
                    state.selected_shipping = Some(ShippingQuote {
                        method_id: method_id.clone(),
                        label: method_id.to_string(),
                        cost: draft.shipping_cost,
                    });
                }
                state.selected_method = draft.payment_method;
                state.step = step;
                state.draft = Some(DraftOrder {
                    sync: SyncState::Clean,
                    ..draft
                });
                tracing::debug!(draft_id = %id, ?step, "Rehydrated draft order");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, draft_id = %id, "Stored draft could not be fetched; starting fresh");
                self.store.remove_value(keys::DRAFT_ORDER_ID).await?;
                Ok(())
            }
        }
    }

    /// Snapshot for handlers/templates.
    pub async fn view(&self) -> CheckoutView {
        let mut state = self.state.lock().await;
        CheckoutView {
            step: state.step,
            step_index: state.step.index(),
            draft: state.draft.clone(),
            warning: state.warning.take(),
        }
    }
}

/// Serializable projection of the session for responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutView {
    pub step: CheckoutStep,
    pub step_index: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<DraftOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Infer the step position from how much of a fetched draft is filled in.
///
/// A draft with later data but missing earlier prerequisites is reported as
/// inconsistent rather than silently placed on a step.
pub(crate) fn infer_step(draft: &DraftOrder) -> Result<CheckoutStep, CheckoutError> {
    let has_address = draft.shipping_address.is_some();
    let has_shipping = draft.shipping_method_id.is_some();
    let payment_settled = draft.payment_status.is_settled();

    if (has_shipping || payment_settled || draft.payment_method.is_some()) && !has_address {
        return Err(CheckoutError::InconsistentDraft(
            "later checkout data is present without a shipping address".to_owned(),
        ));
    }
    if payment_settled && !has_shipping {
        return Err(CheckoutError::InconsistentDraft(
            "payment is settled without a shipping method".to_owned(),
        ));
    }

    Ok(if payment_settled {
        CheckoutStep::Review
    } else if has_shipping {
        CheckoutStep::Payment
    } else if has_address {
        CheckoutStep::Delivery
    } else {
        CheckoutStep::Address
    })
}
