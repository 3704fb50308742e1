//! Checkout route handlers.
//!
//! Every handler builds a [`CheckoutSession`] over the request's server
//! session, hydrates it from the durable records (a server-rendered request
//! *is* the reload case), runs one engine operation, and returns the session
//! view. Step validation failures surface as 422s with the validator's
//! message; tolerated remote failures surface as a `warning` on the view.

use axum::{Json, extract::State};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use tidepool_checkout::payment::{PaymentFormData, PaymentMethod, ProviderCallback};
use tidepool_checkout::remote::{DraftOrderApi, RestClient};
use tidepool_checkout::session::{CheckoutSession, CheckoutView};
use tidepool_checkout::{AddressFormData, CartSnapshot, OrderComplete, ShippingQuote};
use tidepool_core::PaymentStatus;

use crate::error::Result;
use crate::session_store::SessionStore;
use crate::state::AppState;

type Checkout = CheckoutSession<RestClient, SessionStore>;

/// Run the load-time lifecycle: stale cleanup, reconciliation, deadline stamp.
async fn hydrate(checkout: &Checkout) -> Result<()> {
    if checkout.run_stale_cleanup().await? {
        tracing::info!("Cleaned up stale draft on load");
    }
    checkout.reconcile().await?;
    checkout.stamp_cleanup_deadline().await?;
    Ok(())
}

/// Current checkout state.
#[instrument(skip(state, session))]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<Json<CheckoutView>> {
    let checkout = state.checkout_session(session);
    hydrate(&checkout).await?;
    Ok(Json(checkout.view().await))
}

/// Seed checkout from a cart snapshot (read once from the cart provider).
#[instrument(skip(state, session, cart))]
pub async fn start(
    State(state): State<AppState>,
    session: Session,
    Json(cart): Json<CartSnapshot>,
) -> Result<Json<CheckoutView>> {
    let checkout = state.checkout_session(session);
    hydrate(&checkout).await?;
    checkout.seed_cart(cart).await?;
    Ok(Json(checkout.view().await))
}

/// The shopper's saved addresses, for prefilling the address form.
#[instrument(skip(state))]
pub async fn saved_addresses(
    State(state): State<AppState>,
) -> Result<Json<Vec<tidepool_checkout::RemoteAddress>>> {
    let addresses = state
        .backend()
        .get_my_addresses()
        .await
        .map_err(tidepool_checkout::CheckoutError::from)?;
    Ok(Json(addresses))
}

/// Submit the address form and advance past the Address step.
#[instrument(skip(state, session, form))]
pub async fn submit_address(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<AddressFormData>,
) -> Result<Json<CheckoutView>> {
    let checkout = state.checkout_session(session);
    hydrate(&checkout).await?;
    checkout.set_address_form(form).await;
    checkout.advance().await?;
    Ok(Json(checkout.view().await))
}

/// Choose a delivery option (externally quoted cost) and advance.
#[instrument(skip(state, session, quote))]
pub async fn select_shipping(
    State(state): State<AppState>,
    session: Session,
    Json(quote): Json<ShippingQuote>,
) -> Result<Json<CheckoutView>> {
    let checkout = state.checkout_session(session);
    hydrate(&checkout).await?;
    checkout.select_shipping(quote).await;
    checkout.advance().await?;
    Ok(Json(checkout.view().await))
}

/// Payment method selection form.
#[derive(Debug, Deserialize)]
pub struct SelectPaymentMethodForm {
    pub method: PaymentMethod,
}

/// Choose a payment method (no advancement; capture may still be needed).
#[instrument(skip(state, session))]
pub async fn select_payment_method(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<SelectPaymentMethodForm>,
) -> Result<Json<CheckoutView>> {
    let checkout = state.checkout_session(session);
    hydrate(&checkout).await?;
    checkout.select_payment_method(form.method).await;
    Ok(Json(checkout.view().await))
}

/// Result of the embedded card-capture flow.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardCaptureForm {
    #[serde(flatten)]
    pub card: PaymentFormData,
    pub status: PaymentStatus,
}

/// Record the card-capture result.
///
/// Capture is its own sequenced operation: the shopper submits the card to
/// the embedded flow first, then advances the checkout step.
#[instrument(skip(state, session, form))]
pub async fn card_capture(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<CardCaptureForm>,
) -> Result<Json<CheckoutView>> {
    let checkout = state.checkout_session(session);
    hydrate(&checkout).await?;
    checkout.card_capture_completed(form.card, form.status).await?;
    Ok(Json(checkout.view().await))
}

/// Advance from the current step (used from the Payment step).
#[instrument(skip(state, session))]
pub async fn advance(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<CheckoutView>> {
    let checkout = state.checkout_session(session);
    hydrate(&checkout).await?;
    checkout.advance().await?;
    Ok(Json(checkout.view().await))
}

/// Go back one step. Always allowed.
#[instrument(skip(state, session))]
pub async fn back(State(state): State<AppState>, session: Session) -> Result<Json<CheckoutView>> {
    let checkout = state.checkout_session(session);
    hydrate(&checkout).await?;
    checkout.retreat().await;
    Ok(Json(checkout.view().await))
}

/// Step jump form.
#[derive(Debug, Deserialize)]
pub struct GoToForm {
    pub step: u8,
}

/// Jump to a step ("edit" shortcuts from Review).
#[instrument(skip(state, session))]
pub async fn go_to(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<GoToForm>,
) -> Result<Json<CheckoutView>> {
    let checkout = state.checkout_session(session);
    hydrate(&checkout).await?;
    checkout.go_to(form.step).await;
    Ok(Json(checkout.view().await))
}

/// Finalize the order.
#[instrument(skip(state, session))]
pub async fn place_order(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<OrderComplete>> {
    let checkout = state.checkout_session(session);
    hydrate(&checkout).await?;
    let complete = checkout.place_order().await?;
    Ok(Json(complete))
}

/// Stamp the cleanup deadline from a page-unload beacon.
#[instrument(skip(state, session))]
pub async fn unload(State(state): State<AppState>, session: Session) -> Result<()> {
    let checkout = state.checkout_session(session);
    checkout.stamp_cleanup_deadline().await?;
    Ok(())
}

/// Provider success callback.
///
/// May arrive after the shopper has navigated away from the Payment step;
/// the engine records it durably regardless.
#[instrument(skip(state, session, callback))]
pub async fn paypal_approve(
    State(state): State<AppState>,
    session: Session,
    Json(callback): Json<ProviderCallback>,
) -> Result<Json<CheckoutView>> {
    let checkout = state.checkout_session(session);
    hydrate(&checkout).await?;
    let outcome = checkout.payment_succeeded(callback).await?;
    tracing::info!(status = %outcome.status, "Wallet payment completed");
    Ok(Json(checkout.view().await))
}

/// Provider error callback payload.
#[derive(Debug, Deserialize)]
pub struct PaypalErrorForm {
    pub message: String,
}

/// Provider error callback. The reason is surfaced to the shopper verbatim.
#[instrument(skip(state, session, form))]
pub async fn paypal_error(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<PaypalErrorForm>,
) -> Result<Json<CheckoutView>> {
    let checkout = state.checkout_session(session);
    hydrate(&checkout).await?;
    checkout.payment_failed(&form.message).await?;
    Ok(Json(checkout.view().await))
}

/// Provider cancel callback. The shopper must re-initiate payment.
#[instrument(skip(state, session))]
pub async fn paypal_cancel(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<CheckoutView>> {
    let checkout = state.checkout_session(session);
    hydrate(&checkout).await?;
    checkout.payment_cancelled().await?;
    Ok(Json(checkout.view().await))
}
