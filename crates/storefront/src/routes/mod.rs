//! HTTP route handlers for the storefront checkout service.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                        - Health check
//!
//! # Checkout
//! GET  /checkout                      - Current checkout state
//! POST /checkout/start                - Seed checkout from a cart snapshot
//! GET  /checkout/addresses            - Saved addresses for prefill
//! POST /checkout/address              - Submit address and advance
//! POST /checkout/shipping             - Choose delivery option and advance
//! POST /checkout/payment-method       - Choose payment method
//! POST /checkout/card-capture         - Record embedded card-capture result
//! POST /checkout/advance              - Advance from the current step
//! POST /checkout/back                 - Go back one step
//! POST /checkout/goto                 - Jump to a step (edit from review)
//! POST /checkout/place-order          - Finalize the order
//! POST /checkout/unload               - Stamp the cleanup deadline (beacon)
//!
//! # Payment provider callbacks
//! POST /checkout/paypal/approve       - Provider success callback
//! POST /checkout/paypal/error         - Provider error callback
//! POST /checkout/paypal/cancel        - Provider cancel callback
//! ```

pub mod checkout;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::show))
        .route("/start", post(checkout::start))
        .route("/addresses", get(checkout::saved_addresses))
        .route("/address", post(checkout::submit_address))
        .route("/shipping", post(checkout::select_shipping))
        .route("/payment-method", post(checkout::select_payment_method))
        .route("/card-capture", post(checkout::card_capture))
        .route("/advance", post(checkout::advance))
        .route("/back", post(checkout::back))
        .route("/goto", post(checkout::go_to))
        .route("/place-order", post(checkout::place_order))
        .route("/unload", post(checkout::unload))
        .route("/paypal/approve", post(checkout::paypal_approve))
        .route("/paypal/error", post(checkout::paypal_error))
        .route("/paypal/cancel", post(checkout::paypal_cancel))
}

/// Create the full application router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/checkout", checkout_routes())
}

/// Health check endpoint.
async fn health() -> StatusCode {
    StatusCode::OK
}
