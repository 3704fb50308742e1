//! The draft order: the authoritative in-memory representation of the
//! order-in-progress, mirroring a remote draft-order resource.
//!
//! The one arithmetic invariant of the whole flow lives here:
//! `total == subtotal + tax + shipping`, recomputed after every mutation and
//! never trusted from stale input.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tidepool_core::{
    CurrencyCode, DraftOrderId, Money, OrderLifecycle, PaymentStatus, ProductId, ShippingMethodId,
    VariantId,
};

use crate::address::RemoteAddress;
use crate::error::CheckoutError;
use crate::payment::{PaymentDetails, PaymentMethod};

/// A single purchasable line in the cart / draft order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    /// Denormalized for display on the review step and the final order.
    pub title: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl LineItem {
    /// Total price for this line (`unit_price * quantity`).
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// A read-once snapshot of the shopper's cart, used to seed a draft order.
///
/// The cart line-item store itself is an external collaborator; the checkout
/// engine only ever consumes this frozen projection of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub currency: CurrencyCode,
    pub items: Vec<LineItem>,
}

impl CartSnapshot {
    /// Sum of all line totals. Recomputed here; the cart's own running total
    /// is not trusted.
    #[must_use]
    pub fn subtotal(&self) -> Money {
        self.items
            .iter()
            .fold(Money::zero(self.currency), |acc, item| {
                acc + item.line_total()
            })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A shipping option with an externally supplied cost.
///
/// Rate computation is out of scope; the delivery step only records the
/// chosen method and its quoted cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingQuote {
    pub method_id: ShippingMethodId,
    pub label: String,
    pub cost: Money,
}

/// Local/remote synchronization state of the draft order.
///
/// Not part of the wire format: the backend never sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Local state matches the last acknowledged remote write.
    #[default]
    Clean,
    /// Local mutations exist that have not been pushed yet.
    Dirty,
    /// The last remote update failed; local state was kept (optimistic).
    Error,
}

/// The order-in-progress.
///
/// `id` is assigned by the commerce backend on first creation and absent
/// before it; once assigned it is immutable and is the sole key used for
/// subsequent updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftOrder {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<DraftOrderId>,
    /// Human-facing token, generated client-side before remote confirmation.
    pub order_number: String,
    pub line_items: Vec<LineItem>,
    pub subtotal: Money,
    pub tax: Money,
    pub shipping_cost: Money,
    pub total: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<RemoteAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<RemoteAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_method_id: Option<ShippingMethodId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_details: Option<PaymentDetails>,
    pub lifecycle: OrderLifecycle,
    pub updated_at: DateTime<Utc>,
    #[serde(skip, default)]
    pub sync: SyncState,
}

impl DraftOrder {
    /// Seed a draft order from a cart snapshot.
    ///
    /// Tax is computed from an externally supplied rate (tax engines are out
    /// of scope); shipping starts at zero until the delivery step commits.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::EmptyCart`] if the snapshot has no items.
    pub fn from_cart(cart: &CartSnapshot, tax_rate: Decimal) -> Result<Self, CheckoutError> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let subtotal = cart.subtotal();
        let tax = Money::new((subtotal.amount * tax_rate).round_dp(2), cart.currency);
        let shipping_cost = Money::zero(cart.currency);

        let mut draft = Self {
            id: None,
            order_number: generate_order_number(),
            line_items: cart.items.clone(),
            subtotal,
            tax,
            shipping_cost,
            total: Money::zero(cart.currency),
            shipping_address: None,
            billing_address: None,
            shipping_method_id: None,
            payment_method: None,
            payment_status: PaymentStatus::Pending,
            payment_details: None,
            lifecycle: OrderLifecycle::Draft,
            updated_at: Utc::now(),
            sync: SyncState::Dirty,
        };
        draft.recompute_totals();
        Ok(draft)
    }

    /// Recompute `subtotal` from line items and enforce
    /// `total == subtotal + tax + shipping`.
    pub fn recompute_totals(&mut self) {
        let currency = self.subtotal.currency_code;
        self.subtotal = self
            .line_items
            .iter()
            .fold(Money::zero(currency), |acc, item| acc + item.line_total());
        self.total = self.subtotal + self.tax + self.shipping_cost;
    }

    /// Currency the whole order is denominated in.
    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.subtotal.currency_code
    }
}

/// A partial update merged into the draft order and pushed to the backend.
///
/// Absent fields are left untouched by the merge and omitted from the wire
/// payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<RemoteAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<RemoteAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_method_id: Option<ShippingMethodId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_cost: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_details: Option<PaymentDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<OrderLifecycle>,
}

impl DraftPatch {
    /// Merge this patch into a draft and recompute totals.
    pub fn apply_to(&self, draft: &mut DraftOrder) {
        if let Some(addr) = &self.shipping_address {
            draft.shipping_address = Some(addr.clone());
        }
        if let Some(addr) = &self.billing_address {
            draft.billing_address = Some(addr.clone());
        }
        if let Some(method) = &self.shipping_method_id {
            draft.shipping_method_id = Some(method.clone());
        }
        if let Some(cost) = self.shipping_cost {
            draft.shipping_cost = cost;
        }
        if let Some(tax) = self.tax {
            draft.tax = tax;
        }
        if let Some(method) = self.payment_method {
            draft.payment_method = Some(method);
        }
        if let Some(details) = &self.payment_details {
            draft.payment_details = Some(details.clone());
        }
        if let Some(status) = self.payment_status {
            draft.payment_status = status;
        }
        if let Some(lifecycle) = self.lifecycle {
            draft.lifecycle = lifecycle;
        }
        draft.recompute_totals();
        draft.updated_at = Utc::now();
    }
}

/// Generate a human-facing order number before remote confirmation.
///
/// Timestamp-based with a random suffix to keep collisions across
/// simultaneous shoppers unlikely; the backend's own identifiers stay the
/// real keys.
fn generate_order_number() -> String {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix: u32 = rand::rng().random_range(0..10_000);
    format!("TP-{stamp}-{suffix:04}")
}
