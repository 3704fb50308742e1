//! Integration test support for Tidepool.
//!
//! Provides [`MockApi`], an in-memory commerce backend with call counters
//! and failure injection, plus fixtures shared by the scenario tests under
//! `tests/`.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p tidepool-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::unwrap_used)] // test support code

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use tidepool_checkout::remote::{DraftOrderApi, FinalOrder, RemoteError};
use tidepool_checkout::session::CheckoutSession;
use tidepool_checkout::store::MemoryStore;
use tidepool_checkout::{
    AddressFormData, CartSnapshot, DraftOrder, DraftPatch, LineItem, PaymentFormData,
    ProviderCallback, RemoteAddress, ShippingQuote,
};
use tidepool_core::{CurrencyCode, DraftOrderId, Money, OrderId, ProductId, VariantId};

/// Which backend operations should fail, and how many times.
#[derive(Debug, Default)]
struct FailureInjection {
    create: usize,
    update: usize,
    get: usize,
    convert: usize,
    save_address: usize,
}

#[derive(Default)]
struct MockBackendState {
    drafts: HashMap<String, DraftOrder>,
    addresses: Vec<RemoteAddress>,
    next_id: usize,
    failures: FailureInjection,
}

/// In-memory commerce backend with call counters and failure injection.
#[derive(Default)]
pub struct MockApi {
    state: Mutex<MockBackendState>,
    /// Widens the create race window for concurrency tests.
    create_delay: Option<Duration>,
    pub create_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub convert_calls: AtomicUsize,
    pub save_address_calls: AtomicUsize,
}

impl MockApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose creates pause, so concurrent callers overlap.
    #[must_use]
    pub fn with_create_delay(delay: Duration) -> Self {
        Self {
            create_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_next_create(&self, times: usize) {
        self.state.lock().unwrap().failures.create = times;
    }

    pub fn fail_next_update(&self, times: usize) {
        self.state.lock().unwrap().failures.update = times;
    }

    pub fn fail_next_get(&self, times: usize) {
        self.state.lock().unwrap().failures.get = times;
    }

    pub fn fail_next_convert(&self, times: usize) {
        self.state.lock().unwrap().failures.convert = times;
    }

    pub fn fail_next_save_address(&self, times: usize) {
        self.state.lock().unwrap().failures.save_address = times;
    }

    /// Put a draft directly into the backend (reconciliation fixtures).
    pub fn insert_draft(&self, id: &str, mut draft: DraftOrder) {
        draft.id = Some(DraftOrderId::new(id));
        self.state.lock().unwrap().drafts.insert(id.to_owned(), draft);
    }

    /// Fetch the backend's copy of a draft.
    pub fn draft(&self, id: &str) -> Option<DraftOrder> {
        self.state.lock().unwrap().drafts.get(id).cloned()
    }

    pub fn saved_addresses(&self) -> Vec<RemoteAddress> {
        self.state.lock().unwrap().addresses.clone()
    }

    fn should_fail(slot: &mut usize) -> bool {
        if *slot > 0 {
            *slot -= 1;
            true
        } else {
            false
        }
    }

    fn injected_error() -> RemoteError {
        RemoteError::Api {
            status: 503,
            message: "injected failure".to_owned(),
        }
    }
}

#[async_trait]
impl DraftOrderApi for MockApi {
    async fn create_draft_order(&self, draft: &DraftOrder) -> Result<DraftOrder, RemoteError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if Self::should_fail(&mut state.failures.create) {
            return Err(Self::injected_error());
        }
        state.next_id += 1;
        let id = format!("do_{}", state.next_id);
        let mut created = draft.clone();
        created.id = Some(DraftOrderId::new(&id));
        state.drafts.insert(id, created.clone());
        Ok(created)
    }

    async fn get_draft_order(&self, id: &DraftOrderId) -> Result<DraftOrder, RemoteError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if Self::should_fail(&mut state.failures.get) {
            return Err(Self::injected_error());
        }
        state
            .drafts
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn update_draft_order(
        &self,
        id: &DraftOrderId,
        patch: &DraftPatch,
    ) -> Result<DraftOrder, RemoteError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if Self::should_fail(&mut state.failures.update) {
            return Err(Self::injected_error());
        }
        let draft = state
            .drafts
            .get_mut(id.as_str())
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        patch.apply_to(draft);
        Ok(draft.clone())
    }

    async fn delete_draft_order(&self, id: &DraftOrderId) -> Result<(), RemoteError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state
            .drafts
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn convert_draft_to_order(&self, id: &DraftOrderId) -> Result<FinalOrder, RemoteError> {
        self.convert_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if Self::should_fail(&mut state.failures.convert) {
            return Err(Self::injected_error());
        }
        let draft = state
            .drafts
            .remove(id.as_str())
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        Ok(FinalOrder {
            id: OrderId::new(format!("ord_{}", id.as_str())),
            order_number: draft.order_number,
            line_items: draft.line_items,
            total: draft.total,
            placed_at: Utc::now(),
        })
    }

    async fn get_my_addresses(&self) -> Result<Vec<RemoteAddress>, RemoteError> {
        Ok(self.state.lock().unwrap().addresses.clone())
    }

    async fn save_address(&self, address: &RemoteAddress) -> Result<RemoteAddress, RemoteError> {
        self.save_address_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if Self::should_fail(&mut state.failures.save_address) {
            return Err(Self::injected_error());
        }
        state.addresses.push(address.clone());
        Ok(address.clone())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// The standard test tax fraction (18%).
#[must_use]
pub fn tax_rate() -> Decimal {
    "0.18".parse().unwrap()
}

/// A cart whose subtotal is exactly 10,000.
#[must_use]
pub fn cart_ten_thousand() -> CartSnapshot {
    CartSnapshot {
        currency: CurrencyCode::USD,
        items: vec![
            LineItem {
                product_id: ProductId::new("prod_dinghy"),
                variant_id: VariantId::new("var_dinghy_red"),
                title: "Harbor Dinghy".to_owned(),
                quantity: 1,
                unit_price: Money::new("7500.00".parse().unwrap(), CurrencyCode::USD),
            },
            LineItem {
                product_id: ProductId::new("prod_oars"),
                variant_id: VariantId::new("var_oars_pair"),
                title: "Spruce Oars (pair)".to_owned(),
                quantity: 2,
                unit_price: Money::new("1250.00".parse().unwrap(), CurrencyCode::USD),
            },
        ],
    }
}

/// A complete, valid address form.
#[must_use]
pub fn valid_address() -> AddressFormData {
    AddressFormData {
        first_name: "Maya".to_owned(),
        last_name: "Reyes".to_owned(),
        email: "maya@example.com".to_owned(),
        phone: "555-010-4477".to_owned(),
        address: "14 Harbor Lane".to_owned(),
        address2: String::new(),
        city: "Port Townsend".to_owned(),
        region: "WA".to_owned(),
        postal_code: "98368".to_owned(),
        country: "US".to_owned(),
        save_for_reuse: false,
    }
}

/// A zero-cost "standard" shipping quote.
#[must_use]
pub fn standard_shipping() -> ShippingQuote {
    ShippingQuote {
        method_id: "standard".into(),
        label: "Standard (5-7 days)".to_owned(),
        cost: Money::zero(CurrencyCode::USD),
    }
}

/// Syntactically complete card fields.
#[must_use]
pub fn card_form() -> PaymentFormData {
    PaymentFormData {
        card_number: "4242 4242 4242 4242".to_owned(),
        card_name: "Maya Reyes".to_owned(),
        expiry: "04/27".to_owned(),
        cvv: "123".to_owned(),
    }
}

/// A complete provider success callback.
#[must_use]
pub fn paypal_callback() -> ProviderCallback {
    ProviderCallback {
        transaction_id: Some("8XY12345AB6789012".to_owned()),
        payer_id: Some("PAYER123".to_owned()),
        payer_email: Some("maya@example.com".to_owned()),
        amount: Some("11800.00".parse().unwrap()),
        currency: Some("USD".to_owned()),
        status: Some("COMPLETED".to_owned()),
        create_time: Some(Utc::now()),
        update_time: Some(Utc::now()),
    }
}

/// A checkout session over a mock backend and a shared in-memory store.
#[must_use]
pub fn new_session(api: Arc<MockApi>, store: Arc<MemoryStore>) -> CheckoutSession<MockApi, Arc<MemoryStore>> {
    CheckoutSession::new(api, store, tax_rate())
}
