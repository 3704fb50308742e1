//! Integration tests for the payment step, capture results, and provider
//! callbacks.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tidepool_checkout::store::{DurableStoreExt, MemoryStore, keys};
use tidepool_checkout::{
    CheckoutError, CheckoutStep, CompletedPaymentRecord, PaymentFormData, PaymentMethod,
    ProviderCallback,
};
use tidepool_core::PaymentStatus;

use tidepool_integration_tests::{
    MockApi, card_form, cart_ten_thousand, new_session, paypal_callback, standard_shipping,
    valid_address,
};

/// Drive a session up to the Payment step.
async fn at_payment_step(
    api: &Arc<MockApi>,
    store: &Arc<MemoryStore>,
) -> tidepool_checkout::CheckoutSession<MockApi, Arc<MemoryStore>> {
    let session = new_session(Arc::clone(api), Arc::clone(store));
    session.seed_cart(cart_ten_thousand()).await.expect("seed");
    session.set_address_form(valid_address()).await;
    session.advance().await.expect("address step");
    session.select_shipping(standard_shipping()).await;
    session.advance().await.expect("delivery step");
    assert_eq!(session.current_step().await, CheckoutStep::Payment);
    session
}

// =============================================================================
// Card
// =============================================================================

#[tokio::test]
async fn test_card_fields_present_but_pending_fails_validation() {
    let api = Arc::new(MockApi::new());
    let store = Arc::new(MemoryStore::new());
    let session = at_payment_step(&api, &store).await;

    // All four fields are syntactically present, but no capture has run.
    session.select_payment_method(PaymentMethod::Card).await;
    session.set_payment_form(card_form()).await;

    let err = session.advance().await.expect_err("capture has not run");
    assert!(
        err.to_string().contains("complete the payment process"),
        "message was: {err}"
    );
    assert_eq!(session.current_step().await, CheckoutStep::Payment);
}

#[tokio::test]
async fn test_card_capture_then_advance() {
    let api = Arc::new(MockApi::new());
    let store = Arc::new(MemoryStore::new());
    let session = at_payment_step(&api, &store).await;

    // Capture is its own sequenced operation, then the step advances.
    session
        .card_capture_completed(card_form(), PaymentStatus::Authorized)
        .await
        .expect("capture recorded");
    session.advance().await.expect("payment step");

    assert_eq!(session.current_step().await, CheckoutStep::Review);
    let id = session.current_draft_id().await.expect("draft id");
    let remote = api.draft(id.as_str()).expect("remote draft");
    assert_eq!(remote.payment_status, PaymentStatus::Authorized);
    // Only the masked projection reached the backend.
    let details = serde_json::to_string(&remote.payment_details).expect("serialize");
    assert!(!details.contains("4242 4242 4242 4242"));
    assert!(details.contains("4242"));
}

#[tokio::test]
async fn test_card_malformed_expiry_is_reported_first() {
    let api = Arc::new(MockApi::new());
    let store = Arc::new(MemoryStore::new());
    let session = at_payment_step(&api, &store).await;

    session.select_payment_method(PaymentMethod::Card).await;
    let mut form = card_form();
    form.expiry = "0427".to_owned();
    session.set_payment_form(form).await;

    let err = session.advance().await.expect_err("bad expiry");
    assert!(err.to_string().contains("MM/YY"), "message was: {err}");
}

#[tokio::test]
async fn test_paid_card_skips_field_revalidation() {
    let api = Arc::new(MockApi::new());
    let store = Arc::new(MemoryStore::new());
    let session = at_payment_step(&api, &store).await;

    session
        .card_capture_completed(card_form(), PaymentStatus::Paid)
        .await
        .expect("capture recorded");

    // Corrupt the raw form; field checks must not run again once paid.
    session.set_payment_form(PaymentFormData::default()).await;
    session.go_to(2).await;
    session.advance().await.expect("revalidation skipped");
    assert_eq!(session.current_step().await, CheckoutStep::Review);
}

#[tokio::test]
async fn test_no_method_selected_is_rejected() {
    let api = Arc::new(MockApi::new());
    let store = Arc::new(MemoryStore::new());
    let session = at_payment_step(&api, &store).await;

    let err = session.advance().await.expect_err("no method");
    assert!(
        err.to_string().contains("select a payment method"),
        "message was: {err}"
    );
}

#[tokio::test]
async fn test_manual_methods_validate_without_capture() {
    let api = Arc::new(MockApi::new());
    let store = Arc::new(MemoryStore::new());
    let session = at_payment_step(&api, &store).await;

    session
        .select_payment_method(PaymentMethod::CashOnDelivery)
        .await;
    session.advance().await.expect("manual method");

    assert_eq!(session.current_step().await, CheckoutStep::Review);
    let id = session.current_draft_id().await.expect("draft id");
    let remote = api.draft(id.as_str()).expect("remote draft");
    // No capture happens before order placement for manual methods.
    assert_eq!(remote.payment_status, PaymentStatus::Pending);
}

// =============================================================================
// Wallet Callbacks
// =============================================================================

#[tokio::test]
async fn test_wallet_success_marks_paid_and_records_side_channel() {
    let api = Arc::new(MockApi::new());
    let store = Arc::new(MemoryStore::new());
    let session = at_payment_step(&api, &store).await;
    session.select_payment_method(PaymentMethod::Paypal).await;

    let outcome = session
        .payment_succeeded(paypal_callback())
        .await
        .expect("success callback");
    assert_eq!(outcome.status, PaymentStatus::Paid);

    let record: Option<CompletedPaymentRecord> = store
        .get_record(keys::COMPLETED_PAYMENT)
        .await
        .expect("store read");
    let record = record.expect("side-channel record written");
    assert!(record.indicates_completion());

    session.advance().await.expect("wallet paid");
    assert_eq!(session.current_step().await, CheckoutStep::Review);
}

#[tokio::test]
async fn test_callback_missing_payer_email_changes_nothing() {
    let api = Arc::new(MockApi::new());
    let store = Arc::new(MemoryStore::new());
    let session = at_payment_step(&api, &store).await;
    session.select_payment_method(PaymentMethod::Paypal).await;

    let callback = ProviderCallback {
        payer_email: None,
        ..paypal_callback()
    };
    let err = session
        .payment_succeeded(callback)
        .await
        .expect_err("incomplete callback");
    assert!(matches!(
        err,
        CheckoutError::PaymentCallbackIncomplete { .. }
    ));

    // Payment status is unchanged and no side-channel record was written.
    let draft = session.view().await.draft.expect("draft");
    assert_eq!(draft.payment_status, PaymentStatus::Pending);
    let record: Option<CompletedPaymentRecord> = store
        .get_record(keys::COMPLETED_PAYMENT)
        .await
        .expect("store read");
    assert!(record.is_none());
}

#[tokio::test]
async fn test_duplicate_callback_only_reconfirms() {
    let api = Arc::new(MockApi::new());
    let store = Arc::new(MemoryStore::new());
    let session = at_payment_step(&api, &store).await;
    session.select_payment_method(PaymentMethod::Paypal).await;

    session
        .payment_succeeded(paypal_callback())
        .await
        .expect("first callback");
    let updates_after_first = api.update_calls.load(Ordering::SeqCst);

    let outcome = session
        .payment_succeeded(paypal_callback())
        .await
        .expect("duplicate callback");
    assert_eq!(outcome.status, PaymentStatus::Paid);
    assert_eq!(
        api.update_calls.load(Ordering::SeqCst),
        updates_after_first,
        "a duplicate callback must not re-trigger remote side effects"
    );
    assert_eq!(api.save_address_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_wallet_error_sets_failed_without_blocking() {
    let api = Arc::new(MockApi::new());
    let store = Arc::new(MemoryStore::new());
    let session = at_payment_step(&api, &store).await;
    session.select_payment_method(PaymentMethod::Paypal).await;

    // Even with the backend refusing the mirror write, the failure is
    // reported to the shopper.
    api.fail_next_update(1);
    session
        .payment_failed("INSTRUMENT_DECLINED")
        .await
        .expect("failure handled");

    let draft = session.view().await.draft.expect("draft");
    assert_eq!(draft.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_wallet_cancel_requires_explicit_reinitiation() {
    let api = Arc::new(MockApi::new());
    let store = Arc::new(MemoryStore::new());
    let session = at_payment_step(&api, &store).await;
    session.select_payment_method(PaymentMethod::Paypal).await;

    session.payment_cancelled().await.expect("cancel handled");
    let draft = session.view().await.draft.expect("draft");
    assert_eq!(draft.payment_status, PaymentStatus::Cancelled);

    // Advancing still fails: cancellation implies no retry state.
    let err = session.advance().await.expect_err("must re-initiate");
    assert!(matches!(err, CheckoutError::Validation { .. }));
}

#[tokio::test]
async fn test_reload_between_callback_and_update_recovers_from_side_channel() {
    let api = Arc::new(MockApi::new());
    let store = Arc::new(MemoryStore::new());

    // First request: the callback lands but the mirror write to the backend
    // fails, so the remote draft still says pending.
    {
        let session = at_payment_step(&api, &store).await;
        session.select_payment_method(PaymentMethod::Paypal).await;
        api.fail_next_update(1);
        session
            .payment_succeeded(paypal_callback())
            .await
            .expect("callback handled");
    }

    // Reload: a fresh session hydrates from the durable records. The remote
    // draft has no settled payment, so reconciliation lands on Payment, and
    // the validator adopts the side-channel record.
    let session = new_session(Arc::clone(&api), Arc::clone(&store));
    session.reconcile().await.expect("reconcile");
    assert_eq!(session.current_step().await, CheckoutStep::Payment);

    session.select_payment_method(PaymentMethod::Paypal).await;
    session.advance().await.expect("adopted from side channel");
    assert_eq!(session.current_step().await, CheckoutStep::Review);

    let draft = session.view().await.draft.expect("draft");
    assert_eq!(draft.payment_status, PaymentStatus::Paid);
}
