//! Integration tests for reconciliation after reload and stale draft
//! cleanup.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use tidepool_checkout::store::{DurableStoreExt, MemoryStore, keys};
use tidepool_checkout::{CheckoutError, CheckoutStep, DraftOrder, PaymentMethod};
use tidepool_core::{DraftOrderId, PaymentStatus};

use tidepool_integration_tests::{MockApi, cart_ten_thousand, new_session, valid_address};

/// Build a backend-side draft with the given amount of progress.
fn remote_draft(address: bool, shipping: bool, paid: bool) -> DraftOrder {
    let mut draft =
        DraftOrder::from_cart(&cart_ten_thousand(), "0.18".parse::<Decimal>().expect("rate"))
            .expect("draft");
    if address {
        draft.shipping_address = Some(valid_address().to_remote());
        draft.billing_address = Some(valid_address().to_remote());
    }
    if shipping {
        draft.shipping_method_id = Some("standard".into());
    }
    if paid {
        draft.payment_method = Some(PaymentMethod::Paypal);
        draft.payment_status = PaymentStatus::Paid;
    }
    draft
}

async fn store_with_draft_id(id: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .put_record(keys::DRAFT_ORDER_ID, &DraftOrderId::new(id))
        .await
        .expect("store id");
    store
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn test_reconcile_with_shipping_lands_on_payment_step() {
    let api = Arc::new(MockApi::new());
    api.insert_draft("do_77", remote_draft(true, true, false));
    let store = store_with_draft_id("do_77").await;

    let session = new_session(Arc::clone(&api), store);
    session.reconcile().await.expect("reconcile");

    assert_eq!(session.current_step().await, CheckoutStep::Payment);
    let draft = session.view().await.draft.expect("hydrated draft");
    assert_eq!(draft.id, Some(DraftOrderId::new("do_77")));
    assert!(draft.shipping_address.is_some());
}

#[tokio::test]
async fn test_reconcile_with_address_only_lands_on_delivery() {
    let api = Arc::new(MockApi::new());
    api.insert_draft("do_1", remote_draft(true, false, false));
    let store = store_with_draft_id("do_1").await;

    let session = new_session(Arc::clone(&api), store);
    session.reconcile().await.expect("reconcile");
    assert_eq!(session.current_step().await, CheckoutStep::Delivery);
}

#[tokio::test]
async fn test_reconcile_with_settled_payment_lands_on_review() {
    let api = Arc::new(MockApi::new());
    api.insert_draft("do_1", remote_draft(true, true, true));
    let store = store_with_draft_id("do_1").await;

    let session = new_session(Arc::clone(&api), store);
    session.reconcile().await.expect("reconcile");
    assert_eq!(session.current_step().await, CheckoutStep::Review);
}

#[tokio::test]
async fn test_reconcile_hydrates_address_form() {
    let api = Arc::new(MockApi::new());
    api.insert_draft("do_1", remote_draft(true, false, false));
    let store = store_with_draft_id("do_1").await;

    let session = new_session(Arc::clone(&api), store);
    session.reconcile().await.expect("reconcile");
    assert_eq!(session.current_step().await, CheckoutStep::Delivery);

    // Revisiting the address step validates cleanly without retyping
    // anything: the form was hydrated from the remote draft.
    session.go_to(0).await;
    session.advance().await.expect("address already valid");
    assert_eq!(session.current_step().await, CheckoutStep::Delivery);
}

#[tokio::test]
async fn test_reconcile_missing_remote_draft_starts_fresh() {
    let api = Arc::new(MockApi::new());
    // No draft on the backend side.
    let store = store_with_draft_id("do_gone").await;

    let session = new_session(Arc::clone(&api), Arc::clone(&store));
    session.reconcile().await.expect("starts fresh, not stuck");

    assert_eq!(session.current_step().await, CheckoutStep::Address);
    let id: Option<DraftOrderId> = store
        .get_record(keys::DRAFT_ORDER_ID)
        .await
        .expect("store read");
    assert!(id.is_none(), "dangling durable id is discarded");
}

#[tokio::test]
async fn test_reconcile_inconsistent_draft_is_an_error() {
    let api = Arc::new(MockApi::new());
    // Payment method chosen but no address: nothing earlier was filled in.
    let mut draft = remote_draft(false, false, false);
    draft.payment_method = Some(PaymentMethod::Card);
    api.insert_draft("do_odd", draft);
    let store = store_with_draft_id("do_odd").await;

    let session = new_session(Arc::clone(&api), Arc::clone(&store));
    let err = session.reconcile().await.expect_err("inconsistent");
    assert!(matches!(err, CheckoutError::InconsistentDraft(_)));

    // The durable id is retained for inspection, not silently dropped.
    let id: Option<DraftOrderId> = store
        .get_record(keys::DRAFT_ORDER_ID)
        .await
        .expect("store read");
    assert!(id.is_some());
}

#[tokio::test]
async fn test_reconcile_without_durable_id_is_a_noop() {
    let api = Arc::new(MockApi::new());
    let session = new_session(Arc::clone(&api), Arc::new(MemoryStore::new()));
    session.reconcile().await.expect("nothing to do");
    assert_eq!(api.get_calls.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Stale Draft Cleanup
// =============================================================================

#[tokio::test]
async fn test_elapsed_deadline_deletes_draft_and_clears_records() {
    let api = Arc::new(MockApi::new());
    api.insert_draft("do_old", remote_draft(true, false, false));
    let store = store_with_draft_id("do_old").await;
    store
        .put_record(keys::CLEANUP_AFTER, &(Utc::now() - Duration::hours(1)))
        .await
        .expect("stamp");

    let session = new_session(Arc::clone(&api), Arc::clone(&store));
    let cleaned = session.run_stale_cleanup().await.expect("cleanup");
    assert!(cleaned);

    assert_eq!(api.delete_calls.load(Ordering::SeqCst), 1);
    assert!(api.draft("do_old").is_none(), "deleted remotely");
    let id: Option<DraftOrderId> = store
        .get_record(keys::DRAFT_ORDER_ID)
        .await
        .expect("store read");
    assert!(id.is_none(), "durable id cleared");
    assert!(session.view().await.draft.is_none(), "no draft in memory");
}

#[tokio::test]
async fn test_future_deadline_leaves_draft_alone() {
    let api = Arc::new(MockApi::new());
    api.insert_draft("do_live", remote_draft(true, false, false));
    let store = store_with_draft_id("do_live").await;
    store
        .put_record(keys::CLEANUP_AFTER, &(Utc::now() + Duration::hours(23)))
        .await
        .expect("stamp");

    let session = new_session(Arc::clone(&api), Arc::clone(&store));
    let cleaned = session.run_stale_cleanup().await.expect("no cleanup");
    assert!(!cleaned);
    assert_eq!(api.delete_calls.load(Ordering::SeqCst), 0);
    assert!(api.draft("do_live").is_some());
}

#[tokio::test]
async fn test_cleanup_tolerates_already_deleted_draft() {
    let api = Arc::new(MockApi::new());
    // Deadline elapsed but the backend already lost the draft.
    let store = store_with_draft_id("do_gone").await;
    store
        .put_record(keys::CLEANUP_AFTER, &(Utc::now() - Duration::hours(2)))
        .await
        .expect("stamp");

    let session = new_session(Arc::clone(&api), Arc::clone(&store));
    let cleaned = session.run_stale_cleanup().await.expect("cleanup");
    assert!(cleaned);
    let id: Option<DraftOrderId> = store
        .get_record(keys::DRAFT_ORDER_ID)
        .await
        .expect("store read");
    assert!(id.is_none());
}

#[tokio::test]
async fn test_stamp_is_a_noop_without_a_draft() {
    let api = Arc::new(MockApi::new());
    let store = Arc::new(MemoryStore::new());
    let session = new_session(Arc::clone(&api), Arc::clone(&store));

    session.stamp_cleanup_deadline().await.expect("stamp");
    let deadline: Option<chrono::DateTime<Utc>> = store
        .get_record(keys::CLEANUP_AFTER)
        .await
        .expect("store read");
    assert!(deadline.is_none());
}

#[tokio::test]
async fn test_stamp_sets_deadline_one_day_out() {
    let api = Arc::new(MockApi::new());
    let session = new_session(Arc::clone(&api), Arc::new(MemoryStore::new()));
    session.seed_cart(cart_ten_thousand()).await.expect("seed");
    session.set_address_form(valid_address()).await;
    session.advance().await.expect("creates draft");

    session.stamp_cleanup_deadline().await.expect("stamp");
    // The store is owned by the session here; verify through a second
    // cleanup pass instead: a fresh stamp must not trigger deletion.
    let cleaned = session.run_stale_cleanup().await.expect("consult");
    assert!(!cleaned);
}
