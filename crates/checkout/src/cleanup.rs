//! Stale draft cleanup.
//!
//! Abandoned checkouts are bounded: every load/unload stamps a durable
//! cleanup-after deadline for the current draft, and a load that finds an
//! elapsed deadline deletes the draft remotely and discards every durable
//! reference to it.

use chrono::{DateTime, Utc};
use tracing::instrument;

use tidepool_core::DraftOrderId;

use crate::error::CheckoutError;
use crate::remote::DraftOrderApi;
use crate::session::CheckoutSession;
use crate::store::{DurableStore, DurableStoreExt, keys};

/// How long an abandoned draft lives.
pub const DRAFT_TTL_HOURS: i64 = 24;

impl<A: DraftOrderApi, S: DurableStore> CheckoutSession<A, S> {
    /// Stamp the cleanup deadline (`now + 24h`) for the current draft.
    ///
    /// Call on page load (after [`Self::run_stale_cleanup`]) and on unload.
    /// A no-op when no draft id is recorded.
    ///
    /// # Errors
    ///
    /// Propagates durable store failures.
    pub async fn stamp_cleanup_deadline(&self) -> Result<(), CheckoutError> {
        let id: Option<DraftOrderId> = self.store.get_record(keys::DRAFT_ORDER_ID).await?;
        if id.is_none() {
            return Ok(());
        }
        let deadline = Utc::now() + chrono::Duration::hours(DRAFT_TTL_HOURS);
        self.store.put_record(keys::CLEANUP_AFTER, &deadline).await?;
        Ok(())
    }

    /// Delete the draft if its cleanup deadline has elapsed.
    ///
    /// Call on page load before reconciling. Returns `true` when a stale
    /// draft was cleaned up; the shopper then starts a fresh checkout.
    ///
    /// # Errors
    ///
    /// Propagates durable store failures. Remote delete failures are logged
    /// but do not block discarding the local references.
    #[instrument(skip(self))]
    pub async fn run_stale_cleanup(&self) -> Result<bool, CheckoutError> {
        let Some(deadline) = self
            .store
            .get_record::<DateTime<Utc>>(keys::CLEANUP_AFTER)
            .await?
        else {
            return Ok(false);
        };
        if deadline > Utc::now() {
            return Ok(false);
        }

        if let Some(id) = self
            .store
            .get_record::<DraftOrderId>(keys::DRAFT_ORDER_ID)
            .await?
        {
            match self.api.delete_draft_order(&id).await {
                Ok(()) => tracing::info!(draft_id = %id, "Deleted abandoned draft order"),
                Err(e) if e.is_not_found() => {
                    // Already gone on the backend; nothing to delete.
                }
                Err(e) => {
                    tracing::warn!(error = %e, draft_id = %id, "Could not delete abandoned draft order");
                }
            }
        }

        for key in [keys::DRAFT_ORDER_ID, keys::COMPLETED_PAYMENT, keys::CLEANUP_AFTER] {
            self.store.remove_value(key).await?;
        }
        self.state.lock().await.draft = None;
        Ok(true)
    }
}
