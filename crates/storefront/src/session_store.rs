//! Durable record store backed by the server session.
//!
//! The checkout engine's durable records (draft-order id, completed-payment
//! record, cleanup deadline) live in the shopper's `tower-sessions` session,
//! which survives reloads the same way browser storage would.

use async_trait::async_trait;
use tower_sessions::Session;

use tidepool_checkout::store::{DurableStore, StoreError};

/// [`DurableStore`] over a `tower_sessions::Session`.
#[derive(Clone)]
pub struct SessionStore {
    session: Session,
}

impl SessionStore {
    /// Wrap a request's session.
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl DurableStore for SessionStore {
    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.session
            .get::<serde_json::Value>(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn put_value(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.session
            .insert(key, value)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn remove_value(&self, key: &str) -> Result<(), StoreError> {
        self.session
            .remove::<serde_json::Value>(key)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}
