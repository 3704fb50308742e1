//! Durable per-shopper records.
//!
//! The checkout core owns exactly three durable artifacts: the draft-order
//! id, the last completed payment callback, and the cleanup-after deadline
//! (plus the cart snapshot it was seeded with). Their absence is always
//! handled as "start fresh", never as an error.
//!
//! The engine is generic over [`DurableStore`] so the storefront can back it
//! with a server session while tests use [`MemoryStore`].

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Keys for the durable records the checkout core owns.
///
/// Each record has a single writer by convention: only the component that
/// produced the event writes it.
pub mod keys {
    /// The id of the shopper's in-progress draft order.
    pub const DRAFT_ORDER_ID: &str = "checkout.draft_order_id";

    /// Side-channel record of the last completed provider callback.
    pub const COMPLETED_PAYMENT: &str = "checkout.completed_payment";

    /// Instant after which an abandoned draft is deleted.
    pub const CLEANUP_AFTER: &str = "checkout.cleanup_after";

    /// The cart snapshot the draft was (or will be) seeded from.
    pub const CART_SNAPSHOT: &str = "checkout.cart_snapshot";
}

/// Errors from the durable record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store failed.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A record could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A durable string-keyed JSON record store.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read a record; `None` means "start fresh".
    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Write a record.
    async fn put_value(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;

    /// Remove a record. Removing an absent record is not an error.
    async fn remove_value(&self, key: &str) -> Result<(), StoreError>;
}

/// Typed helpers over [`DurableStore`].
#[async_trait]
pub trait DurableStoreExt: DurableStore {
    /// Read and deserialize a record.
    async fn get_record<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.get_value(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Serialize and write a record.
    async fn put_record<T: Serialize + Sync>(
        &self,
        key: &str,
        record: &T,
    ) -> Result<(), StoreError> {
        self.put_value(key, serde_json::to_value(record)?).await
    }
}

#[async_trait]
impl<S: DurableStore + ?Sized> DurableStoreExt for S {}

// A shared store is still a store; sessions often hand the same backing
// records to several components.
#[async_trait]
impl<S: DurableStore + ?Sized> DurableStore for std::sync::Arc<S> {
    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.as_ref().get_value(key).await
    }

    async fn put_value(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.as_ref().put_value(key, value).await
    }

    async fn remove_value(&self, key: &str) -> Result<(), StoreError> {
        self.as_ref().remove_value(key).await
    }
}

/// In-memory [`DurableStore`] for tests and single-process use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(records.get(key).cloned())
    }

    async fn put_value(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        records.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove_value(&self, key: &str) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        records.remove(key);
        Ok(())
    }
}
