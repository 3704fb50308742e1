//! Commerce backend API client.
//!
//! # Architecture
//!
//! - The backend is source of truth for draft orders and the shopper's
//!   address book - no local sync, direct API calls
//! - [`DraftOrderApi`] is the seam: the engine is generic over it, the
//!   production implementation is [`RestClient`], and tests inject mocks
//! - In-memory caching via `moka` for the address book (5 minute TTL)
//!
//! # Example
//!
//! ```rust,ignore
//! use tidepool_checkout::remote::{BackendConfig, RestClient};
//!
//! let client = RestClient::new(&config.backend);
//! let draft = client.create_draft_order(&draft).await?;
//! let order = client.convert_draft_to_order(draft.id.as_ref().unwrap()).await?;
//! ```

mod rest;

pub use rest::{BackendConfig, RestClient};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tidepool_core::{DraftOrderId, Money, OrderId};

use crate::address::RemoteAddress;
use crate::draft::{DraftOrder, DraftPatch, LineItem};

/// Errors that can occur when talking to the commerce backend.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Rejected input (e.g., invalid draft payload).
    #[error("User error: {0}")]
    UserError(String),
}

impl RemoteError {
    /// Whether retrying the same call might succeed.
    ///
    /// Ambiguous failures (timeouts, 5xx) are deliberately *not* retryable
    /// for at-most-once operations like draft conversion.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// The immutable order produced by converting a draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalOrder {
    pub id: OrderId,
    pub order_number: String,
    pub line_items: Vec<LineItem>,
    pub total: Money,
    pub placed_at: DateTime<Utc>,
}

/// Remote operations the checkout core consumes.
///
/// Shape only - transport, retries, and auth refresh live behind the
/// implementation. `convert_draft_to_order` is expected to be at-most-once
/// on the backend side; callers must not retry it blindly.
#[async_trait]
pub trait DraftOrderApi: Send + Sync {
    /// Create a draft order; the backend assigns its id.
    async fn create_draft_order(&self, draft: &DraftOrder) -> Result<DraftOrder, RemoteError>;

    /// Fetch a draft order by id.
    async fn get_draft_order(&self, id: &DraftOrderId) -> Result<DraftOrder, RemoteError>;

    /// Merge a partial update into a draft order.
    async fn update_draft_order(
        &self,
        id: &DraftOrderId,
        patch: &DraftPatch,
    ) -> Result<DraftOrder, RemoteError>;

    /// Delete an abandoned draft order.
    async fn delete_draft_order(&self, id: &DraftOrderId) -> Result<(), RemoteError>;

    /// Promote a draft into an immutable order.
    async fn convert_draft_to_order(&self, id: &DraftOrderId) -> Result<FinalOrder, RemoteError>;

    /// Fetch the shopper's saved addresses.
    async fn get_my_addresses(&self) -> Result<Vec<RemoteAddress>, RemoteError>;

    /// Save an address to the shopper's address book.
    async fn save_address(&self, address: &RemoteAddress) -> Result<RemoteAddress, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::NotFound("draft-123".to_owned());
        assert_eq!(err.to_string(), "Not found: draft-123");

        let err = RemoteError::RateLimited(60);
        assert_eq!(err.to_string(), "Rate limited, retry after 60 seconds");

        let err = RemoteError::Api {
            status: 422,
            message: "invalid draft".to_owned(),
        };
        assert_eq!(err.to_string(), "API error: 422 - invalid draft");
    }

    #[test]
    fn test_not_found_classification() {
        assert!(RemoteError::NotFound("x".to_owned()).is_not_found());
        assert!(
            !RemoteError::Api {
                status: 500,
                message: String::new()
            }
            .is_not_found()
        );
    }
}
