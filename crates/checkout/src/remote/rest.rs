//! Commerce backend REST client implementation.
//!
//! Uses `reqwest` with bearer auth. The shopper's address book is cached
//! with `moka` (5-minute TTL) and invalidated on writes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use tidepool_core::DraftOrderId;

use crate::address::RemoteAddress;
use crate::draft::{DraftOrder, DraftPatch};
use crate::remote::{DraftOrderApi, FinalOrder, RemoteError};

/// Cache key for the shopper's address book.
const ADDRESS_BOOK_KEY: &str = "me";

/// Commerce backend connection configuration.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct BackendConfig {
    /// Base URL of the backend API (e.g. `https://api.example.com/v1`).
    pub base_url: String,
    /// Bearer token for the storefront's service account.
    pub access_token: SecretString,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Client for the commerce backend REST API.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<RestClientInner>,
}

struct RestClientInner {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    address_cache: Cache<String, Arc<Vec<RemoteAddress>>>,
}

impl RestClient {
    /// Create a new backend API client.
    #[must_use]
    pub fn new(config: &BackendConfig) -> Self {
        let address_cache = Cache::builder()
            .max_capacity(100)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(RestClientInner {
                client: reqwest::Client::new(),
                base_url: config.base_url.trim_end_matches('/').to_owned(),
                access_token: config.access_token.expose_secret().to_owned(),
                address_cache,
            }),
        }
    }

    /// Execute a request and decode the JSON response.
    async fn execute<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<T, RemoteError> {
        let text = self.execute_raw(method, path, body).await?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            RemoteError::Parse(e)
        })
    }

    /// Execute a request, mapping status codes to typed errors, and return
    /// the raw body text for diagnostics-friendly parsing.
    async fn execute_raw(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<String, RemoteError> {
        let url = format!("{}{path}", self.inner.base_url);

        let mut request = self
            .inner
            .client
            .request(method, &url)
            .bearer_auth(&self.inner.access_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(RemoteError::RateLimited(retry_after));
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(path.to_owned()));
        }

        let text = response.text().await?;

        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            return Err(RemoteError::UserError(
                text.chars().take(200).collect::<String>(),
            ));
        }

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %text.chars().take(500).collect::<String>(),
                "Backend returned non-success status"
            );
            return Err(RemoteError::Api {
                status: status.as_u16(),
                message: text.chars().take(200).collect::<String>(),
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl DraftOrderApi for RestClient {
    #[instrument(skip(self, draft))]
    async fn create_draft_order(&self, draft: &DraftOrder) -> Result<DraftOrder, RemoteError> {
        self.execute(reqwest::Method::POST, "/draft-orders", Some(draft))
            .await
    }

    #[instrument(skip(self))]
    async fn get_draft_order(&self, id: &DraftOrderId) -> Result<DraftOrder, RemoteError> {
        self.execute(
            reqwest::Method::GET,
            &format!("/draft-orders/{id}"),
            None::<&()>,
        )
        .await
    }

    #[instrument(skip(self, patch))]
    async fn update_draft_order(
        &self,
        id: &DraftOrderId,
        patch: &DraftPatch,
    ) -> Result<DraftOrder, RemoteError> {
        self.execute(
            reqwest::Method::PUT,
            &format!("/draft-orders/{id}"),
            Some(patch),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_draft_order(&self, id: &DraftOrderId) -> Result<(), RemoteError> {
        self.execute_raw(
            reqwest::Method::DELETE,
            &format!("/draft-orders/{id}"),
            None::<&()>,
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn convert_draft_to_order(&self, id: &DraftOrderId) -> Result<FinalOrder, RemoteError> {
        self.execute(
            reqwest::Method::POST,
            &format!("/draft-orders/{id}/convert"),
            None::<&()>,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_my_addresses(&self) -> Result<Vec<RemoteAddress>, RemoteError> {
        if let Some(cached) = self.inner.address_cache.get(ADDRESS_BOOK_KEY).await {
            return Ok(cached.as_ref().clone());
        }

        let addresses: Vec<RemoteAddress> = self
            .execute(reqwest::Method::GET, "/me/addresses", None::<&()>)
            .await?;
        self.inner
            .address_cache
            .insert(ADDRESS_BOOK_KEY.to_owned(), Arc::new(addresses.clone()))
            .await;
        Ok(addresses)
    }

    #[instrument(skip(self, address))]
    async fn save_address(&self, address: &RemoteAddress) -> Result<RemoteAddress, RemoteError> {
        let saved = self
            .execute(reqwest::Method::POST, "/me/addresses", Some(address))
            .await?;
        // The cached book is stale now.
        self.inner.address_cache.invalidate(ADDRESS_BOOK_KEY).await;
        Ok(saved)
    }
}
