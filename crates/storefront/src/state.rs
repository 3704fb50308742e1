//! Application state shared across handlers.

use std::sync::Arc;

use tower_sessions::Session;

use tidepool_checkout::payment::FxClient;
use tidepool_checkout::remote::RestClient;
use tidepool_checkout::session::CheckoutSession;

use crate::config::StorefrontConfig;
use crate::session_store::SessionStore;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the backend client and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    backend: RestClient,
    fx: Option<FxClient>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: StorefrontConfig) -> Self {
        let backend = RestClient::new(&config.backend);
        let fx = config.fx_rates_url.as_deref().map(FxClient::new);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                fx,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the commerce backend client.
    #[must_use]
    pub fn backend(&self) -> &RestClient {
        &self.inner.backend
    }

    /// Build a checkout session over this request's server session.
    ///
    /// One per request: the session object hydrates itself from the durable
    /// records and is dropped when the response goes out.
    #[must_use]
    pub fn checkout_session(&self, session: Session) -> CheckoutSession<RestClient, SessionStore> {
        let checkout = CheckoutSession::new(
            Arc::new(self.inner.backend.clone()),
            SessionStore::new(session),
            self.inner.config.tax_rate,
        );
        match &self.inner.fx {
            Some(fx) => checkout.with_fx(fx.clone()),
            None => checkout,
        }
    }
}
