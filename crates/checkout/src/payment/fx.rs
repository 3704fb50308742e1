//! Display-only currency conversion for the invoice confirmation UI.
//!
//! When the selected method bills in a currency other than the order's, the
//! completion handler asks this client for a converted display amount. A
//! conversion failure never blocks payment completion - it only loses a
//! display affordance - so callers treat errors as warnings.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use tidepool_core::{CurrencyCode, Money};

/// Errors from the FX rates endpoint.
#[derive(Debug, Error)]
pub enum FxError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// No rate published for the requested pair.
    #[error("no rate available for {base}/{quote}")]
    RateUnavailable { base: String, quote: String },
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, Decimal>,
}

/// Thin client for a free FX rates endpoint.
#[derive(Clone)]
pub struct FxClient {
    client: reqwest::Client,
    base_url: String,
}

impl FxClient {
    /// Create a new FX client against the configured rates endpoint.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetch the conversion rate from `base` to `quote`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the pair is not published.
    pub async fn get_rate(
        &self,
        base: CurrencyCode,
        quote: CurrencyCode,
    ) -> Result<Decimal, FxError> {
        let url = format!(
            "{}?base={}&symbols={}",
            self.base_url,
            base.as_str(),
            quote.as_str()
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FxError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let rates: RatesResponse = response.json().await?;
        rates
            .rates
            .get(quote.as_str())
            .copied()
            .ok_or_else(|| FxError::RateUnavailable {
                base: base.as_str().to_owned(),
                quote: quote.as_str().to_owned(),
            })
    }

    /// Convert an amount into `quote` for display.
    ///
    /// # Errors
    ///
    /// Returns an error if no rate could be fetched.
    pub async fn convert(&self, amount: Money, quote: CurrencyCode) -> Result<Money, FxError> {
        if amount.currency_code == quote {
            return Ok(amount);
        }
        let rate = self.get_rate(amount.currency_code, quote).await?;
        Ok(Money::new((amount.amount * rate).round_dp(2), quote))
    }
}
