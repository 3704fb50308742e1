//! Provider callback payloads and the durable side-channel record.
//!
//! A provider popup can resolve at an arbitrary point in time, including
//! after the shopper has navigated away or reloaded. The completeness checks
//! here gate what counts as *proof* of a completed transaction, and the
//! [`CompletedPaymentRecord`] persists that proof so whichever component runs
//! later (completion handler or payment validator) sees consistent data.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tidepool_core::{CurrencyCode, Money, PayerId, PaymentStatus, TransactionId};

use crate::error::CheckoutError;
use crate::payment::PaymentMethod;

/// Raw success payload from the payment provider.
///
/// Every field is optional at the wire level; [`ProviderCallback::into_completed`]
/// decides what is actually proof of completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderCallback {
    pub transaction_id: Option<String>,
    pub payer_id: Option<String>,
    pub payer_email: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

impl ProviderCallback {
    /// Validate completeness and normalize into a [`WalletTransaction`].
    ///
    /// Missing any proof field (transaction id, payer identity, amount,
    /// currency, status) is a hard failure, not a partial success.
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::PaymentCallbackIncomplete`] naming the absent fields.
    /// - [`CheckoutError::PaymentCallbackStatus`] if the reported status does
    ///   not indicate a settled payment.
    pub fn into_completed(self) -> Result<WalletTransaction, CheckoutError> {
        let mut missing = Vec::new();

        let absent = |value: &Option<String>| value.as_deref().is_none_or(str::is_empty);
        if absent(&self.transaction_id) {
            missing.push("transactionId".to_owned());
        }
        if absent(&self.payer_id) {
            missing.push("payerId".to_owned());
        }
        if absent(&self.payer_email) {
            missing.push("payerEmail".to_owned());
        }
        if self.amount.is_none() {
            missing.push("amount".to_owned());
        }
        if absent(&self.currency) {
            missing.push("currency".to_owned());
        }
        if absent(&self.status) {
            missing.push("status".to_owned());
        }
        if !missing.is_empty() {
            return Err(CheckoutError::PaymentCallbackIncomplete { missing });
        }

        // All unwrapped values were just checked.
        let raw_status = self.status.unwrap_or_default();
        let status = normalize_provider_status(&raw_status)
            .ok_or(CheckoutError::PaymentCallbackStatus(raw_status))?;

        let currency_raw = self.currency.unwrap_or_default();
        let currency: CurrencyCode = currency_raw
            .parse()
            .map_err(CheckoutError::PaymentCallbackStatus)?;

        Ok(WalletTransaction {
            transaction_id: TransactionId::new(self.transaction_id.unwrap_or_default()),
            payer_id: PayerId::new(self.payer_id.unwrap_or_default()),
            payer_email: self.payer_email.unwrap_or_default(),
            amount: Money::new(self.amount.unwrap_or_default(), currency),
            status,
            create_time: self.create_time,
            update_time: self.update_time,
        })
    }
}

/// A normalized, proven wallet transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub transaction_id: TransactionId,
    pub payer_id: PayerId,
    pub payer_email: String,
    pub amount: Money,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
}

/// Durable record of the last completed provider callback.
///
/// Written before the in-memory draft order is touched, so a page reload
/// between the provider callback and the in-memory update can still recover
/// the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPaymentRecord {
    pub method: PaymentMethod,
    pub transaction: WalletTransaction,
    pub recorded_at: DateTime<Utc>,
}

impl CompletedPaymentRecord {
    /// Whether this record proves a settled payment.
    #[must_use]
    pub const fn indicates_completion(&self) -> bool {
        self.transaction.status.is_settled()
    }
}

/// Map a provider status string onto our payment status.
///
/// Providers report capture results as `COMPLETED`/`CAPTURED` and
/// authorization-only results as `APPROVED`/`AUTHORIZED`; anything else does
/// not prove a settled payment.
fn normalize_provider_status(raw: &str) -> Option<PaymentStatus> {
    match raw.to_ascii_uppercase().as_str() {
        "COMPLETED" | "CAPTURED" | "PAID" => Some(PaymentStatus::Paid),
        "APPROVED" | "AUTHORIZED" => Some(PaymentStatus::Authorized),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn complete_callback() -> ProviderCallback {
        ProviderCallback {
            transaction_id: Some("8XY12345AB6789012".to_owned()),
            payer_id: Some("PAYER123".to_owned()),
            payer_email: Some("maya@example.com".to_owned()),
            amount: Some("64.50".parse().unwrap()),
            currency: Some("USD".to_owned()),
            status: Some("COMPLETED".to_owned()),
            create_time: Some(Utc::now()),
            update_time: Some(Utc::now()),
        }
    }

    #[test]
    fn test_complete_callback_normalizes() {
        let txn = complete_callback().into_completed().unwrap();
        assert_eq!(txn.status, PaymentStatus::Paid);
        assert_eq!(txn.amount.currency_code, CurrencyCode::USD);
        assert_eq!(txn.transaction_id.as_str(), "8XY12345AB6789012");
    }

    #[test]
    fn test_missing_payer_email_is_hard_failure() {
        let callback = ProviderCallback {
            payer_email: None,
            ..complete_callback()
        };
        let err = callback.into_completed().unwrap_err();
        match err {
            CheckoutError::PaymentCallbackIncomplete { missing } => {
                assert_eq!(missing, vec!["payerEmail".to_owned()]);
            }
            other => panic!("expected incomplete-callback error, got {other}"),
        }
    }

    #[test]
    fn test_empty_string_counts_as_missing() {
        let callback = ProviderCallback {
            transaction_id: Some(String::new()),
            ..complete_callback()
        };
        assert!(matches!(
            callback.into_completed(),
            Err(CheckoutError::PaymentCallbackIncomplete { .. })
        ));
    }

    #[test]
    fn test_multiple_missing_fields_all_reported() {
        let callback = ProviderCallback {
            payer_id: None,
            amount: None,
            ..complete_callback()
        };
        match callback.into_completed().unwrap_err() {
            CheckoutError::PaymentCallbackIncomplete { missing } => {
                assert_eq!(missing, vec!["payerId".to_owned(), "amount".to_owned()]);
            }
            other => panic!("expected incomplete-callback error, got {other}"),
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        let callback = ProviderCallback {
            status: Some("PENDING_REVIEW".to_owned()),
            ..complete_callback()
        };
        assert!(matches!(
            callback.into_completed(),
            Err(CheckoutError::PaymentCallbackStatus(_))
        ));
    }

    #[test]
    fn test_authorized_status_maps_to_authorized() {
        let callback = ProviderCallback {
            status: Some("approved".to_owned()),
            ..complete_callback()
        };
        let txn = callback.into_completed().unwrap();
        assert_eq!(txn.status, PaymentStatus::Authorized);
    }

    #[test]
    fn test_record_indicates_completion() {
        let record = CompletedPaymentRecord {
            method: PaymentMethod::Paypal,
            transaction: complete_callback().into_completed().unwrap(),
            recorded_at: Utc::now(),
        };
        assert!(record.indicates_completion());
    }
}
