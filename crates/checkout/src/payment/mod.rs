//! Payment methods, form state, and the method-tagged payment details.
//!
//! Raw card data never leaves the process: only the masked
//! [`CardSummary`] projection is stored on the draft order or sent to the
//! backend.

mod callback;
mod fx;
mod handler;

pub use callback::{CompletedPaymentRecord, ProviderCallback, WalletTransaction};
pub use fx::{FxClient, FxError};
pub use handler::PaymentOutcome;

use serde::{Deserialize, Serialize};

/// How the shopper intends to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Embedded card capture; authorization happens before order placement.
    Card,
    /// External wallet with a provider popup and asynchronous callback.
    Paypal,
    /// Manual: paid to the courier on delivery.
    CashOnDelivery,
    /// Manual: settled out of band by transfer.
    BankTransfer,
}

impl PaymentMethod {
    /// Whether this method must be authorized/captured before the order can
    /// be placed. Manual methods settle after placement.
    #[must_use]
    pub const fn requires_preauthorization(self) -> bool {
        matches!(self, Self::Card | Self::Paypal)
    }

    /// User-facing label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Card => "Credit / debit card",
            Self::Paypal => "PayPal",
            Self::CashOnDelivery => "Cash on delivery",
            Self::BankTransfer => "Bank transfer",
        }
    }
}

/// Raw card fields as typed by the shopper.
///
/// Held in memory only while the payment step is active; persisted and
/// transmitted exclusively as a [`CardSummary`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentFormData {
    pub card_number: String,
    pub card_name: String,
    /// `MM/YY`.
    pub expiry: String,
    pub cvv: String,
}

impl PaymentFormData {
    /// Whether all four card fields are present.
    #[must_use]
    pub fn all_fields_present(&self) -> bool {
        !self.card_number.trim().is_empty()
            && !self.card_name.trim().is_empty()
            && !self.expiry.trim().is_empty()
            && !self.cvv.trim().is_empty()
    }

    /// Whether `expiry` matches `MM/YY`.
    #[must_use]
    pub fn expiry_is_well_formed(&self) -> bool {
        let expiry = self.expiry.trim();
        let Some((month, year)) = expiry.split_once('/') else {
            return false;
        };
        month.len() == 2
            && year.len() == 2
            && year.chars().all(|c| c.is_ascii_digit())
            && month
                .parse::<u8>()
                .is_ok_and(|m| (1..=12).contains(&m))
    }

    /// Whether the cvv is at least three digits.
    #[must_use]
    pub fn cvv_is_well_formed(&self) -> bool {
        let cvv = self.cvv.trim();
        cvv.len() >= 3 && cvv.chars().all(|c| c.is_ascii_digit())
    }

    /// The masked projection that is safe to persist.
    #[must_use]
    pub fn summarize(&self) -> CardSummary {
        CardSummary {
            last_four: last_four_digits(&self.card_number),
            masked_name: mask_name(&self.card_name),
            expiry: self.expiry.trim().to_owned(),
        }
    }
}

/// Masked card projection: the only card data the backend ever sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSummary {
    pub last_four: String,
    pub masked_name: String,
    pub expiry: String,
}

/// Method-specific payment details carried on the draft order.
///
/// Modeled as a tagged union rather than an open map so every consumer
/// switches on the method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentDetails {
    /// Masked card capture result.
    Card(CardSummary),
    /// Completed wallet transaction from the provider callback.
    Wallet(WalletTransaction),
    /// Manual methods carry no capture data.
    Manual { method: PaymentMethod },
}

fn last_four_digits(card_number: &str) -> String {
    let digits: Vec<char> = card_number.chars().filter(char::is_ascii_digit).collect();
    digits
        .iter()
        .rev()
        .take(4)
        .rev()
        .collect()
}

/// Keep each name part's first letter, mask the rest.
fn mask_name(name: &str) -> String {
    name.split_whitespace()
        .map(|part| {
            let mut masked: String = part.chars().take(1).collect();
            masked.extend(std::iter::repeat_n('*', part.chars().count().saturating_sub(1)));
            masked
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_preauthorization() {
        assert!(PaymentMethod::Card.requires_preauthorization());
        assert!(PaymentMethod::Paypal.requires_preauthorization());
        assert!(!PaymentMethod::CashOnDelivery.requires_preauthorization());
        assert!(!PaymentMethod::BankTransfer.requires_preauthorization());
    }

    #[test]
    fn test_expiry_format() {
        let mut form = PaymentFormData {
            expiry: "04/27".to_owned(),
            ..PaymentFormData::default()
        };
        assert!(form.expiry_is_well_formed());

        for bad in ["4/27", "13/27", "04-27", "0427", "04/7", "aa/bb"] {
            form.expiry = bad.to_owned();
            assert!(!form.expiry_is_well_formed(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_cvv_length() {
        let mut form = PaymentFormData {
            cvv: "123".to_owned(),
            ..PaymentFormData::default()
        };
        assert!(form.cvv_is_well_formed());

        form.cvv = "1234".to_owned();
        assert!(form.cvv_is_well_formed());

        form.cvv = "12".to_owned();
        assert!(!form.cvv_is_well_formed());

        form.cvv = "12a".to_owned();
        assert!(!form.cvv_is_well_formed());
    }

    #[test]
    fn test_card_summary_masks_everything_sensitive() {
        let form = PaymentFormData {
            card_number: "4242 4242 4242 4242".to_owned(),
            card_name: "Maya Reyes".to_owned(),
            expiry: "04/27".to_owned(),
            cvv: "123".to_owned(),
        };
        let summary = form.summarize();
        assert_eq!(summary.last_four, "4242");
        assert_eq!(summary.masked_name, "M*** R****");
        // The full number and cvv must not appear anywhere in the projection.
        let json = serde_json::to_string(&summary).expect("serialize");
        assert!(!json.contains("4242 4242"));
        assert!(!json.contains("123"));
    }

    #[test]
    fn test_payment_details_is_tagged() {
        let details = PaymentDetails::Manual {
            method: PaymentMethod::CashOnDelivery,
        };
        let json = serde_json::to_value(&details).expect("serialize");
        assert_eq!(json["type"], "manual");
        assert_eq!(json["method"], "cash_on_delivery");
    }
}
