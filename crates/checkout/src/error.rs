//! Checkout error taxonomy.
//!
//! Three families, matching how each is surfaced:
//!
//! - *Validation* errors are user-fixable, block step advancement, and never
//!   escalate past the current step.
//! - *Remote* errors are backend failures that cannot be tolerated (draft
//!   creation with no fallback left, fetching a draft that must exist, the
//!   final conversion). Tolerable update failures are not errors at all -
//!   they set [`crate::draft::SyncState::Error`] and log a warning.
//! - The remaining variants are fatal or precondition failures that abort the
//!   flow with an explicit reason and return the shopper to a safe point.

use thiserror::Error;

use crate::remote::RemoteError;
use crate::steps::CheckoutStep;
use crate::store::StoreError;

/// Errors produced by the checkout engine.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Step validation failed; the shopper can fix the input and retry.
    #[error("{message}")]
    Validation {
        /// The step whose validator rejected the input.
        step: CheckoutStep,
        /// User-facing message naming the offending field(s).
        message: String,
    },

    /// Commerce backend operation failed and could not be tolerated.
    #[error("Backend error: {0}")]
    Remote(#[from] RemoteError),

    /// Durable record store failed.
    #[error("Durable store error: {0}")]
    Store(#[from] StoreError),

    /// A payment-provider callback was missing proof-of-completion fields.
    #[error("payment callback missing required fields: {}", missing.join(", "))]
    PaymentCallbackIncomplete {
        /// Names of the absent fields.
        missing: Vec<String>,
    },

    /// A provider callback carried a status that does not prove completion.
    #[error("payment callback reported unexpected status: {0}")]
    PaymentCallbackStatus(String),

    /// The remote draft contradicts itself (e.g. a payment method chosen
    /// with no shipping address). Surfaced instead of guessing a step.
    #[error("draft order state is inconsistent: {0}")]
    InconsistentDraft(String),

    /// Checkout was entered with nothing to buy and no recoverable draft.
    #[error("cart is empty")]
    EmptyCart,

    /// An operation required a draft order that does not exist yet.
    #[error("no draft order exists")]
    NoDraft,

    /// A finalization precondition failed; the draft and cart are intact.
    #[error("order cannot be placed: {0}")]
    FinalizationBlocked(String),
}

impl CheckoutError {
    /// Convenience constructor for step validation failures.
    pub fn validation(step: CheckoutStep, message: impl Into<String>) -> Self {
        Self::Validation {
            step,
            message: message.into(),
        }
    }

    /// Whether the shopper can fix this themselves without support.
    #[must_use]
    pub const fn is_user_fixable(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::PaymentCallbackIncomplete { .. } | Self::EmptyCart
        )
    }
}
