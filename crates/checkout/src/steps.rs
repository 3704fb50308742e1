//! The four-step checkout wizard and its per-step validators.
//!
//! `Address(0) -> Delivery(1) -> Payment(2) -> Review(3)`, strictly linear.
//! Advancing validates the *current* step, persists that step's data to the
//! draft order, and only then increments the index - so by the time the
//! shopper sees step N+1, step N's data has at least been attempted against
//! the backend.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use tidepool_core::PaymentStatus;

use crate::draft::DraftPatch;
use crate::error::CheckoutError;
use crate::payment::{CompletedPaymentRecord, PaymentDetails, PaymentMethod};
use crate::remote::DraftOrderApi;
use crate::session::CheckoutSession;
use crate::store::{DurableStore, DurableStoreExt, keys};

/// One of the four linear checkout stages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    #[default]
    Address,
    Delivery,
    Payment,
    Review,
}

impl CheckoutStep {
    /// Zero-based index of the step.
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::Address => 0,
            Self::Delivery => 1,
            Self::Payment => 2,
            Self::Review => 3,
        }
    }

    /// Step for an index, clamped into `[0, 3]`.
    #[must_use]
    pub const fn from_index(index: u8) -> Self {
        match index {
            0 => Self::Address,
            1 => Self::Delivery,
            2 => Self::Payment,
            _ => Self::Review,
        }
    }

    /// Next step, saturating at Review.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Address => Self::Delivery,
            Self::Delivery => Self::Payment,
            Self::Payment | Self::Review => Self::Review,
        }
    }

    /// Previous step, with a floor of Address.
    #[must_use]
    pub const fn prev(self) -> Self {
        match self {
            Self::Address | Self::Delivery => Self::Address,
            Self::Payment => Self::Delivery,
            Self::Review => Self::Payment,
        }
    }

    /// Whether this is the terminal step before finalization.
    #[must_use]
    pub const fn is_review(self) -> bool {
        matches!(self, Self::Review)
    }
}

impl std::fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Address => "address",
            Self::Delivery => "delivery",
            Self::Payment => "payment",
            Self::Review => "review",
        };
        write!(f, "{name}")
    }
}

impl<A: DraftOrderApi, S: DurableStore> CheckoutSession<A, S> {
    /// Validate the current step, persist its data, and move forward.
    ///
    /// The step index only increments after the draft update has settled
    /// (success or tolerated failure). Leaving the Payment step skips field
    /// re-validation when the payment is already authorized or paid: the
    /// capture has proven it valid.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::Validation`] leaves the index unchanged and issues
    /// no remote call at all; creation failures propagate after one
    /// re-attempt.
    #[instrument(skip(self))]
    pub async fn advance(&self) -> Result<CheckoutStep, CheckoutError> {
        let step = self.current_step().await;

        let patch = match step {
            CheckoutStep::Address => {
                let form = self.state.lock().await.address_form.clone();
                form.validate()
                    .map_err(|message| CheckoutError::validation(step, message))?;
                let remote = form.to_remote();
                DraftPatch {
                    shipping_address: Some(remote.clone()),
                    billing_address: Some(remote),
                    ..DraftPatch::default()
                }
            }
            CheckoutStep::Delivery => {
                let quote = self
                    .state
                    .lock()
                    .await
                    .selected_shipping
                    .clone()
                    .ok_or_else(|| CheckoutError::validation(step, "select a delivery method"))?;
                DraftPatch {
                    shipping_method_id: Some(quote.method_id),
                    shipping_cost: Some(quote.cost),
                    ..DraftPatch::default()
                }
            }
            CheckoutStep::Payment => {
                let already_settled = self
                    .state
                    .lock()
                    .await
                    .draft
                    .as_ref()
                    .is_some_and(|draft| draft.payment_status.is_settled());
                if !already_settled {
                    self.validate_payment().await?;
                }
                self.payment_patch().await?
            }
            CheckoutStep::Review => {
                return Err(CheckoutError::validation(
                    step,
                    "review is the final step; place the order to continue",
                ));
            }
        };

        self.ensure_draft_with_fallback().await?;
        self.apply_update(patch).await?;

        let mut state = self.state.lock().await;
        state.step = step.next();
        Ok(state.step)
    }

    /// Move back one step. Always allowed; no validation, no remote call.
    pub async fn retreat(&self) -> CheckoutStep {
        let mut state = self.state.lock().await;
        state.step = state.step.prev();
        state.step
    }

    /// Jump to a step (clamped), for "edit" shortcuts from Review.
    ///
    /// No validation: the shopper is revisiting a step they will re-validate
    /// on the next [`Self::advance`].
    pub async fn go_to(&self, index: u8) -> CheckoutStep {
        let mut state = self.state.lock().await;
        state.step = CheckoutStep::from_index(index);
        state.step
    }

    /// Payment-step validator. Branches on the selected method.
    async fn validate_payment(&self) -> Result<(), CheckoutError> {
        let step = CheckoutStep::Payment;
        let (method, form, status) = {
            let state = self.state.lock().await;
            let status = state
                .draft
                .as_ref()
                .map_or(PaymentStatus::Pending, |draft| draft.payment_status);
            (state.selected_method, state.payment_form.clone(), status)
        };

        let Some(method) = method else {
            return Err(CheckoutError::validation(step, "select a payment method"));
        };

        match method {
            PaymentMethod::Card => {
                // Field checks first, then the capture result: this validator
                // checks that the embedded capture flow has already run and
                // succeeded, not the correctness of an unsubmitted card.
                if !form.all_fields_present() {
                    return Err(CheckoutError::validation(step, "fill in all card fields"));
                }
                if !form.expiry_is_well_formed() {
                    return Err(CheckoutError::validation(
                        step,
                        "enter the card expiry as MM/YY",
                    ));
                }
                if !form.cvv_is_well_formed() {
                    return Err(CheckoutError::validation(step, "enter a valid security code"));
                }
                if !status.is_settled() {
                    return Err(CheckoutError::validation(
                        step,
                        "complete the payment process before continuing",
                    ));
                }
                Ok(())
            }
            PaymentMethod::Paypal => {
                if status == PaymentStatus::Paid {
                    return Ok(());
                }
                // A reload may have landed between the provider callback and
                // the in-memory update; the durable side-channel record wins.
                let record: Option<CompletedPaymentRecord> =
                    self.store.get_record(keys::COMPLETED_PAYMENT).await?;
                match record {
                    Some(record) if record.indicates_completion() => {
                        self.adopt_completed_payment(&record).await;
                        Ok(())
                    }
                    _ => Err(CheckoutError::validation(
                        step,
                        "complete the PayPal payment before continuing",
                    )),
                }
            }
            // Manual methods capture nothing before order placement.
            PaymentMethod::CashOnDelivery | PaymentMethod::BankTransfer => Ok(()),
        }
    }

    /// Build the partial update committed when leaving the Payment step.
    async fn payment_patch(&self) -> Result<DraftPatch, CheckoutError> {
        let state = self.state.lock().await;
        let method = state.selected_method.ok_or_else(|| {
            CheckoutError::validation(CheckoutStep::Payment, "select a payment method")
        })?;

        let status = state
            .draft
            .as_ref()
            .map_or(PaymentStatus::Pending, |draft| draft.payment_status);

        let details = match method {
            // After a reload the raw form is gone but the draft still holds
            // the capture summary; never overwrite it with a blank one.
            PaymentMethod::Card if state.payment_form.all_fields_present() => {
                PaymentDetails::Card(state.payment_form.summarize())
            }
            PaymentMethod::Card => state
                .draft
                .as_ref()
                .and_then(|draft| draft.payment_details.clone())
                .unwrap_or_else(|| PaymentDetails::Card(state.payment_form.summarize())),
            PaymentMethod::Paypal => state
                .draft
                .as_ref()
                .and_then(|draft| draft.payment_details.clone())
                .ok_or_else(|| {
                    CheckoutError::validation(
                        CheckoutStep::Payment,
                        "complete the PayPal payment before continuing",
                    )
                })?,
            PaymentMethod::CashOnDelivery | PaymentMethod::BankTransfer => {
                PaymentDetails::Manual { method }
            }
        };

        Ok(DraftPatch {
            payment_method: Some(method),
            payment_details: Some(details),
            // Manual methods stay pending until after placement.
            payment_status: Some(if method.requires_preauthorization() {
                status
            } else {
                PaymentStatus::Pending
            }),
            ..DraftPatch::default()
        })
    }
}
