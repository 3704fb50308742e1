//! Payment completion handling.
//!
//! Normalizes asynchronous, provider-specific success/error/cancel callbacks
//! into the draft order's payment fields, independent of which step is
//! active - a provider popup may resolve after the shopper has navigated
//! away. The durable side-channel record is written before anything else so
//! a reload cannot lose a completed payment.

use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use tidepool_core::{Money, PaymentStatus};

use crate::draft::DraftPatch;
use crate::error::CheckoutError;
use crate::payment::callback::{CompletedPaymentRecord, ProviderCallback, WalletTransaction};
use crate::payment::{PaymentDetails, PaymentFormData, PaymentMethod};
use crate::remote::DraftOrderApi;
use crate::session::CheckoutSession;
use crate::store::{DurableStore, DurableStoreExt, keys};

/// Result of a processed success callback.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub status: PaymentStatus,
    /// Charged amount converted into the order's currency, when the method
    /// billed in a foreign currency and a rate was available. Display only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_amount: Option<Money>,
}

impl<A: DraftOrderApi, S: DurableStore> CheckoutSession<A, S> {
    /// Handle a provider success callback.
    ///
    /// Idempotent on the transaction id: a duplicate callback only
    /// re-confirms the recorded status, with no repeated side effects.
    /// The remote draft update is best-effort - the money has already
    /// moved, so a failed mirror write must not block the shopper.
    ///
    /// # Errors
    ///
    /// Rejects callbacks missing any proof-of-completion field without
    /// touching the payment status.
    #[instrument(skip(self, callback))]
    pub async fn payment_succeeded(
        &self,
        callback: ProviderCallback,
    ) -> Result<PaymentOutcome, CheckoutError> {
        let transaction = callback.into_completed()?;

        if let Some(status) = self.already_recorded(&transaction).await {
            tracing::debug!(
                transaction_id = %transaction.transaction_id,
                "Duplicate provider callback; re-confirming"
            );
            return Ok(PaymentOutcome {
                status,
                display_amount: None,
            });
        }

        let record = CompletedPaymentRecord {
            method: PaymentMethod::Paypal,
            transaction: transaction.clone(),
            recorded_at: Utc::now(),
        };
        // Durable record first: a reload between here and the draft update
        // must still recover the completed payment.
        self.store.put_record(keys::COMPLETED_PAYMENT, &record).await?;

        let status = transaction.status;
        let patch = DraftPatch {
            payment_method: Some(PaymentMethod::Paypal),
            payment_details: Some(PaymentDetails::Wallet(transaction.clone())),
            payment_status: Some(status),
            ..DraftPatch::default()
        };
        if let Err(e) = self.apply_update(patch).await {
            tracing::warn!(error = %e, "Completed payment could not be mirrored to the draft; continuing");
        }

        let display_amount = self.display_conversion(&transaction).await;
        Ok(PaymentOutcome {
            status,
            display_amount,
        })
    }

    /// Handle a provider error callback.
    ///
    /// The failure is always surfaced to the shopper verbatim; the remote
    /// update is attempted but not required to succeed first.
    #[instrument(skip(self))]
    pub async fn payment_failed(&self, reason: &str) -> Result<(), CheckoutError> {
        tracing::warn!(reason, "Payment provider reported an error");
        let patch = DraftPatch {
            payment_status: Some(PaymentStatus::Failed),
            ..DraftPatch::default()
        };
        if let Err(e) = self.apply_update(patch).await {
            tracing::warn!(error = %e, "Failed payment status could not be mirrored to the draft");
        }
        Ok(())
    }

    /// Handle a provider cancel callback.
    ///
    /// No retry state is implied; the shopper must explicitly re-initiate
    /// payment.
    #[instrument(skip(self))]
    pub async fn payment_cancelled(&self) -> Result<(), CheckoutError> {
        let patch = DraftPatch {
            payment_status: Some(PaymentStatus::Cancelled),
            ..DraftPatch::default()
        };
        if let Err(e) = self.apply_update(patch).await {
            tracing::warn!(error = %e, "Cancelled payment status could not be mirrored to the draft");
        }
        Ok(())
    }

    /// Record the result of the embedded card-capture flow.
    ///
    /// Card capture is its own sequenced operation: it runs before the
    /// Payment step can advance, and the step validator only checks the
    /// status recorded here.
    #[instrument(skip(self, form))]
    pub async fn card_capture_completed(
        &self,
        form: PaymentFormData,
        status: PaymentStatus,
    ) -> Result<(), CheckoutError> {
        let status = if status.is_settled() {
            status
        } else {
            PaymentStatus::Failed
        };
        let summary = form.summarize();

        {
            let mut state = self.state.lock().await;
            state.payment_form = form;
            state.selected_method = Some(PaymentMethod::Card);
        }

        let patch = DraftPatch {
            payment_method: Some(PaymentMethod::Card),
            payment_details: Some(PaymentDetails::Card(summary)),
            payment_status: Some(status),
            ..DraftPatch::default()
        };
        if let Err(e) = self.apply_update(patch).await {
            tracing::warn!(error = %e, "Card capture result could not be mirrored to the draft");
        }
        Ok(())
    }

    /// Adopt a durable completed-payment record into the in-memory draft.
    ///
    /// Used by the payment validator when the in-memory status lags the
    /// side-channel record (reload between callback and update).
    pub(crate) async fn adopt_completed_payment(&self, record: &CompletedPaymentRecord) {
        let mut state = self.state.lock().await;
        state.selected_method = Some(record.method);
        if let Some(draft) = state.draft.as_mut() {
            draft.payment_method = Some(record.method);
            draft.payment_status = record.transaction.status;
            draft.payment_details = Some(PaymentDetails::Wallet(record.transaction.clone()));
        }
    }

    /// Whether this transaction is already recorded as settled.
    async fn already_recorded(&self, transaction: &WalletTransaction) -> Option<PaymentStatus> {
        let state = self.state.lock().await;
        let draft = state.draft.as_ref()?;
        match &draft.payment_details {
            Some(PaymentDetails::Wallet(existing))
                if existing.transaction_id == transaction.transaction_id
                    && draft.payment_status.is_settled() =>
            {
                Some(draft.payment_status)
            }
            _ => None,
        }
    }

    /// Best-effort display conversion of the charged amount into the order's
    /// currency. Failure only loses a display affordance.
    async fn display_conversion(&self, transaction: &WalletTransaction) -> Option<Money> {
        let order_currency = self.state.lock().await.draft.as_ref()?.currency();
        if transaction.amount.currency_code == order_currency {
            return None;
        }
        let fx = self.fx.as_ref()?;
        match fx.convert(transaction.amount, order_currency).await {
            Ok(converted) => Some(converted),
            Err(e) => {
                tracing::warn!(error = %e, "Display currency conversion failed; omitting");
                None
            }
        }
    }
}
