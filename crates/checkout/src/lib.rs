//! Tidepool Checkout - the checkout orchestration engine.
//!
//! Drives a shopper through the four checkout steps (address, delivery,
//! payment, review), mirroring an in-progress order to the commerce backend
//! as a *draft order*, and finally promoting the draft into an immutable
//! order.
//!
//! # Architecture
//!
//! - [`session::CheckoutSession`] owns all per-shopper checkout state and is
//!   the single writer of the draft order. Handlers construct one per
//!   request, hydrate it from durable records, run one operation, and drop it.
//! - The commerce backend is reached through the [`remote::DraftOrderApi`]
//!   trait; [`remote::RestClient`] is the production implementation and tests
//!   inject mocks.
//! - Durable per-shopper records (draft-order id, last completed payment
//!   callback, cleanup deadline) live behind the [`store::DurableStore`]
//!   trait so the engine works the same over a server session or an
//!   in-memory map.
//!
//! # Failure policy
//!
//! Remote draft *updates* are optimistic: a failed update keeps the local
//! merge, marks the draft dirty, and surfaces a non-blocking warning, because
//! losing step progress is worse than a stale remote mirror. Draft *creation*
//! and the final draft-to-order conversion are never silent: both surface
//! typed errors, and the conversion is treated as at-most-once.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod address;
pub mod cleanup;
pub mod draft;
pub mod error;
pub mod finalize;
pub mod payment;
pub mod remote;
pub mod session;
pub mod steps;
pub mod store;

pub use address::{AddressFormData, RemoteAddress};
pub use draft::{CartSnapshot, DraftOrder, DraftPatch, LineItem, ShippingQuote, SyncState};
pub use error::CheckoutError;
pub use finalize::OrderComplete;
pub use payment::{
    CardSummary, CompletedPaymentRecord, FxClient, FxError, PaymentDetails, PaymentFormData,
    PaymentMethod, PaymentOutcome, ProviderCallback, WalletTransaction,
};
pub use remote::{DraftOrderApi, FinalOrder, RemoteError, RestClient};
pub use session::{CheckoutSession, CheckoutView};
pub use steps::CheckoutStep;
pub use store::{DurableStore, DurableStoreExt, MemoryStore, StoreError};
