#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Payment lifecycle reconciliation core.
//!
//! This crate is the one subsystem of a crypto-invoice product that has
//! to be correct rather than merely functional: creating a payment
//! intent against an external processor, accepting asynchronous webhook
//! notifications and synchronous polling about the same payment, and
//! applying the financial consequence exactly once even though delivery
//! can race, retry, arrive out of order, or be replayed and forged.
//!
//! The surrounding product (dashboards, order routing, the game economy)
//! stays outside: callers hand in opaque owner and purpose tokens plus
//! an effect function, and receive settlement decisions back.
//!
//! # Modules
//!
//! - [`record`] - Payment records and the forward-only status machine
//! - [`store`] - Process-wide ledger with per-record locking and an
//!   optional append-only journal
//! - [`provider`] - Provider adapter and rate source seams
//! - [`verify`] - HMAC webhook authentication
//! - [`reconcile`] - The single reconciliation path for webhooks,
//!   polling and the sweeper
//! - [`applier`] - Exactly-once application of the settlement effect
//! - [`sweep`] - Background expiry and repair sweeps
//! - [`invoice`] - Invoice creation, the only way records enter the
//!   ledger
//! - [`events`] - Terminal-transition event stream for observers
//! - [`error`] - Error taxonomy
//! - [`timestamp`] - Unix timestamps for TTL bookkeeping

pub mod applier;
pub mod error;
pub mod events;
pub mod invoice;
pub mod provider;
pub mod reconcile;
pub mod record;
pub mod store;
pub mod sweep;
pub mod timestamp;
pub mod verify;

pub use applier::{EffectContext, EffectFn, LedgerApplier};
pub use error::{EffectError, PayError, ProviderError};
pub use events::PaymentEvent;
pub use invoice::InvoiceFactory;
pub use provider::{
    CallbackNotice, CreatedInvoice, FixedRate, InvoiceRequest, ProviderAdapter, ProviderStatus,
    RateSource,
};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use record::{NotificationSource, OwnerRef, PaymentId, PaymentRecord, PaymentStatus, Purpose};
pub use store::LedgerStore;
pub use sweep::ExpirySweeper;
pub use timestamp::UnixTimestamp;
pub use verify::SignatureVerifier;
