#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! OxaPay merchant API adapter for the payrec reconciliation core.
//!
//! Provides the concrete [`payrec::provider::ProviderAdapter`] for the
//! OxaPay crypto gateway plus an HTTP-backed
//! [`payrec::provider::RateSource`]. Everything provider-specific —
//! endpoint shapes, the status vocabulary table, webhook payload
//! layout — lives here; the core never sees OxaPay's wire format.

pub mod adapter;
pub mod price;
pub mod types;

pub use adapter::{OxaPayAdapter, OxaPayConfig};
pub use price::HttpPriceSource;
