//! Provider adapter and rate source seams.
//!
//! A [`ProviderAdapter`] translates the generic invoice operations into
//! one external processor's HTTP contract and owns the fixed table that
//! maps that processor's status vocabulary into [`PaymentStatus`].
//! Adding a processor means writing one adapter, not another route file.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::ProviderError;
use crate::record::{OwnerRef, PaymentStatus, Purpose};
use crate::timestamp::UnixTimestamp;

/// Raw status string as reported by a provider, before table mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus(pub String);

impl ProviderStatus {
    /// Returns the raw status text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProviderStatus {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ProviderStatus {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Invoice creation input, as received from the calling product surface.
#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    /// Beneficiary of the eventual effect.
    pub owner_ref: OwnerRef,
    /// Purpose tag forwarded to the effect function.
    pub purpose: Purpose,
    /// Fiat amount to collect.
    pub fiat_amount: Decimal,
    /// Fiat currency of `fiat_amount`.
    pub fiat_currency: String,
}

/// A freshly created invoice as reported by the provider.
#[derive(Debug, Clone)]
pub struct CreatedInvoice {
    /// Provider-assigned tracking id.
    pub external_track_id: String,
    /// Hosted payment page for the payer.
    pub pay_link: String,
    /// Frozen settlement amount the payer must send.
    pub settlement_amount: Decimal,
    /// Settlement currency.
    pub settlement_currency: String,
    /// Invoice deadline.
    pub expires_at: UnixTimestamp,
}

/// A parsed inbound webhook notification, provider vocabulary preserved.
#[derive(Debug, Clone)]
pub struct CallbackNotice {
    /// Provider-assigned tracking id.
    pub external_track_id: String,
    /// Raw provider status.
    pub status: ProviderStatus,
    /// Amount the provider says was received, if reported.
    pub amount: Option<Decimal>,
    /// Currency of `amount`, if reported.
    pub currency: Option<String>,
    /// On-chain transaction id, if reported.
    pub tx_id: Option<String>,
}

/// One external payment processor's HTTP contract.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Short provider name, used in logs.
    fn name(&self) -> &'static str;

    /// HTTP header carrying the webhook signature for this provider.
    fn signature_header(&self) -> &'static str;

    /// Creates an invoice at the provider.
    ///
    /// The settlement amount is quoted from the rate source exactly once
    /// here and frozen. If the price source is unavailable this fails
    /// closed: no guess at a stale rate, no record created.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Unavailable`] when the provider or price source
    /// is unreachable, [`ProviderError::Rejected`] when the provider
    /// refuses the invoice.
    async fn create_invoice(
        &self,
        request: &InvoiceRequest,
        ttl: Duration,
    ) -> Result<CreatedInvoice, ProviderError>;

    /// Fetches the provider's current status for an invoice.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Unavailable`] on network failure; the caller
    /// retries with backoff.
    async fn get_status(&self, external_track_id: &str) -> Result<ProviderStatus, ProviderError>;

    /// Maps a provider status string into the core vocabulary via the
    /// adapter's fixed table.
    ///
    /// Returns `None` for unrecognized values, which the reconciler logs
    /// and treats as no transition. Must never return
    /// [`PaymentStatus::Pending`]: nothing moves a record back there.
    fn map_status(&self, raw: &ProviderStatus) -> Option<PaymentStatus>;

    /// Parses a provider-native webhook body into a [`CallbackNotice`].
    ///
    /// # Errors
    ///
    /// [`ProviderError::Malformed`] when the body does not decode.
    fn parse_callback(&self, body: &[u8]) -> Result<CallbackNotice, ProviderError>;
}

/// Quotes the fiat price of one settlement-currency unit.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Returns how many `fiat_currency` units one `settlement_currency`
    /// unit is worth.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Unavailable`] when the source is unreachable;
    /// callers must fail closed rather than guess a stale rate.
    async fn rate(
        &self,
        fiat_currency: &str,
        settlement_currency: &str,
    ) -> Result<Decimal, ProviderError>;
}

/// Fixed-rate source for tests and offline wiring.
#[derive(Debug, Clone, Copy)]
pub struct FixedRate(pub Decimal);

#[async_trait]
impl RateSource for FixedRate {
    async fn rate(
        &self,
        _fiat_currency: &str,
        _settlement_currency: &str,
    ) -> Result<Decimal, ProviderError> {
        if self.0 <= Decimal::ZERO {
            return Err(ProviderError::Malformed(format!(
                "non-positive fixed rate {}",
                self.0
            )));
        }
        Ok(self.0)
    }
}
