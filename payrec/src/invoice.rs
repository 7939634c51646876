//! Invoice creation, the only way records enter the ledger.
//!
//! Notifications never create records; a webhook for a track id this
//! factory has not persisted is rejected as unknown.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::PayError;
use crate::provider::{InvoiceRequest, ProviderAdapter};
use crate::record::{PaymentId, PaymentRecord, PaymentStatus};
use crate::store::LedgerStore;
use crate::timestamp::UnixTimestamp;

/// Creates provider invoices and persists the matching `pending` record.
#[derive(Debug, Clone)]
pub struct InvoiceFactory {
    store: Arc<LedgerStore>,
    ttl: Duration,
}

impl InvoiceFactory {
    /// Creates a factory over the ledger with the configured payment TTL.
    #[must_use]
    pub fn new(store: Arc<LedgerStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Validates the request, creates the invoice at the provider and
    /// persists a `pending` record with the settlement amount frozen.
    ///
    /// Returns the persisted record and the provider's pay link. If the
    /// provider or its price source is unreachable this fails closed and
    /// nothing is persisted.
    ///
    /// # Errors
    ///
    /// [`PayError::Validation`] on bad input, [`PayError::Upstream`] on
    /// provider/price-source failure, [`PayError::DuplicateTrackId`] if
    /// the provider hands out a track id the ledger already holds.
    pub async fn create(
        &self,
        adapter: &dyn ProviderAdapter,
        request: InvoiceRequest,
    ) -> Result<(PaymentRecord, String), PayError> {
        if request.fiat_amount <= Decimal::ZERO {
            return Err(PayError::Validation("fiatAmount must be positive".into()));
        }
        if request.fiat_currency.trim().is_empty() {
            return Err(PayError::Validation("currency must not be empty".into()));
        }
        if request.owner_ref.as_str().is_empty() {
            return Err(PayError::Validation("ownerRef must not be empty".into()));
        }
        if request.purpose.as_str().is_empty() {
            return Err(PayError::Validation("purpose must not be empty".into()));
        }

        let invoice = adapter.create_invoice(&request, self.ttl).await?;

        let record = PaymentRecord {
            id: PaymentId::generate(),
            external_track_id: invoice.external_track_id,
            purpose: request.purpose,
            owner_ref: request.owner_ref,
            requested_fiat_amount: request.fiat_amount,
            fiat_currency: request.fiat_currency,
            settlement_currency: invoice.settlement_currency,
            settlement_amount: invoice.settlement_amount,
            status: PaymentStatus::Pending,
            created_at: UnixTimestamp::now(),
            expires_at: invoice.expires_at,
            settled_at: None,
            effect_applied: false,
            last_notification_source: None,
        };
        self.store.insert(record.clone())?;
        tracing::info!(
            id = %record.id,
            track = %record.external_track_id,
            provider = adapter.name(),
            amount = %record.settlement_amount,
            currency = %record.settlement_currency,
            "invoice created"
        );
        Ok((record, invoice.pay_link))
    }
}
