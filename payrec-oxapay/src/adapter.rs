//! OxaPay merchant API adapter.
//!
//! Implements [`ProviderAdapter`] against the OxaPay merchant endpoints:
//! invoice creation (`merchants/request`), status inquiry
//! (`merchants/inquiry`), and webhook payload parsing. The settlement
//! amount is quoted from the configured [`RateSource`] exactly once at
//! creation and frozen into the invoice.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use payrec::error::ProviderError;
use payrec::provider::{
    CallbackNotice, CreatedInvoice, InvoiceRequest, ProviderAdapter, ProviderStatus, RateSource,
};
use payrec::record::PaymentStatus;
use payrec::timestamp::UnixTimestamp;
use rust_decimal::Decimal;
use url::Url;

use crate::types::{Callback, CreateRequest, CreateResponse, InquiryRequest, InquiryResponse};

/// Provider success code in OxaPay response envelopes.
const RESULT_OK: i64 = 100;

/// Decimal places kept on settlement amounts.
const SETTLEMENT_SCALE: u32 = 8;

/// Connection settings for the OxaPay merchant API.
#[derive(Clone)]
pub struct OxaPayConfig {
    /// Merchant API key for outbound calls.
    pub api_key: String,
    /// API base, e.g. `https://api.oxapay.com/`.
    pub base_url: Url,
    /// Currency invoices settle in, e.g. `ETH`.
    pub settlement_currency: String,
    /// Webhook delivery URL registered with each invoice.
    pub callback_url: Option<String>,
}

impl fmt::Debug for OxaPayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OxaPayConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("settlement_currency", &self.settlement_currency)
            .field("callback_url", &self.callback_url)
            .finish()
    }
}

/// [`ProviderAdapter`] for the OxaPay crypto gateway.
#[derive(Debug)]
pub struct OxaPayAdapter<R> {
    http: reqwest::Client,
    config: OxaPayConfig,
    rates: R,
}

impl<R> OxaPayAdapter<R> {
    /// Creates an adapter over the given configuration and rate source.
    #[must_use]
    pub fn new(config: OxaPayConfig, rates: R) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            rates,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.config
            .base_url
            .join(path)
            .map_err(|err| ProviderError::Malformed(format!("endpoint {path}: {err}")))
    }
}

#[async_trait]
impl<R: RateSource> ProviderAdapter for OxaPayAdapter<R> {
    fn name(&self) -> &'static str {
        "oxapay"
    }

    fn signature_header(&self) -> &'static str {
        "hmac"
    }

    async fn create_invoice(
        &self,
        request: &InvoiceRequest,
        ttl: Duration,
    ) -> Result<CreatedInvoice, ProviderError> {
        let rate = self
            .rates
            .rate(&request.fiat_currency, &self.config.settlement_currency)
            .await?;
        if rate <= Decimal::ZERO {
            return Err(ProviderError::Malformed(format!("non-positive rate {rate}")));
        }
        let settlement_amount = (request.fiat_amount / rate).round_dp(SETTLEMENT_SCALE);

        let body = CreateRequest {
            merchant: self.config.api_key.clone(),
            amount: settlement_amount,
            currency: self.config.settlement_currency.clone(),
            life_time: ttl.as_secs().div_ceil(60).max(1),
            callback_url: self.config.callback_url.clone(),
            description: Some(request.purpose.as_str().to_owned()),
        };

        let url = self.endpoint("merchants/request")?;
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Unavailable(err.to_string()))?;
        let response: CreateResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Malformed(err.to_string()))?;

        if response.result != RESULT_OK {
            return Err(ProviderError::Rejected(response.message.unwrap_or_else(
                || format!("result code {}", response.result),
            )));
        }
        let external_track_id = response
            .track_id
            .ok_or_else(|| ProviderError::Malformed("missing trackId".into()))?
            .into_string();
        let pay_link = response
            .pay_link
            .ok_or_else(|| ProviderError::Malformed("missing payLink".into()))?;

        tracing::debug!(track = %external_track_id, amount = %settlement_amount, "oxapay invoice created");
        Ok(CreatedInvoice {
            external_track_id,
            pay_link,
            settlement_amount,
            settlement_currency: self.config.settlement_currency.clone(),
            expires_at: UnixTimestamp::now() + ttl.as_secs(),
        })
    }

    async fn get_status(&self, external_track_id: &str) -> Result<ProviderStatus, ProviderError> {
        let body = InquiryRequest {
            merchant: self.config.api_key.clone(),
            track_id: external_track_id.to_owned(),
        };
        let url = self.endpoint("merchants/inquiry")?;
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Unavailable(err.to_string()))?;
        let response: InquiryResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Malformed(err.to_string()))?;

        if response.result != RESULT_OK {
            return Err(ProviderError::Rejected(response.message.unwrap_or_else(
                || format!("result code {}", response.result),
            )));
        }
        response
            .status
            .map(ProviderStatus::from)
            .ok_or_else(|| ProviderError::Malformed("missing status".into()))
    }

    fn map_status(&self, raw: &ProviderStatus) -> Option<PaymentStatus> {
        match raw.as_str().to_ascii_lowercase().as_str() {
            "new" | "waiting" | "confirming" | "paying" => Some(PaymentStatus::Waiting),
            "paid" | "confirmed" => Some(PaymentStatus::Paid),
            "expired" => Some(PaymentStatus::Expired),
            "failed" | "canceled" | "cancelled" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    fn parse_callback(&self, body: &[u8]) -> Result<CallbackNotice, ProviderError> {
        let callback: Callback = serde_json::from_slice(body)
            .map_err(|err| ProviderError::Malformed(err.to_string()))?;
        Ok(CallbackNotice {
            external_track_id: callback.track_id.into_string(),
            status: ProviderStatus::from(callback.status),
            amount: callback.amount,
            currency: callback.currency,
            tx_id: callback.tx_id,
        })
    }
}
