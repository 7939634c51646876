//! HTTP price source.
//!
//! Queries a price endpoint once per invoice creation; a dead or
//! misbehaving endpoint propagates as an error so invoice creation fails
//! closed instead of guessing a stale rate.

use async_trait::async_trait;
use payrec::error::ProviderError;
use payrec::provider::RateSource;
use rust_decimal::Decimal;
use serde::Deserialize;
use url::Url;

/// Quote payload returned by the price endpoint.
#[derive(Debug, Deserialize)]
struct PriceQuote {
    price: Decimal,
}

/// [`RateSource`] backed by an HTTP price endpoint.
///
/// `GET {base}?fiat=USD&symbol=ETH` must answer
/// `{ "price": "2500.00" }` — the fiat price of one settlement unit.
#[derive(Debug, Clone)]
pub struct HttpPriceSource {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpPriceSource {
    /// Creates a price source over the given endpoint.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl RateSource for HttpPriceSource {
    async fn rate(
        &self,
        fiat_currency: &str,
        settlement_currency: &str,
    ) -> Result<Decimal, ProviderError> {
        let response = self
            .http
            .get(self.base_url.clone())
            .query(&[("fiat", fiat_currency), ("symbol", settlement_currency)])
            .send()
            .await
            .map_err(|err| ProviderError::Unavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "price source answered {}",
                response.status()
            )));
        }

        let quote: PriceQuote = response
            .json()
            .await
            .map_err(|err| ProviderError::Malformed(err.to_string()))?;
        if quote.price <= Decimal::ZERO {
            return Err(ProviderError::Malformed(format!(
                "non-positive price {}",
                quote.price
            )));
        }
        tracing::trace!(fiat = fiat_currency, symbol = settlement_currency, price = %quote.price, "rate quoted");
        Ok(quote.price)
    }
}
