//! Environment configuration for the payment server.
//!
//! All configuration comes from the process environment (a `.env` file
//! is loaded first via `dotenvy` in `main`):
//!
//! - `PROVIDER_API_KEY` — merchant key for outbound provider calls (required)
//! - `PROVIDER_WEBHOOK_SECRET` — inbound webhook HMAC secret; may differ
//!   from the API key (required)
//! - `PRICE_SOURCE_URL` — fiat price endpoint (required)
//! - `PROVIDER_BASE_URL` — provider API base (default `https://api.oxapay.com/`)
//! - `SETTLEMENT_CURRENCY` — invoice settlement currency (default `ETH`)
//! - `CALLBACK_URL` — public webhook URL registered with each invoice
//! - `PAYMENT_TTL_SECONDS` — invoice lifetime (default `1800`)
//! - `SWEEP_INTERVAL_SECONDS` — expiry/repair sweep cadence (default `30`)
//! - `LEDGER_PATH` — journal file; unset means in-memory only
//! - `HOST` / `PORT` — bind address (default `0.0.0.0:8080`)

use std::net::IpAddr;
use std::path::PathBuf;

use url::Url;

/// Errors raised while reading the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is absent.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is present but unparseable.
    #[error("invalid value for {name}: {message}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// What went wrong.
        message: String,
    },
}

/// Server configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub host: IpAddr,
    /// Bind port.
    pub port: u16,
    /// Merchant API key for outbound provider calls.
    pub provider_api_key: String,
    /// Inbound webhook HMAC secret.
    pub provider_webhook_secret: String,
    /// Provider API base URL.
    pub provider_base_url: Url,
    /// Fiat price endpoint.
    pub price_source_url: Url,
    /// Settlement currency for new invoices.
    pub settlement_currency: String,
    /// Public webhook URL registered with each invoice.
    pub callback_url: Option<String>,
    /// Invoice TTL in seconds.
    pub payment_ttl_secs: u64,
    /// Sweep cadence in seconds.
    pub sweep_interval_secs: u64,
    /// Ledger journal path; `None` means in-memory only.
    pub ledger_path: Option<PathBuf>,
}

const DEFAULT_PROVIDER_BASE: &str = "https://api.oxapay.com/";

impl ServerConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through an arbitrary lookup function.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let host = parse_or(&lookup, "HOST", IpAddr::from([0, 0, 0, 0]))?;
        let port = parse_or(&lookup, "PORT", 8080_u16)?;
        let payment_ttl_secs = parse_or(&lookup, "PAYMENT_TTL_SECONDS", 1800_u64)?;
        let sweep_interval_secs = parse_or(&lookup, "SWEEP_INTERVAL_SECONDS", 30_u64)?;

        let provider_base_url = parse_url(
            "PROVIDER_BASE_URL",
            &lookup("PROVIDER_BASE_URL").unwrap_or_else(|| DEFAULT_PROVIDER_BASE.to_owned()),
        )?;
        let price_source_url = parse_url("PRICE_SOURCE_URL", &required("PRICE_SOURCE_URL")?)?;

        Ok(Self {
            host,
            port,
            provider_api_key: required("PROVIDER_API_KEY")?,
            provider_webhook_secret: required("PROVIDER_WEBHOOK_SECRET")?,
            provider_base_url,
            price_source_url,
            settlement_currency: lookup("SETTLEMENT_CURRENCY")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "ETH".to_owned()),
            callback_url: lookup("CALLBACK_URL").filter(|v| !v.trim().is_empty()),
            payment_ttl_secs,
            sweep_interval_secs,
            ledger_path: lookup("LEDGER_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|err: T::Err| ConfigError::Invalid {
            name,
            message: err.to_string(),
        }),
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|err: url::ParseError| ConfigError::Invalid {
        name,
        message: err.to_string(),
    })
}
