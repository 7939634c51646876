//! Wire types for the OxaPay merchant API.
//!
//! Request/response envelopes follow the provider's contract: camelCase
//! fields, a numeric `result` code (`100` = success), and track ids that
//! arrive sometimes as JSON numbers and sometimes as strings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A value the provider serializes inconsistently as string or number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    /// String form.
    Text(String),
    /// Numeric form.
    Number(i64),
}

impl RawId {
    /// Normalizes to the string form used as the ledger key.
    #[must_use]
    pub fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

/// `POST /merchants/request` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    /// Merchant API key.
    pub merchant: String,
    /// Settlement amount the payer must send.
    pub amount: Decimal,
    /// Settlement currency symbol.
    pub currency: String,
    /// Invoice lifetime in minutes.
    pub life_time: u64,
    /// Webhook delivery URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    /// Free-text shown on the payment page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `POST /merchants/request` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    /// Provider result code; `100` is success.
    pub result: i64,
    /// Human-readable outcome.
    #[serde(default)]
    pub message: Option<String>,
    /// Provider-assigned tracking id.
    #[serde(default)]
    pub track_id: Option<RawId>,
    /// Hosted payment page.
    #[serde(default)]
    pub pay_link: Option<String>,
}

/// `POST /merchants/inquiry` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InquiryRequest {
    /// Merchant API key.
    pub merchant: String,
    /// Tracking id under inquiry.
    pub track_id: String,
}

/// `POST /merchants/inquiry` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InquiryResponse {
    /// Provider result code; `100` is success.
    pub result: i64,
    /// Human-readable outcome.
    #[serde(default)]
    pub message: Option<String>,
    /// Raw provider status string.
    #[serde(default)]
    pub status: Option<String>,
}

/// Webhook callback body pushed by the provider.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Callback {
    /// Tracking id the notification is about.
    pub track_id: RawId,
    /// Raw provider status string.
    pub status: String,
    /// Amount received, if reported.
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Currency of `amount`, if reported.
    #[serde(default)]
    pub currency: Option<String>,
    /// On-chain transaction id, if reported.
    #[serde(default, rename = "txID")]
    pub tx_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_id_accepts_number_or_string() {
        let cb: Callback =
            serde_json::from_str(r#"{"trackId":12345,"status":"Paid"}"#).unwrap();
        assert_eq!(cb.track_id.into_string(), "12345");

        let cb: Callback =
            serde_json::from_str(r#"{"trackId":"ox-77","status":"Waiting"}"#).unwrap();
        assert_eq!(cb.track_id.into_string(), "ox-77");
    }

    #[test]
    fn callback_parses_full_payload() {
        let cb: Callback = serde_json::from_str(
            r#"{"trackId":"ox-1","status":"Paid","amount":"0.004","currency":"ETH","txID":"0xabc"}"#,
        )
        .unwrap();
        assert_eq!(cb.status, "Paid");
        assert_eq!(cb.amount, Some("0.004".parse().unwrap()));
        assert_eq!(cb.currency.as_deref(), Some("ETH"));
        assert_eq!(cb.tx_id.as_deref(), Some("0xabc"));
    }

    #[test]
    fn create_request_serializes_camel_case() {
        let body = CreateRequest {
            merchant: "key".to_owned(),
            amount: "0.004".parse().unwrap(),
            currency: "ETH".to_owned(),
            life_time: 30,
            callback_url: Some("https://example.com/payments/webhook".to_owned()),
            description: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"lifeTime\":30"));
        assert!(json.contains("\"callbackUrl\""));
        assert!(!json.contains("description"));
    }
}
