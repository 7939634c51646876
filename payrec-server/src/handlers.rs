//! Axum route handlers for the payment API.
//!
//! Thin HTTP shims over the core: every status observation — webhook or
//! poll — funnels into the same reconciler, and the webhook handler
//! touches no state before the signature verifier has accepted the
//! request.

use std::fmt;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use payrec::error::PayError;
use payrec::invoice::InvoiceFactory;
use payrec::provider::{InvoiceRequest, ProviderAdapter};
use payrec::reconcile::Reconciler;
use payrec::record::{
    NotificationSource, OwnerRef, PaymentId, PaymentRecord, PaymentStatus, Purpose,
};
use payrec::store::LedgerStore;
use payrec::timestamp::UnixTimestamp;
use payrec::verify::SignatureVerifier;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Payment ledger.
    pub store: Arc<LedgerStore>,
    /// Invoice creation path.
    pub factory: Arc<InvoiceFactory>,
    /// The single reconciliation path.
    pub reconciler: Arc<Reconciler>,
    /// Configured provider.
    pub adapter: Arc<dyn ProviderAdapter>,
    /// Webhook authentication boundary.
    pub verifier: Arc<SignatureVerifier>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("provider", &self.adapter.name())
            .field("records", &self.store.len())
            .finish()
    }
}

/// `POST /payments` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    /// Beneficiary reference, opaque to the core.
    pub owner_ref: String,
    /// Purpose tag, opaque to the core.
    pub purpose: String,
    /// Fiat amount to collect.
    pub fiat_amount: Decimal,
    /// Fiat currency.
    pub currency: String,
}

/// `POST /payments` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    /// Internal payment id; poll `GET /payments/{id}` with it.
    pub id: PaymentId,
    /// Hosted payment page for the payer.
    pub pay_link: String,
    /// Frozen settlement amount.
    pub settlement_amount: Decimal,
    /// Settlement currency.
    pub settlement_currency: String,
    /// Invoice deadline.
    pub expires_at: UnixTimestamp,
}

/// `GET /payments/{id}` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    /// Internal payment id.
    pub id: PaymentId,
    /// Current state-machine position.
    pub status: PaymentStatus,
    /// Frozen settlement amount.
    pub settlement_amount: Decimal,
    /// Settlement currency.
    pub settlement_currency: String,
    /// Creation time.
    pub created_at: UnixTimestamp,
    /// Invoice deadline.
    pub expires_at: UnixTimestamp,
    /// Terminal-state time, once settled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<UnixTimestamp>,
}

impl From<PaymentRecord> for PaymentStatusResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            id: record.id,
            status: record.status,
            settlement_amount: record.settlement_amount,
            settlement_currency: record.settlement_currency,
            created_at: record.created_at,
            expires_at: record.expires_at,
            settled_at: record.settled_at,
        }
    }
}

/// `POST /payments` — creates an invoice and a `pending` record.
///
/// # Errors
///
/// 400 on invalid fields, 502 when the provider or price source is
/// unreachable.
pub async fn create_payment(
    State(state): State<AppState>,
    Json(body): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<CreatePaymentResponse>), ApiError> {
    let request = InvoiceRequest {
        owner_ref: OwnerRef::from(body.owner_ref),
        purpose: Purpose::from(body.purpose),
        fiat_amount: body.fiat_amount,
        fiat_currency: body.currency,
    };
    let (record, pay_link) = state.factory.create(state.adapter.as_ref(), request).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse {
            id: record.id,
            pay_link,
            settlement_amount: record.settlement_amount,
            settlement_currency: record.settlement_currency,
            expires_at: record.expires_at,
        }),
    ))
}

/// `GET /payments/{id}` — returns the record, polling the provider first
/// while the record is still in flight.
///
/// # Errors
///
/// 404 for an unknown id, 502 when the provider is unreachable (the
/// stored state is never silently served as current in that case).
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let id = PaymentId::from(id);
    let record = state
        .store
        .get(&id)
        .await
        .ok_or_else(|| PayError::NotFound(id.to_string()))?;

    if !record.status.is_terminal() {
        let raw = state
            .adapter
            .get_status(&record.external_track_id)
            .await
            .map_err(PayError::from)?;
        state
            .reconciler
            .reconcile(
                state.adapter.as_ref(),
                &record.external_track_id,
                &raw,
                None,
                NotificationSource::Poll,
            )
            .await?;
    }

    let record = state
        .store
        .get(&id)
        .await
        .ok_or_else(|| PayError::NotFound(id.to_string()))?;
    Ok(Json(record.into()))
}

/// `POST /payments/webhook` — authenticated provider push.
///
/// Returns 200 once the notification is authenticated and processed,
/// even when it maps to a no-op, so the provider does not retry
/// non-retryable conditions.
///
/// # Errors
///
/// 401 on a missing or invalid signature (no state is touched), 404 for
/// an unknown track id.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let supplied = headers
        .get(state.adapter.signature_header())
        .and_then(|value| value.to_str().ok());
    let authentic = supplied.is_some_and(|signature| state.verifier.verify(&body, signature));
    if !authentic {
        tracing::warn!(
            provider = state.adapter.name(),
            "webhook signature rejected"
        );
        return Err(PayError::Authentication.into());
    }

    let notice = state
        .adapter
        .parse_callback(&body)
        .map_err(|err| PayError::Validation(format!("callback body: {err}")))?;

    let observed_amount = match (notice.amount, notice.currency) {
        (Some(amount), Some(currency)) => Some((amount, currency)),
        _ => None,
    };
    let outcome = state
        .reconciler
        .reconcile(
            state.adapter.as_ref(),
            &notice.external_track_id,
            &notice.status,
            observed_amount,
            NotificationSource::Webhook,
        )
        .await?;
    tracing::debug!(track = %notice.external_track_id, ?outcome, "webhook processed");
    Ok(StatusCode::OK)
}

/// `GET /health`.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Builds the payment API router.
///
/// Endpoints:
/// - `POST /payments` — create an invoice
/// - `GET /payments/{id}` — poll a payment
/// - `POST /payments/webhook` — provider notifications
/// - `GET /health` — liveness
pub fn payment_router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/payments", axum::routing::post(create_payment))
        .route("/payments/{id}", axum::routing::get(get_payment))
        .route("/payments/webhook", axum::routing::post(payment_webhook))
        .route("/health", axum::routing::get(health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use hmac::{Hmac, Mac};
    use payrec::applier::LedgerApplier;
    use payrec::error::ProviderError;
    use payrec::events;
    use payrec::provider::{CallbackNotice, CreatedInvoice, ProviderStatus};
    use sha2::Sha256;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    const SECRET: &str = "hook-secret";

    /// In-process provider: invoices succeed, inquiry reports a fixed
    /// status or fails outright.
    struct FakeProvider {
        next_track: AtomicUsize,
        inquiry_status: &'static str,
        inquiry_down: bool,
    }

    impl FakeProvider {
        fn new(inquiry_status: &'static str) -> Self {
            Self {
                next_track: AtomicUsize::new(1),
                inquiry_status,
                inquiry_down: false,
            }
        }

        fn unreachable() -> Self {
            Self {
                inquiry_down: true,
                ..Self::new("Waiting")
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn signature_header(&self) -> &'static str {
            "hmac"
        }

        async fn create_invoice(
            &self,
            request: &InvoiceRequest,
            ttl: Duration,
        ) -> Result<CreatedInvoice, ProviderError> {
            let rate: Decimal = "2500".parse().unwrap();
            let track = self.next_track.fetch_add(1, Ordering::SeqCst);
            Ok(CreatedInvoice {
                external_track_id: format!("trk-{track}"),
                pay_link: format!("https://pay.example/{track}"),
                settlement_amount: (request.fiat_amount / rate).round_dp(8),
                settlement_currency: "ETH".to_owned(),
                expires_at: UnixTimestamp::now() + ttl.as_secs(),
            })
        }

        async fn get_status(&self, _track: &str) -> Result<ProviderStatus, ProviderError> {
            if self.inquiry_down {
                return Err(ProviderError::Unavailable("connection refused".into()));
            }
            Ok(ProviderStatus::from(self.inquiry_status))
        }

        fn map_status(&self, raw: &ProviderStatus) -> Option<PaymentStatus> {
            match raw.as_str() {
                "Waiting" => Some(PaymentStatus::Waiting),
                "Paid" => Some(PaymentStatus::Paid),
                "Expired" => Some(PaymentStatus::Expired),
                _ => None,
            }
        }

        fn parse_callback(&self, body: &[u8]) -> Result<CallbackNotice, ProviderError> {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct Cb {
                track_id: String,
                status: String,
                amount: Option<Decimal>,
                currency: Option<String>,
            }
            let cb: Cb = serde_json::from_slice(body)
                .map_err(|err| ProviderError::Malformed(err.to_string()))?;
            Ok(CallbackNotice {
                external_track_id: cb.track_id,
                status: ProviderStatus::from(cb.status),
                amount: cb.amount,
                currency: cb.currency,
                tx_id: None,
            })
        }
    }

    fn sign(body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn app(inquiry_status: &'static str) -> (axum::Router, AppState, Arc<AtomicUsize>) {
        app_with(FakeProvider::new(inquiry_status))
    }

    fn app_with(provider: FakeProvider) -> (axum::Router, AppState, Arc<AtomicUsize>) {
        let store = Arc::new(LedgerStore::in_memory());
        let effect_calls = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&effect_calls);
        let applier = LedgerApplier::from_fn(move |_ctx| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let (events_tx, _) = events::channel(16);
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&store), applier, events_tx));
        let state = AppState {
            factory: Arc::new(InvoiceFactory::new(
                Arc::clone(&store),
                Duration::from_secs(1800),
            )),
            reconciler,
            adapter: Arc::new(provider),
            verifier: Arc::new(SignatureVerifier::new(SECRET)),
            store,
        };
        (payment_router(state.clone()), state, effect_calls)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create(app: &axum::Router) -> serde_json::Value {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payments")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"ownerRef":"user-1","purpose":"deposit","fiatAmount":"10","currency":"USD"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await
    }

    #[tokio::test]
    async fn create_then_webhook_then_poll() {
        let (app, state, effect_calls) = app("Paid");

        let created = create(&app).await;
        assert_eq!(created["settlementAmount"], "0.004");
        assert_eq!(created["settlementCurrency"], "ETH");
        let id = created["id"].as_str().unwrap().to_owned();

        // Authentic paid webhook settles the payment.
        let body = r#"{"trackId":"trk-1","status":"Paid","amount":"0.004","currency":"ETH"}"#;
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payments/webhook")
                    .header("hmac", sign(body.as_bytes()))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(effect_calls.load(Ordering::SeqCst), 1);

        // Replay is still 200 and still applied once.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payments/webhook")
                    .header("hmac", sign(body.as_bytes()))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(effect_calls.load(Ordering::SeqCst), 1);

        // Poll on a terminal record answers from the ledger.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/payments/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "paid");
        assert!(body["settledAt"].is_string());

        let record = state.store.get(&PaymentId::from(id)).await.unwrap();
        assert!(record.effect_applied);
    }

    #[tokio::test]
    async fn forged_webhook_never_mutates() {
        let (app, state, effect_calls) = app("Waiting");
        let created = create(&app).await;
        let id = created["id"].as_str().unwrap().to_owned();

        let body = r#"{"trackId":"trk-1","status":"Paid","amount":"0.004","currency":"ETH"}"#;
        for request in [
            // Wrong signature.
            Request::builder()
                .method("POST")
                .uri("/payments/webhook")
                .header("hmac", sign(b"other payload"))
                .body(Body::from(body))
                .unwrap(),
            // Missing header.
            Request::builder()
                .method("POST")
                .uri("/payments/webhook")
                .body(Body::from(body))
                .unwrap(),
        ] {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        let record = state.store.get(&PaymentId::from(id)).await.unwrap();
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(effect_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn webhook_for_unknown_track_is_not_found() {
        let (app, _state, _calls) = app("Waiting");
        let body = r#"{"trackId":"trk-unknown","status":"Paid"}"#;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payments/webhook")
                    .header("hmac", sign(body.as_bytes()))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn poll_advances_via_provider_inquiry() {
        let (app, _state, effect_calls) = app("Paid");
        let created = create(&app).await;
        let id = created["id"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/payments/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "paid");
        assert_eq!(effect_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn poll_with_unreachable_provider_is_bad_gateway() {
        let (app, state, effect_calls) = app_with(FakeProvider::unreachable());
        let created = create(&app).await;
        let id = created["id"].as_str().unwrap().to_owned();

        // The stored state is never served as current when the provider
        // cannot be asked.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/payments/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let record = state.store.get(&PaymentId::from(id)).await.unwrap();
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(effect_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let (app, _state, _calls) = app("Waiting");
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/payments/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_create_body_is_bad_request() {
        let (app, _state, _calls) = app("Waiting");
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payments")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"ownerRef":"user-1","purpose":"deposit","fiatAmount":"0","currency":"USD"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
