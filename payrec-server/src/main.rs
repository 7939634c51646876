//! Payment reconciliation HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with environment from .env
//! cargo run -p payrec-server --release
//!
//! # Configure logging level
//! RUST_LOG=info cargo run -p payrec-server
//! ```
//!
//! See `config.rs` for the full list of environment variables.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use payrec::applier::LedgerApplier;
use payrec::events;
use payrec::invoice::InvoiceFactory;
use payrec::provider::ProviderAdapter;
use payrec::reconcile::Reconciler;
use payrec::store::LedgerStore;
use payrec::sweep::ExpirySweeper;
use payrec_oxapay::{HttpPriceSource, OxaPayAdapter, OxaPayConfig};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tower_http::cors;
use tracing_subscriber::EnvFilter;

use payrec_server::config::ServerConfig;
use payrec_server::handlers::{AppState, payment_router};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Server failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        settlement = %config.settlement_currency,
        ttl_secs = config.payment_ttl_secs,
        "Loaded configuration"
    );

    let store = match &config.ledger_path {
        Some(path) => {
            let store = LedgerStore::open(path)?;
            tracing::info!(path = %path.display(), records = store.len(), "Ledger journal opened");
            Arc::new(store)
        }
        None => {
            tracing::warn!("LEDGER_PATH not set — ledger is in-memory and lost on restart");
            Arc::new(LedgerStore::in_memory())
        }
    };

    let rates = HttpPriceSource::new(config.price_source_url.clone());
    let adapter: Arc<dyn ProviderAdapter> = Arc::new(OxaPayAdapter::new(
        OxaPayConfig {
            api_key: config.provider_api_key.clone(),
            base_url: config.provider_base_url.clone(),
            settlement_currency: config.settlement_currency.clone(),
            callback_url: config.callback_url.clone(),
        },
        rates,
    ));

    // The one ledger effect this binary wires is the settlement log line;
    // a product embeds its own balance credit here instead.
    let applier = LedgerApplier::from_fn(|ctx| async move {
        tracing::info!(
            owner = %ctx.owner_ref,
            purpose = %ctx.purpose,
            amount = %ctx.settlement_amount,
            currency = %ctx.settlement_currency,
            "settlement credited"
        );
        Ok(())
    });

    let (events_tx, mut events_rx) = events::channel(64);
    tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(event) => tracing::info!(
                    id = %event.id,
                    track = %event.external_track_id,
                    status = %event.status,
                    source = %event.source,
                    "payment settled"
                ),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "settlement event observer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let reconciler = Arc::new(Reconciler::new(Arc::clone(&store), applier, events_tx));

    let cancel = CancellationToken::new();
    let sweeper = ExpirySweeper::new(
        Arc::clone(&reconciler),
        std::time::Duration::from_secs(config.sweep_interval_secs),
    );
    let sweep_task = sweeper.spawn(cancel.clone());

    let state = AppState {
        factory: Arc::new(InvoiceFactory::new(
            Arc::clone(&store),
            std::time::Duration::from_secs(config.payment_ttl_secs),
        )),
        reconciler,
        verifier: Arc::new(payrec::verify::SignatureVerifier::new(
            config.provider_webhook_secret.as_bytes(),
        )),
        adapter,
        store,
    };

    let app = payment_router(state).layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any),
    );

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Payment server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    sweep_task.await?;
    tracing::info!("Payment server shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
