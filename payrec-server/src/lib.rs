//! HTTP server wiring for the payrec reconciliation core.
//!
//! The binary in `main.rs` reads [`config::ServerConfig`] from the
//! environment, wires the OxaPay adapter and ledger into
//! [`handlers::AppState`], and serves [`handlers::payment_router`].

pub mod config;
pub mod error;
pub mod handlers;
