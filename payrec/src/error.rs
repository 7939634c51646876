//! Error taxonomy for the reconciliation core.
//!
//! Each variant maps to one class of caller behavior: bad input is never
//! retried, upstream outages are retried by the caller with backoff, and
//! state-machine no-ops are not errors at all (duplicate notifications
//! surface as [`crate::reconcile::ReconcileOutcome::AlreadySettled`]).

use crate::record::PaymentId;

/// Errors surfaced by the reconciliation core.
#[derive(Debug, thiserror::Error)]
pub enum PayError {
    /// Bad caller input. Maps to HTTP 400; not retried.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Inbound notification failed signature verification. Maps to 401,
    /// never retried, logged as a security event by the handler.
    #[error("notification signature rejected")]
    Authentication,

    /// Unknown payment id or external track id. Maps to 404. Records are
    /// never created from notifications, so an unknown track id stays
    /// unknown.
    #[error("payment not found: {0}")]
    NotFound(String),

    /// Provider or price source unreachable or misbehaving. Maps to 502;
    /// the caller retries with backoff. Never silently defaulted.
    #[error("upstream: {0}")]
    Upstream(#[from] ProviderError),

    /// A record reads `paid` but its effect has not been applied. The
    /// repair sweep resolves this; it is never shown to the end user.
    #[error("ledger inconsistent for payment {0}: paid without applied effect")]
    InconsistentLedger(PaymentId),

    /// A record with this external track id already exists.
    #[error("duplicate external track id: {0}")]
    DuplicateTrackId(String),

    /// Ledger journal I/O failure.
    #[error("ledger journal: {0}")]
    Journal(#[from] std::io::Error),

    /// Ledger journal (de)serialization failure.
    #[error("ledger journal encoding: {0}")]
    JournalEncoding(#[from] serde_json::Error),
}

/// Errors produced by a provider adapter or rate source.
///
/// Kept transport-free so the core crate carries no HTTP dependency;
/// adapters translate their client errors into these variants.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Network-level failure reaching the provider or price source.
    #[error("{0}")]
    Unavailable(String),

    /// The provider understood the request and refused it.
    #[error("provider rejected request: {0}")]
    Rejected(String),

    /// The provider answered with a payload the adapter could not decode.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Error returned by a caller-supplied effect function.
#[derive(Debug, thiserror::Error)]
#[error("effect failed: {0}")]
pub struct EffectError(pub String);

impl EffectError {
    /// Creates an effect error from any displayable reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}
