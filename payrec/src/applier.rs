//! Exactly-once application of a payment's financial effect.
//!
//! The effect itself (credit a balance, upgrade a tier, grant credits)
//! belongs to the calling product and arrives as a closure; this module
//! only guarantees it runs once per record. `effect_applied` on the
//! record is the true idempotency key, not `status`: a crash between the
//! `paid` write and the effect leaves a record the repair sweep can
//! finish safely.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::{EffectError, PayError};
use crate::record::{OwnerRef, PaymentRecord, PaymentStatus, Purpose};

/// Arguments handed to the caller-supplied effect function.
#[derive(Debug, Clone)]
pub struct EffectContext {
    /// Beneficiary reference, verbatim from invoice creation.
    pub owner_ref: OwnerRef,
    /// Purpose tag, verbatim from invoice creation.
    pub purpose: Purpose,
    /// Frozen settlement amount.
    pub settlement_amount: Decimal,
    /// Settlement currency.
    pub settlement_currency: String,
}

/// Boxed future returned by an effect function.
pub type EffectFuture = Pin<Box<dyn Future<Output = Result<(), EffectError>> + Send>>;

/// Caller-supplied settlement consequence.
pub type EffectFn = Arc<dyn Fn(EffectContext) -> EffectFuture + Send + Sync>;

/// Runs the financial effect of a paid record at most once.
#[derive(Clone)]
pub struct LedgerApplier {
    effect: EffectFn,
}

impl fmt::Debug for LedgerApplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerApplier")
            .field("effect", &"<effect fn>")
            .finish()
    }
}

impl LedgerApplier {
    /// Creates an applier over a boxed effect function.
    #[must_use]
    pub fn new(effect: EffectFn) -> Self {
        Self { effect }
    }

    /// Creates an applier from an async closure.
    pub fn from_fn<F, Fut>(effect: F) -> Self
    where
        F: Fn(EffectContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), EffectError>> + Send + 'static,
    {
        Self {
            effect: Arc::new(move |ctx| Box::pin(effect(ctx))),
        }
    }

    /// Applies the effect for a record that has reached `paid`.
    ///
    /// Must be called under the record's lock, from the reconciler's
    /// winning transition or the repair sweep. A record whose effect
    /// already ran is a no-op. On success `effect_applied` flips true;
    /// on failure it stays false and the record remains `paid` for the
    /// repair sweep to revisit.
    ///
    /// # Errors
    ///
    /// [`PayError::InconsistentLedger`] when the effect function fails.
    pub async fn apply(&self, record: &mut PaymentRecord) -> Result<(), PayError> {
        debug_assert_eq!(record.status, PaymentStatus::Paid);
        if record.effect_applied {
            return Ok(());
        }

        let ctx = EffectContext {
            owner_ref: record.owner_ref.clone(),
            purpose: record.purpose.clone(),
            settlement_amount: record.settlement_amount,
            settlement_currency: record.settlement_currency.clone(),
        };

        match (self.effect)(ctx).await {
            Ok(()) => {
                record.effect_applied = true;
                tracing::info!(
                    id = %record.id,
                    owner = %record.owner_ref,
                    purpose = %record.purpose,
                    amount = %record.settlement_amount,
                    "payment effect applied"
                );
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    id = %record.id,
                    %err,
                    "payment effect failed; record left for repair sweep"
                );
                Err(PayError::InconsistentLedger(record.id.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PaymentId;
    use crate::timestamp::UnixTimestamp;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn paid_record() -> PaymentRecord {
        PaymentRecord {
            id: PaymentId::generate(),
            external_track_id: "trk-1".to_owned(),
            purpose: Purpose::from("deposit"),
            owner_ref: OwnerRef::from("user-1"),
            requested_fiat_amount: "10".parse().unwrap(),
            fiat_currency: "USD".to_owned(),
            settlement_currency: "ETH".to_owned(),
            settlement_amount: "0.004".parse().unwrap(),
            status: PaymentStatus::Paid,
            created_at: UnixTimestamp::from_secs(1000),
            expires_at: UnixTimestamp::from_secs(2800),
            settled_at: Some(UnixTimestamp::from_secs(1500)),
            effect_applied: false,
            last_notification_source: None,
        }
    }

    #[tokio::test]
    async fn applies_once_then_noops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let applier = LedgerApplier::from_fn(move |_ctx| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let mut record = paid_record();
        applier.apply(&mut record).await.unwrap();
        assert!(record.effect_applied);
        applier.apply(&mut record).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_leaves_guard_unset() {
        let applier =
            LedgerApplier::from_fn(|_ctx| async move { Err(EffectError::new("ledger down")) });

        let mut record = paid_record();
        let err = applier.apply(&mut record).await.unwrap_err();
        assert!(matches!(err, PayError::InconsistentLedger(_)));
        assert!(!record.effect_applied);
        assert_eq!(record.status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn effect_sees_frozen_amount() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let applier = LedgerApplier::from_fn(move |ctx| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(ctx);
                Ok(())
            }
        });

        let mut record = paid_record();
        applier.apply(&mut record).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].settlement_amount, "0.004".parse().unwrap());
        assert_eq!(seen[0].owner_ref.as_str(), "user-1");
        assert_eq!(seen[0].purpose.as_str(), "deposit");
    }
}
