//! The single reconciliation path shared by webhook pushes, client
//! polling and the expiry sweeper.
//!
//! Every status observation, whatever its source, funnels through
//! [`Reconciler::reconcile`]. Duplicates, replays, out-of-order arrivals
//! and races all collapse into the same rule: the record's per-record
//! lock is taken, the stored status is re-checked under it, and a
//! terminal state is written at most once. The loser of any race
//! observes the winner's terminal state and becomes a no-op, never an
//! error.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::broadcast;

use crate::applier::LedgerApplier;
use crate::error::PayError;
use crate::events::PaymentEvent;
use crate::provider::{ProviderAdapter, ProviderStatus};
use crate::record::{NotificationSource, PaymentRecord, PaymentStatus};
use crate::store::LedgerStore;
use crate::timestamp::UnixTimestamp;

/// What a reconcile call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The record was already terminal. Duplicate and replayed
    /// notifications land here, as does the loser of a transition race.
    AlreadySettled(PaymentStatus),
    /// The observation did not advance the record: unknown provider
    /// vocabulary, or a repeat of the current non-terminal state.
    NoChange(PaymentStatus),
    /// Moved forward to a non-terminal state.
    Progressed(PaymentStatus),
    /// Won the transition into a terminal state.
    Settled {
        /// The terminal state written.
        status: PaymentStatus,
        /// Whether the effect ran and was recorded. `false` means the
        /// effect failed and the record awaits the repair sweep.
        effect_applied: bool,
    },
}

/// Drives the payment state machine and triggers the ledger applier
/// exactly once per `paid` settlement.
#[derive(Debug)]
pub struct Reconciler {
    store: Arc<LedgerStore>,
    applier: LedgerApplier,
    events: broadcast::Sender<PaymentEvent>,
}

impl Reconciler {
    /// Creates a reconciler over the ledger.
    #[must_use]
    pub fn new(
        store: Arc<LedgerStore>,
        applier: LedgerApplier,
        events: broadcast::Sender<PaymentEvent>,
    ) -> Self {
        Self {
            store,
            applier,
            events,
        }
    }

    /// Attempts a status transition for one observation.
    ///
    /// `observed_amount`, when the notification reports one, is checked
    /// against the frozen settlement amount: an underpaid or
    /// wrong-currency `paid` observation settles as `failed` rather than
    /// silently crediting short funds.
    ///
    /// # Errors
    ///
    /// [`PayError::NotFound`] for an unknown track id (notifications
    /// never create records). State-machine no-ops are outcomes, not
    /// errors.
    pub async fn reconcile(
        &self,
        adapter: &dyn ProviderAdapter,
        external_track_id: &str,
        observed: &ProviderStatus,
        observed_amount: Option<(Decimal, String)>,
        source: NotificationSource,
    ) -> Result<ReconcileOutcome, PayError> {
        let slot = self
            .store
            .entry(external_track_id)
            .ok_or_else(|| PayError::NotFound(external_track_id.to_owned()))?;
        let mut record = slot.lock().await;

        // The compare-and-set: the stored status is re-read under the
        // per-record lock, so a concurrent webhook/poll/sweep that won
        // first is visible here and this call degrades to a no-op.
        if record.status.is_terminal() {
            tracing::debug!(
                id = %record.id,
                status = %record.status,
                %source,
                "notification for settled payment ignored"
            );
            return Ok(ReconcileOutcome::AlreadySettled(record.status));
        }

        let Some(mut target) = adapter.map_status(observed) else {
            tracing::warn!(
                id = %record.id,
                provider = adapter.name(),
                raw = %observed,
                %source,
                "unrecognized provider status; not advancing"
            );
            return Ok(ReconcileOutcome::NoChange(record.status));
        };

        if target == PaymentStatus::Paid {
            if let Some((amount, currency)) = &observed_amount {
                // Providers are inconsistent about symbol casing.
                if !currency.eq_ignore_ascii_case(&record.settlement_currency)
                    || *amount < record.settlement_amount
                {
                    tracing::warn!(
                        id = %record.id,
                        observed_amount = %amount,
                        observed_currency = %currency,
                        expected_amount = %record.settlement_amount,
                        expected_currency = %record.settlement_currency,
                        "settlement mismatch; failing payment"
                    );
                    target = PaymentStatus::Failed;
                }
            }
        }

        match target {
            // Adapters must not map to pending; treat it as no movement.
            PaymentStatus::Pending => Ok(ReconcileOutcome::NoChange(record.status)),
            PaymentStatus::Waiting => {
                let moved = record.status != PaymentStatus::Waiting;
                record.status = PaymentStatus::Waiting;
                record.last_notification_source = Some(source);
                self.store.commit(&record)?;
                if moved {
                    tracing::debug!(id = %record.id, %source, "payment waiting for funds");
                    Ok(ReconcileOutcome::Progressed(PaymentStatus::Waiting))
                } else {
                    Ok(ReconcileOutcome::NoChange(PaymentStatus::Waiting))
                }
            }
            terminal => self.settle(&mut record, terminal, source).await,
        }
    }

    /// Expires overdue non-terminal records through the same
    /// compare-and-set path as any other terminal transition, so a
    /// `paid` notification that won first stays won. Returns how many
    /// records expired.
    ///
    /// # Errors
    ///
    /// Fails only on journal errors; individual records that are
    /// terminal or not yet due are skipped silently.
    pub async fn expire_due(&self, now: UnixTimestamp) -> Result<usize, PayError> {
        let mut expired = 0;
        for track in self.store.track_ids() {
            let Some(slot) = self.store.entry(&track) else {
                continue;
            };
            let mut record = slot.lock().await;
            if !record.is_overdue(now) {
                continue;
            }
            self.settle(&mut record, PaymentStatus::Expired, NotificationSource::Sweep)
                .await?;
            expired += 1;
        }
        Ok(expired)
    }

    /// Re-runs the effect for records stuck `paid` with an unapplied
    /// effect (the applier failed or the process crashed between the two
    /// writes). The one sanctioned revisit of a terminal state. Returns
    /// how many records were repaired.
    pub async fn repair_unapplied(&self) -> usize {
        let mut repaired = 0;
        for track in self.store.track_ids() {
            let Some(slot) = self.store.entry(&track) else {
                continue;
            };
            let mut record = slot.lock().await;
            if record.status != PaymentStatus::Paid || record.effect_applied {
                continue;
            }
            tracing::warn!(id = %record.id, "repairing paid record with unapplied effect");
            if self.applier.apply(&mut record).await.is_ok()
                && self.store.commit(&record).is_ok()
            {
                repaired += 1;
            }
        }
        repaired
    }

    /// Commits a terminal transition. The caller holds the record lock
    /// and has verified the record is non-terminal.
    async fn settle(
        &self,
        record: &mut PaymentRecord,
        status: PaymentStatus,
        source: NotificationSource,
    ) -> Result<ReconcileOutcome, PayError> {
        record.status = status;
        record.settled_at = Some(UnixTimestamp::now());
        record.last_notification_source = Some(source);
        // The terminal status is durable before the effect runs; a crash
        // here leaves `paid && !effect_applied` for the repair sweep.
        self.store.commit(record)?;
        tracing::info!(
            id = %record.id,
            track = %record.external_track_id,
            %status,
            %source,
            "payment settled"
        );

        let mut effect_applied = record.effect_applied;
        if status == PaymentStatus::Paid {
            // Still inside the per-record critical section: no second
            // caller can observe `paid` with an unapplied effect for
            // longer than the applier's own run.
            match self.applier.apply(record).await {
                Ok(()) => {
                    self.store.commit(record)?;
                    effect_applied = true;
                }
                Err(err) => {
                    tracing::error!(id = %record.id, %err, "effect deferred to repair sweep");
                    effect_applied = false;
                }
            }
        }

        let _ = self.events.send(PaymentEvent {
            id: record.id.clone(),
            external_track_id: record.external_track_id.clone(),
            status,
            source,
        });

        Ok(ReconcileOutcome::Settled {
            status,
            effect_applied,
        })
    }
}
