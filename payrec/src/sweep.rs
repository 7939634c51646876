//! Background expiry and repair sweeps.
//!
//! One periodic task covers both maintenance duties: expiring invoices
//! whose TTL elapsed without payment, and re-running effects for records
//! stuck `paid` without an applied effect. Both go through the
//! reconciler, so they obey the same compare-and-set as live traffic.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::reconcile::Reconciler;
use crate::timestamp::UnixTimestamp;

/// Periodic task that expires overdue invoices and retries unapplied
/// effects.
#[derive(Debug)]
pub struct ExpirySweeper {
    reconciler: Arc<Reconciler>,
    interval: Duration,
}

impl ExpirySweeper {
    /// Creates a sweeper ticking at `interval`.
    #[must_use]
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
        }
    }

    /// Runs one sweep: expiry pass, then repair pass.
    pub async fn sweep_once(&self) {
        match self.reconciler.expire_due(UnixTimestamp::now()).await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "expired overdue payments"),
            Err(err) => tracing::error!(%err, "expiry sweep failed"),
        }
        let repaired = self.reconciler.repair_unapplied().await;
        if repaired > 0 {
            tracing::info!(count = repaired, "repaired unapplied effects");
        }
    }

    /// Spawns the sweep loop; it stops when `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => self.sweep_once().await,
                }
            }
            tracing::debug!("expiry sweeper stopped");
        })
    }
}
