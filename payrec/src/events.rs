//! Terminal-transition event stream.
//!
//! Observers (admin notifications, metrics, audit) subscribe here
//! instead of being inlined into the reconciliation critical path, so a
//! slow or failing notification channel can never block settlement.
//! Lagging subscribers drop events rather than backpressuring the
//! reconciler.

use tokio::sync::broadcast;

use crate::record::{NotificationSource, PaymentId, PaymentStatus};

/// Emitted exactly once per terminal transition.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    /// Internal payment id.
    pub id: PaymentId,
    /// Provider tracking id.
    pub external_track_id: String,
    /// The terminal state reached.
    pub status: PaymentStatus,
    /// Who won the transition.
    pub source: NotificationSource,
}

/// Creates the terminal-event channel.
#[must_use]
pub fn channel(
    capacity: usize,
) -> (
    broadcast::Sender<PaymentEvent>,
    broadcast::Receiver<PaymentEvent>,
) {
    broadcast::channel(capacity)
}
