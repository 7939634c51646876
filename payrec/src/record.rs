//! Payment records and the status vocabulary.
//!
//! [`PaymentRecord`] is the sole persisted entity of the core. Records
//! are created by the invoice factory, mutated only by the reconciler
//! (status) and the ledger applier (`effect_applied`, `settled_at`), and
//! never deleted: terminal records stay around for audit and to reject
//! replayed notifications.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::timestamp::UnixTimestamp;

/// Opaque identifier for a payment record, assigned at creation and used
/// in URLs returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(String);

impl PaymentId {
    /// Generates a fresh random id (16 bytes, hex-encoded).
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(hex::encode(bytes))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PaymentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PaymentId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque caller-supplied beneficiary reference (user or account id).
/// Never interpreted by the core, only forwarded to the effect function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef(String);

/// Caller-supplied purpose tag (e.g. `"deposit"`, `"tier-upgrade"`).
/// Opaque to the core, forwarded to the effect function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purpose(String);

macro_rules! opaque_string {
    ($ty:ident) => {
        impl $ty {
            /// Returns the inner value as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $ty {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $ty {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_string!(OwnerRef);
opaque_string!(Purpose);

/// Status of a payment record.
///
/// Forward-only:
///
/// ```text
/// pending --> waiting --> paid | expired | failed
/// pending ------------->  paid | expired | failed
/// ```
///
/// The three terminal states are absorbing; no transition ever leaves
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Record created, provider not yet seen the payer.
    Pending,
    /// Provider acknowledged the invoice and is waiting for funds.
    Waiting,
    /// Funds received in full. Terminal.
    Paid,
    /// TTL elapsed without payment. Terminal.
    Expired,
    /// Provider reported failure/cancellation, or the observed amount
    /// fell short of the frozen settlement amount. Terminal.
    Failed,
}

impl PaymentStatus {
    /// Whether this status is absorbing.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Expired | Self::Failed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Waiting => "waiting",
            Self::Paid => "paid",
            Self::Expired => "expired",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Where a status observation came from. Recorded for audit only; the
/// state machine treats all sources identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSource {
    /// Asynchronous provider push.
    Webhook,
    /// Synchronous client-triggered status check.
    Poll,
    /// Expiry sweeper.
    Sweep,
}

impl fmt::Display for NotificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Webhook => "webhook",
            Self::Poll => "poll",
            Self::Sweep => "sweep",
        };
        f.write_str(s)
    }
}

/// The authoritative state of one payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    /// Internally generated opaque id.
    pub id: PaymentId,

    /// Provider-assigned tracking id. Immutable once set, globally
    /// unique, and the primary lookup key for notifications and polling.
    pub external_track_id: String,

    /// Caller-supplied purpose tag.
    pub purpose: Purpose,

    /// Caller-supplied beneficiary reference.
    pub owner_ref: OwnerRef,

    /// Fiat amount the caller asked to collect.
    pub requested_fiat_amount: Decimal,

    /// Fiat currency of the requested amount.
    pub fiat_currency: String,

    /// Currency the payer settles in.
    pub settlement_currency: String,

    /// Amount the payer must send, computed once at creation from the
    /// rate source and frozen to avoid rate-drift disputes.
    pub settlement_amount: Decimal,

    /// Current state-machine position.
    pub status: PaymentStatus,

    /// Creation time.
    pub created_at: UnixTimestamp,

    /// TTL deadline; past this the sweeper expires a non-terminal record.
    pub expires_at: UnixTimestamp,

    /// Set when the record reaches a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<UnixTimestamp>,

    /// Idempotency guard for the financial effect. Flips `false → true`
    /// at most once, and only while `status == paid`. Tracked separately
    /// from `status` to tolerate applier crashes between the two writes.
    pub effect_applied: bool,

    /// Source of the most recent accepted observation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_notification_source: Option<NotificationSource>,
}

impl PaymentRecord {
    /// Whether the record is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the record is non-terminal and past its TTL deadline.
    #[must_use]
    pub const fn is_overdue(&self, now: UnixTimestamp) -> bool {
        !self.is_terminal() && self.expires_at.is_past(now)
    }
}
