//! Inbound notification authentication.
//!
//! The only trust signal for a webhook is its HMAC: no source-IP lists,
//! no secondary checks. A request that fails here must be rejected with
//! an authentication error before any state is touched.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Verifies that an inbound notification originates from the configured
/// provider, using a shared secret and constant-time comparison.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl SignatureVerifier {
    /// Creates a verifier over the provider's webhook secret.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Checks a supplied signature (hex-encoded HMAC-SHA256 of the raw
    /// payload bytes) against the shared secret.
    ///
    /// The comparison is constant-time (`Mac::verify_slice`), never a
    /// byte-wise `==`. Any malformed input yields `false`.
    #[must_use]
    pub fn verify(&self, raw_payload: &[u8], supplied: &str) -> bool {
        let Ok(signature) = hex::decode(supplied.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(raw_payload);
        mac.verify_slice(&signature).is_ok()
    }
}
