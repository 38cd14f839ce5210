//! Webhook signature verification.
//!
//! The provider signs each delivery with HMAC-SHA256 over
//! `"{timestamp}.{raw_body}"` and sends the result in a header shaped
//! `t=<unix-seconds>,v1=<hex-digest>[,v1=<hex-digest>...]`. Multiple `v1`
//! entries occur during secret rotation; any one matching digest passes.
//! Deliveries whose timestamp falls outside the configured tolerance are
//! rejected to bound replays.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

/// Name of the HTTP header carrying the signature.
pub const SIGNATURE_HEADER: &str = "x-payment-signature";

/// Verifies webhook payload authenticity against the shared signing secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The secret never appears in debug output.
        f.debug_struct("SignatureVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    /// Creates a verifier for the given signing secret and timestamp
    /// tolerance in seconds.
    #[must_use]
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Verifies `payload` against `signature_header` at time `now`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SignatureVerification`] when the header is
    /// missing parts, the timestamp is outside tolerance, or no digest
    /// matches. No state is touched on failure.
    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let mut timestamp: Option<i64> = None;
        let mut candidates: Vec<Vec<u8>> = Vec::new();

        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = value.parse().ok();
                }
                Some(("v1", value)) => {
                    if let Ok(bytes) = hex::decode(value) {
                        candidates.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            GatewayError::SignatureVerification("missing timestamp".to_string())
        })?;
        if candidates.is_empty() {
            return Err(GatewayError::SignatureVerification(
                "missing v1 digest".to_string(),
            ));
        }

        if (now.timestamp() - timestamp).abs() > self.tolerance_secs {
            return Err(GatewayError::SignatureVerification(
                "timestamp outside tolerance".to_string(),
            ));
        }

        let mut signed_payload = timestamp.to_string().into_bytes();
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(payload);

        // Mac::verify_slice is constant-time.
        let matched = candidates.iter().any(|candidate| {
            HmacSha256::new_from_slice(self.secret.as_bytes())
                .map(|mut mac| {
                    mac.update(&signed_payload);
                    mac.verify_slice(candidate).is_ok()
                })
                .unwrap_or(false)
        });

        if matched {
            Ok(())
        } else {
            Err(GatewayError::SignatureVerification(
                "no matching digest".to_string(),
            ))
        }
    }
}
