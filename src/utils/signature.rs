//! Webhook signature verification
//!
//! Processor events carry a `Stripe-Signature` header of the form
//! `t=<unix seconds>,v1=<hex hmac-sha256>` computed over `"{t}.{raw body}"`.
//! Several `v1` entries may be present while a secret is being rolled.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is missing or malformed")]
    Malformed,

    #[error("signature timestamp outside tolerance ({age}s > {tolerance}s)")]
    Expired { age: u64, tolerance: u64 },

    #[error("no signature matches the payload")]
    Mismatch,

    #[error("webhook secret is unusable")]
    InvalidSecret,
}

#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: u64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), SignatureError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), SignatureError> {
        let mut timestamp: Option<i64> = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
        if signatures.is_empty() {
            return Err(SignatureError::Malformed);
        }

        let age = (now - timestamp).unsigned_abs();
        if age > self.tolerance_secs {
            return Err(SignatureError::Expired {
                age,
                tolerance: self.tolerance_secs,
            });
        }

        for candidate in signatures {
            let Ok(expected) = hex::decode(candidate) else {
                continue;
            };
            // verify_slice compares in constant time
            if self.mac_for(timestamp, payload)?.verify_slice(&expected).is_ok() {
                return Ok(());
            }
        }

        Err(SignatureError::Mismatch)
    }

    /// Header value for `payload` signed at `timestamp`. Used by tests and
    /// local tooling that replays events.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, SignatureError> {
        let digest = self.mac_for(timestamp, payload)?.finalize().into_bytes();
        Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
    }

    fn mac_for(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_900_000_000;

    #[test]
    fn test_sign_then_verify() {
        let verifier = WebhookVerifier::new("whsec_test", 300);
        let header = verifier.sign(b"{\"id\":\"evt_1\"}", NOW).unwrap();

        assert!(header.starts_with(&format!("t={},v1=", NOW)));
        assert_eq!(verifier.verify_at(b"{\"id\":\"evt_1\"}", &header, NOW + 10), Ok(()));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let verifier = WebhookVerifier::new("whsec_test", 300);
        let header = verifier.sign(b"{\"amount\":100}", NOW).unwrap();

        assert_eq!(
            verifier.verify_at(b"{\"amount\":999}", &header, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let header = WebhookVerifier::new("whsec_other", 300).sign(b"{}", NOW).unwrap();
        let verifier = WebhookVerifier::new("whsec_test", 300);
        assert_eq!(verifier.verify_at(b"{}", &header, NOW), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let verifier = WebhookVerifier::new("whsec_test", 300);
        let header = verifier.sign(b"{}", NOW).unwrap();
        assert!(matches!(
            verifier.verify_at(b"{}", &header, NOW + 301),
            Err(SignatureError::Expired { .. })
        ));
    }

    #[test]
    fn test_malformed_headers() {
        let verifier = WebhookVerifier::new("whsec_test", 300);
        assert_eq!(verifier.verify_at(b"{}", "", NOW), Err(SignatureError::Malformed));
        assert_eq!(verifier.verify_at(b"{}", "v1=abcd", NOW), Err(SignatureError::Malformed));
        assert_eq!(
            verifier.verify_at(b"{}", &format!("t={}", NOW), NOW),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn test_any_matching_v1_is_accepted() {
        let verifier = WebhookVerifier::new("whsec_test", 300);
        let good = verifier.sign(b"{}", NOW).unwrap();
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1=deadbeef,v1={}", NOW, good_sig);
        assert_eq!(verifier.verify_at(b"{}", &header, NOW), Ok(()));
    }
}
