// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Gateway webhook signatures.
//!
//! The gateway signs `timestamp || raw_body` with HMAC-SHA256 under the
//! shared secret and sends the base64 digest in the `signature` header.
//! Verification compares digests in constant time.

use core::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies webhook bodies with the shared gateway secret.
///
/// # Examples
///
/// ```rust
/// use confidant_wallet_core::signature::SignatureVerifier;
///
/// let verifier = SignatureVerifier::new("whsec");
/// let body = br#"{"type":"PAYMENT_SUCCESS_WEBHOOK"}"#;
/// let signature = verifier.sign("1700000000", body).unwrap();
///
/// assert!(verifier.verify(&signature, "1700000000", body).is_ok());
/// assert!(verifier.verify(&signature, "1700000001", body).is_err());
/// ```
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl SignatureVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Base64 HMAC-SHA256 of `timestamp || body`.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> Result<String, WebhookError> {
        let mac = self.keyed(timestamp, body)?;
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Check `signature` against `timestamp || body`.
    ///
    /// Undecodable signatures and digest mismatches are both
    /// [`WebhookError::SignatureInvalid`].
    pub fn verify(&self, signature: &str, timestamp: &str, body: &[u8]) -> Result<(), WebhookError> {
        let expected = STANDARD
            .decode(signature.trim())
            .map_err(|_| WebhookError::SignatureInvalid)?;
        self.keyed(timestamp, body)?
            .verify_slice(&expected)
            .map_err(|_| WebhookError::SignatureInvalid)
    }

    fn keyed(&self, timestamp: &str, body: &[u8]) -> Result<HmacSha256, WebhookError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| WebhookError::SignatureInvalid)?;
        mac.update(timestamp.as_bytes());
        mac.update(body);
        Ok(mac)
    }
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"data":{"payment":{"payment_id":"P1"}}}"#;

    #[test]
    fn test_round_trip_signature_verifies() {
        let verifier = SignatureVerifier::new("secret");
        let signature = verifier.sign("1718000000", BODY).unwrap();
        assert_eq!(verifier.verify(&signature, "1718000000", BODY), Ok(()));
    }

    #[test]
    fn test_one_bit_flip_is_rejected() {
        let verifier = SignatureVerifier::new("secret");
        let signature = verifier.sign("1718000000", BODY).unwrap();

        let mut raw = STANDARD.decode(&signature).unwrap();
        raw[0] ^= 0x01;
        let flipped = STANDARD.encode(raw);

        assert_eq!(
            verifier.verify(&flipped, "1718000000", BODY),
            Err(WebhookError::SignatureInvalid)
        );
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let verifier = SignatureVerifier::new("secret");
        let signature = verifier.sign("1718000000", BODY).unwrap();
        let tampered = br#"{"data":{"payment":{"payment_id":"P2"}}}"#;
        assert!(verifier.verify(&signature, "1718000000", tampered).is_err());
    }

    #[test]
    fn test_wrong_secret_and_garbage_are_rejected() {
        let signature = SignatureVerifier::new("other").sign("1", BODY).unwrap();
        let verifier = SignatureVerifier::new("secret");
        assert!(verifier.verify(&signature, "1", BODY).is_err());
        assert!(verifier.verify("not base64 !!", "1", BODY).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", SignatureVerifier::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
    }
}
