//! Timed, tamper-evident token serialization.
//!
//! A token is a URL-safe string of three dot-separated segments:
//! base64 payload, base64 big-endian issue timestamp, and a keyed
//! blake2b MAC over the first two segments. Verification recomputes the
//! MAC with constant-time comparison and optionally enforces a maximum
//! token age. There is no replay protection beyond expiry: a non-expired
//! token may be presented any number of times. This is a weaker guarantee
//! than provider-native pre-signed URLs.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use blake2::digest::consts::U32;
use blake2::digest::Mac;
use blake2::Blake2bMac;
use chrono::Utc;
use serde_json::Value;
use subtle::ConstantTimeEq;

use stratus_common::{Error, Result};

use crate::key::SigningKey;

type Blake2bMac256 = Blake2bMac<U32>;

/// Segment separator within a token.
const SEPARATOR: char = '.';

/// Signature length in bytes.
const SIGNATURE_LENGTH: usize = 32;

/// Signs and verifies timed payload tokens.
///
/// Payloads are arbitrary JSON values; the issue time is captured at
/// encode time and travels inside the signed portion of the token, so a
/// forged timestamp invalidates the signature.
pub struct TokenSigner {
    key: SigningKey,
}

impl TokenSigner {
    /// Create a signer from a secret and an optional namespacing salt.
    pub fn new(secret: &str, salt: Option<&str>) -> Self {
        Self {
            key: SigningKey::derive(secret.as_bytes(), salt.map(str::as_bytes)),
        }
    }

    /// Serialize and sign `payload` with the current wall-clock time.
    ///
    /// # Postconditions
    /// - The returned string is URL-safe and contains no padding.
    /// - `decode` with the same signer round-trips the payload.
    ///
    /// # Errors
    /// - Returns error if the payload cannot be serialized.
    pub fn encode(&self, payload: &Value) -> Result<String> {
        self.encode_at(payload, Utc::now().timestamp())
    }

    /// Verify `token` and return its payload.
    ///
    /// If `max_age` is given, the token is additionally rejected once more
    /// than `max_age` seconds have passed since its issue time.
    ///
    /// # Errors
    /// - `Error::InvalidSignature` if the token is malformed or the MAC
    ///   does not verify.
    /// - `Error::SignatureExpired` if the age limit is exceeded. Expiry is
    ///   only checked after the signature verifies, so the two failures
    ///   are always distinguishable.
    pub fn decode(&self, token: &str, max_age: Option<i64>) -> Result<Value> {
        self.decode_at(token, max_age, Utc::now().timestamp())
    }

    /// Encode with an explicit issue time. Exposed for deterministic tests.
    pub(crate) fn encode_at(&self, payload: &Value, issued_at: i64) -> Result<String> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| Error::Serialization(format!("Payload not serializable: {}", e)))?;

        let mut token = URL_SAFE_NO_PAD.encode(&body);
        token.push(SEPARATOR);
        token.push_str(&URL_SAFE_NO_PAD.encode(issued_at.to_be_bytes()));

        let signature = self.sign(token.as_bytes())?;
        token.push(SEPARATOR);
        token.push_str(&URL_SAFE_NO_PAD.encode(signature));

        Ok(token)
    }

    /// Decode against an explicit clock. Exposed for deterministic tests.
    pub(crate) fn decode_at(
        &self,
        token: &str,
        max_age: Option<i64>,
        now: i64,
    ) -> Result<Value> {
        let (signed_part, signature_b64) = token
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| Error::InvalidSignature("Missing signature segment".to_string()))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| Error::InvalidSignature("Signature is not valid base64".to_string()))?;

        let expected = self.sign(signed_part.as_bytes())?;
        if !bool::from(expected[..].ct_eq(&signature)) {
            return Err(Error::InvalidSignature(
                "Signature does not match".to_string(),
            ));
        }

        // Signature covers both remaining segments; safe to parse them now.
        let (payload_b64, timestamp_b64) = signed_part
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| Error::InvalidSignature("Missing timestamp segment".to_string()))?;

        let timestamp_bytes = URL_SAFE_NO_PAD
            .decode(timestamp_b64)
            .map_err(|_| Error::InvalidSignature("Timestamp is not valid base64".to_string()))?;
        let timestamp_bytes: [u8; 8] = timestamp_bytes
            .try_into()
            .map_err(|_| Error::InvalidSignature("Timestamp has wrong length".to_string()))?;
        let issued_at = i64::from_be_bytes(timestamp_bytes);

        if let Some(max_age) = max_age {
            if now - issued_at > max_age {
                return Err(Error::SignatureExpired);
            }
        }

        let body = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| Error::InvalidSignature("Payload is not valid base64".to_string()))?;

        serde_json::from_slice(&body)
            .map_err(|e| Error::Serialization(format!("Payload not deserializable: {}", e)))
    }

    fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LENGTH]> {
        let mut mac = Blake2bMac256::new_from_slice(self.key.as_bytes())
            .map_err(|e| Error::InvalidSignature(format!("Invalid signing key: {}", e)))?;
        mac.update(message);

        let mut signature = [0u8; SIGNATURE_LENGTH];
        signature.copy_from_slice(&mac.finalize().into_bytes());
        Ok(signature)
    }
}
