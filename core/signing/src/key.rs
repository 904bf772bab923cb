//! Signing key derivation with secure memory handling.
//!
//! The key zeroizes its memory on drop to prevent sensitive data from
//! persisting in memory.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of signing keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Salt applied when a driver does not configure one of its own.
pub const DEFAULT_SALT: &str = "stratus.signer";

/// Symmetric key used to authenticate signed tokens.
///
/// Derived from a driver-configured secret and a namespacing salt, so two
/// drivers with the same secret but different salts produce incompatible
/// signatures.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SigningKey {
    key: [u8; KEY_LENGTH],
}

impl SigningKey {
    /// Create a signing key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Derive a signing key from a secret and an optional salt.
    ///
    /// Uses keyed blake2b for derivation. The same (secret, salt) pair is
    /// guaranteed to produce the same key across processes and restarts,
    /// which is what allows tokens to be re-derived rather than stored.
    pub fn derive(secret: &[u8], salt: Option<&[u8]>) -> Self {
        use blake2::digest::consts::U32;
        use blake2::{Blake2b, Digest};

        let mut hasher = Blake2b::<U32>::new();
        hasher.update(secret);
        hasher.update(salt.unwrap_or(DEFAULT_SALT.as_bytes()));
        hasher.update(b"tokenkey");

        let result = hasher.finalize();
        let mut derived = [0u8; KEY_LENGTH];
        derived.copy_from_slice(&result);
        Self::from_bytes(derived)
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_deterministic() {
        let key1 = SigningKey::derive(b"secret", Some(b"salt"));
        let key2 = SigningKey::derive(b"secret", Some(b"salt"));
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_different_salt() {
        let key1 = SigningKey::derive(b"secret", Some(b"salt-a"));
        let key2 = SigningKey::derive(b"secret", Some(b"salt-b"));
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_different_secret() {
        let key1 = SigningKey::derive(b"secret-a", None);
        let key2 = SigningKey::derive(b"secret-b", None);
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_default_salt_matches_explicit() {
        let key1 = SigningKey::derive(b"secret", None);
        let key2 = SigningKey::derive(b"secret", Some(DEFAULT_SALT.as_bytes()));
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }
}
