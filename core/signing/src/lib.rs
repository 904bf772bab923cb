//! Symmetric signing primitives for Stratus.
//!
//! This module provides:
//! - Signing key derivation from a driver secret and namespacing salt
//! - Timed, tamper-evident payload tokens for pre-signed URL emulation
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No key material is ever logged
//! - Constant-time comparison for signature verification

pub mod key;
pub mod token;

pub use key::{SigningKey, DEFAULT_SALT, KEY_LENGTH};
pub use token::TokenSigner;
