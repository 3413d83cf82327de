//! Cryptographic primitives for the KCI demo.
//!
//! This crate provides:
//! - Long-term Curve25519 keypairs ([`Keypair`])
//! - NaCl `crypto_box` precomputation ([`SharedKey`]) and XSalsa20-Poly1305
//!   authenticated encryption after precomputation
//! - The two key-derivation modes ([`KeyMode`]) under demonstration
//!
//! # Design
//!
//! The shared key is `HSalsa20(X25519(secret, public), 0)`, exactly what
//! `crypto_box_beforenm` produces, so packets interoperate with any NaCl or
//! libsodium peer. Nothing binds the derived key to an authenticated peer
//! identity: the peer's public key is whatever the envelope declares.

#![forbid(unsafe_code)]

pub mod aead;
pub mod helpers;
pub mod keys;

pub use aead::{derive_shared_key, generate_nonce, KeyMode, Nonce, SharedKey};
pub use helpers::constant_time_eq;
pub use keys::{parse_public_key, public_key_from_secret, Keypair};

use thiserror::Error;

/// Errors from key handling and authenticated encryption.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Tag verification failed. Deliberately carries no detail.
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("randomness unavailable: {0}")]
    RandomnessUnavailable(String),

    #[error("invalid key: {0}")]
    KeyDecode(String),
}
