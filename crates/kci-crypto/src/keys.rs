//! Curve25519 keypairs for the local identity.
//!
//! # Example
//!
//! ```
//! use kci_crypto::Keypair;
//!
//! let keypair = Keypair::generate().unwrap();
//! let restored = Keypair::from_hex(&keypair.public_hex(), &keypair.secret_hex()).unwrap();
//! assert_eq!(restored.public_key(), keypair.public_key());
//! ```

use std::fmt;

use kci_core::KEY_SIZE;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::CryptoError;

/// Curve25519 keypair.
///
/// The secret half is zeroized on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Keypair {
    public: [u8; KEY_SIZE],
    secret: [u8; KEY_SIZE],
}

impl Keypair {
    /// Generate a new random keypair using the OS CSPRNG.
    pub fn generate() -> Result<Self, CryptoError> {
        Self::generate_from_rng(&mut OsRng)
    }

    /// Generate a keypair from the given RNG.
    ///
    /// Seeded RNGs give reproducible keys for tests.
    pub fn generate_from_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, CryptoError> {
        let mut secret = [0u8; KEY_SIZE];
        rng.try_fill_bytes(&mut secret)
            .map_err(|e| CryptoError::RandomnessUnavailable(e.to_string()))?;

        let keypair = Self::from_secret(&secret);
        secret.zeroize();
        Ok(keypair)
    }

    /// Build a keypair from a secret key, deriving the public half.
    pub fn from_secret(secret: &[u8; KEY_SIZE]) -> Self {
        Self {
            public: public_key_from_secret(secret),
            secret: *secret,
        }
    }

    /// Build a keypair from both halves as stored.
    ///
    /// The halves are not checked against each other; see [`Keypair::matches`].
    pub fn from_parts(public: [u8; KEY_SIZE], secret: [u8; KEY_SIZE]) -> Self {
        Self { public, secret }
    }

    /// Decode a keypair from its hex-encoded persisted form.
    pub fn from_hex(public_hex: &str, secret_hex: &str) -> Result<Self, CryptoError> {
        let public = decode_key(public_hex, "public key")?;
        let mut secret = decode_key(secret_hex, "secret key")?;

        let keypair = Self::from_parts(public, secret);
        secret.zeroize();
        Ok(keypair)
    }

    pub fn public_key(&self) -> &[u8; KEY_SIZE] {
        &self.public
    }

    /// Get the secret key bytes.
    ///
    /// # Security
    /// Handle with care! These bytes can recreate the identity.
    pub fn secret_key(&self) -> &[u8; KEY_SIZE] {
        &self.secret
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.public)
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret)
    }

    /// Whether the stored public key is the one derived from the secret key.
    pub fn matches(&self) -> bool {
        crate::helpers::constant_time_eq(&public_key_from_secret(&self.secret), &self.public)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public_hex())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Derive the Curve25519 public key for a secret key.
pub fn public_key_from_secret(secret: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    let secret = StaticSecret::from(*secret);
    *PublicKey::from(&secret).as_bytes()
}

/// Parse a hex-encoded peer public key.
pub fn parse_public_key(hex_key: &str) -> Result<[u8; KEY_SIZE], CryptoError> {
    decode_key(hex_key, "public key")
}

fn decode_key(hex_key: &str, what: &str) -> Result<[u8; KEY_SIZE], CryptoError> {
    let mut bytes = hex::decode(hex_key.trim())
        .map_err(|e| CryptoError::KeyDecode(format!("{what}: {e}")))?;

    if bytes.len() != KEY_SIZE {
        let len = bytes.len();
        bytes.zeroize();
        return Err(CryptoError::KeyDecode(format!(
            "{what}: expected {KEY_SIZE} bytes, got {len}"
        )));
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// RNG whose every fill fails.
    struct FailingRng;

    impl RngCore for FailingRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new("entropy source exhausted"))
        }
    }

    impl CryptoRng for FailingRng {}

    #[test]
    fn test_generate_fails_without_randomness() {
        let err = Keypair::generate_from_rng(&mut FailingRng).unwrap_err();
        match err {
            CryptoError::RandomnessUnavailable(msg) => assert!(msg.contains("exhausted")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_keypair_generation() {
        let a = Keypair::generate().unwrap();
        let b = Keypair::generate().unwrap();

        assert_ne!(a.public_key(), b.public_key());
        assert!(a.matches());
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let a = Keypair::generate_from_rng(&mut StdRng::seed_from_u64(7)).unwrap();
        let b = Keypair::generate_from_rng(&mut StdRng::seed_from_u64(7)).unwrap();
        let c = Keypair::generate_from_rng(&mut StdRng::seed_from_u64(8)).unwrap();

        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.secret_key(), b.secret_key());
        assert_ne!(a.public_key(), c.public_key());
    }

    #[test]
    fn test_hex_roundtrip() {
        let keypair = Keypair::generate().unwrap();
        assert_eq!(keypair.public_hex().len(), 64);

        let restored = Keypair::from_hex(&keypair.public_hex(), &keypair.secret_hex()).unwrap();
        assert_eq!(restored.public_key(), keypair.public_key());
        assert_eq!(restored.secret_key(), keypair.secret_key());
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        let good = "11".repeat(32);

        let err = Keypair::from_hex("zz", &good).unwrap_err();
        assert!(matches!(err, CryptoError::KeyDecode(_)));

        let err = Keypair::from_hex(&good, &"22".repeat(31)).unwrap_err();
        assert!(matches!(err, CryptoError::KeyDecode(ref m) if m.contains("got 31")));

        assert!(Keypair::from_hex(&"33".repeat(33), &good).is_err());
        assert!(Keypair::from_hex("", &good).is_err());
    }

    #[test]
    fn test_mismatched_halves_are_detected() {
        let a = Keypair::generate().unwrap();
        let b = Keypair::generate().unwrap();

        let forged = Keypair::from_parts(*b.public_key(), *a.secret_key());
        assert!(!forged.matches());
    }

    #[test]
    fn test_parse_public_key() {
        let keypair = Keypair::generate().unwrap();
        let parsed = parse_public_key(&keypair.public_hex()).unwrap();
        assert_eq!(&parsed, keypair.public_key());

        assert!(parse_public_key("abcd").is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let keypair = Keypair::generate().unwrap();
        let debug = format!("{:?}", keypair);
        assert!(debug.contains(&keypair.public_hex()));
        assert!(!debug.contains(&keypair.secret_hex()));
    }
}
