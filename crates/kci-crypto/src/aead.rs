//! Authenticated encryption after precomputation.
//!
//! Equivalent to NaCl's `crypto_box_beforenm` / `crypto_box_afternm` /
//! `crypto_box_open_afternm`:
//!
//! ```text
//! shared  = HSalsa20(X25519(local_secret, peer_public), 0^16)
//! sealed  = XSalsa20-Poly1305(shared, nonce, plaintext)      // tag || ciphertext
//! ```
//!
//! Every call to [`SharedKey::encrypt`] draws a fresh random 24-byte nonce,
//! which is large enough that random nonces never collide in practice.

use std::fmt;

use crypto_secretbox::aead::generic_array::GenericArray;
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::XSalsa20Poly1305;
use kci_core::{KEY_SIZE, NONCE_SIZE};
use rand::rngs::OsRng;
use rand::RngCore;
use salsa20::cipher::consts::U10;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::keys::Keypair;
use crate::CryptoError;

pub type Nonce = [u8; NONCE_SIZE];

/// Which public key feeds shared-key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    /// Use the public key the remote peer declared in its envelope.
    #[default]
    Normal,
    /// Ignore the declared key and derive from the local keypair alone.
    ///
    /// Models an attacker holding the victim's secret key: the victim,
    /// answering a request that declares the victim's own public key,
    /// derives the very same key.
    Kci,
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Kci => write!(f, "kci"),
        }
    }
}

/// Derive the shared key for one packet.
pub fn derive_shared_key(
    mode: KeyMode,
    local: &Keypair,
    declared_peer_public: &[u8; KEY_SIZE],
) -> SharedKey {
    match mode {
        KeyMode::Normal => SharedKey::precompute(declared_peer_public, local.secret_key()),
        KeyMode::Kci => SharedKey::precompute(local.public_key(), local.secret_key()),
    }
}

/// Generate a random nonce.
pub fn generate_nonce() -> Result<Nonce, CryptoError> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CryptoError::RandomnessUnavailable(e.to_string()))?;
    Ok(nonce)
}

/// Precomputed crypto_box key.
///
/// Comparison is constant time and `Debug` never shows the key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; KEY_SIZE]);

impl SharedKey {
    /// Compute the shared key between a peer's public key and our secret key.
    pub fn precompute(peer_public: &[u8; KEY_SIZE], local_secret: &[u8; KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(*local_secret);
        let dh = secret.diffie_hellman(&PublicKey::from(*peer_public));

        let mut derived = salsa20::hsalsa::<U10>(
            GenericArray::from_slice(dh.as_bytes()),
            &GenericArray::default(),
        );

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&derived);
        derived.as_mut_slice().zeroize();
        Self(key)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Short hex prefix for logs.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Encrypt under a freshly generated nonce.
    ///
    /// Returns `(ciphertext, nonce)`; the nonce must travel with the ciphertext.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Nonce), CryptoError> {
        let nonce = generate_nonce()?;
        let ciphertext = self.seal(plaintext, &nonce)?;
        Ok((ciphertext, nonce))
    }

    /// Verify and decrypt.
    ///
    /// Any failure (tampering, wrong key, wrong nonce, short input) is
    /// reported as [`CryptoError::AuthenticationFailed`].
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &Nonce) -> Result<Vec<u8>, CryptoError> {
        self.cipher()
            .decrypt(GenericArray::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    fn seal(&self, plaintext: &[u8], nonce: &Nonce) -> Result<Vec<u8>, CryptoError> {
        self.cipher()
            .encrypt(GenericArray::from_slice(nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    fn cipher(&self) -> XSalsa20Poly1305 {
        XSalsa20Poly1305::new(GenericArray::from_slice(&self.0))
    }
}

impl PartialEq for SharedKey {
    fn eq(&self, other: &Self) -> bool {
        crate::helpers::constant_time_eq(&self.0, &other.0)
    }
}

impl Eq for SharedKey {}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedKey({}..)", self.fingerprint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn keypair(seed: u64) -> Keypair {
        Keypair::generate_from_rng(&mut StdRng::seed_from_u64(seed)).unwrap()
    }

    fn session_key() -> SharedKey {
        let a = keypair(1);
        let b = keypair(2);
        SharedKey::precompute(b.public_key(), a.secret_key())
    }

    #[test]
    fn test_precompute_is_deterministic() {
        let a = keypair(1);
        let b = keypair(2);

        let k1 = SharedKey::precompute(b.public_key(), a.secret_key());
        let k2 = SharedKey::precompute(b.public_key(), a.secret_key());
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_precompute_matches_nacl_vector() {
        // crypto_box_beforenm test vector from NaCl (RFC 7748 keys)
        let alice_secret: [u8; 32] =
            hex::decode("77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a")
                .unwrap()
                .try_into()
                .unwrap();
        let bob_public: [u8; 32] =
            hex::decode("de9edb7d7b7dc1b4d35b61c2ece435373f8343c85b78674dadfc7e146f882b4f")
                .unwrap()
                .try_into()
                .unwrap();

        let key = SharedKey::precompute(&bob_public, &alice_secret);
        assert_eq!(
            hex::encode(key.as_bytes()),
            "1b27556473e985d462cd51197a9a46c76009549eac6474f206c4ee0844f68389"
        );
    }

    #[test]
    fn test_normal_mode_symmetry() {
        let a = keypair(10);
        let b = keypair(20);

        let at_a = derive_shared_key(KeyMode::Normal, &a, b.public_key());
        let at_b = derive_shared_key(KeyMode::Normal, &b, a.public_key());
        assert_eq!(at_a, at_b);
    }

    #[test]
    fn test_distinct_peers_give_distinct_keys() {
        let a = keypair(10);
        let b = keypair(20);
        let c = keypair(30);

        let ab = derive_shared_key(KeyMode::Normal, &a, b.public_key());
        let ac = derive_shared_key(KeyMode::Normal, &a, c.public_key());
        assert_ne!(ab, ac);
    }

    #[test]
    fn test_kci_mode_ignores_declared_key() {
        let a = keypair(10);
        let b = keypair(20);
        let c = keypair(30);

        let via_b = derive_shared_key(KeyMode::Kci, &a, b.public_key());
        let via_c = derive_shared_key(KeyMode::Kci, &a, c.public_key());
        let own = SharedKey::precompute(a.public_key(), a.secret_key());

        assert_eq!(via_b, via_c);
        assert_eq!(via_b, own);
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = session_key();
        let plaintext = b"twenty-four byte payload";

        let (ciphertext, nonce) = key.encrypt(plaintext).unwrap();
        // Poly1305 tag is prepended
        assert_eq!(ciphertext.len(), plaintext.len() + 16);

        let decrypted = key.decrypt(&ciphertext, &nonce).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_each_encryption_uses_fresh_nonce() {
        let key = session_key();

        let (ct1, n1) = key.encrypt(b"same").unwrap();
        let (ct2, n2) = key.encrypt(b"same").unwrap();
        assert_ne!(n1, n2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_bit_flip_in_ciphertext_fails() {
        let key = session_key();
        let (ciphertext, nonce) = key.encrypt(b"tamper evident").unwrap();

        for byte in 0..ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = ciphertext.clone();
                tampered[byte] ^= 1 << bit;
                assert_eq!(
                    key.decrypt(&tampered, &nonce),
                    Err(CryptoError::AuthenticationFailed)
                );
            }
        }
    }

    #[test]
    fn test_bit_flip_in_nonce_fails() {
        let key = session_key();
        let (ciphertext, nonce) = key.encrypt(b"tamper evident").unwrap();

        for byte in 0..NONCE_SIZE {
            let mut tampered = nonce;
            tampered[byte] ^= 0x01;
            assert_eq!(
                key.decrypt(&ciphertext, &tampered),
                Err(CryptoError::AuthenticationFailed)
            );
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = session_key();
        let (ciphertext, nonce) = key.encrypt(b"for the right key only").unwrap();

        let other = SharedKey::precompute(keypair(3).public_key(), keypair(4).secret_key());
        assert_eq!(
            other.decrypt(&ciphertext, &nonce),
            Err(CryptoError::AuthenticationFailed)
        );
    }

    #[test]
    fn test_short_ciphertext_fails() {
        let key = session_key();
        let nonce = generate_nonce().unwrap();

        assert_eq!(key.decrypt(&[], &nonce), Err(CryptoError::AuthenticationFailed));
        assert_eq!(
            key.decrypt(&[0u8; 15], &nonce),
            Err(CryptoError::AuthenticationFailed)
        );
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = session_key();
        let debug = format!("{:?}", key);
        assert!(debug.starts_with("SharedKey("));
        assert!(!debug.contains(&hex::encode(key.as_bytes())));
    }
}
