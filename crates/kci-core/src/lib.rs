//! Wire format for the KCI demo protocol.
//!
//! This crate provides:
//! - The outer encrypted [`Envelope`] carried in a single UDP datagram
//! - The handshake payloads ([`HandshakePayload`]) found inside the ciphertext
//! - Sizes and limits shared by every other crate
//!
//! # Wire Format
//!
//! All multi-byte fields are raw byte strings; there is no padding and no
//! length prefix. The datagram boundary terminates the ciphertext.
//!
//! ```text
//! Envelope      := type(1) || sender_public_key(32) || nonce(24) || ciphertext(..)
//! HandshakeBlob := blob(24)
//! ```

#![forbid(unsafe_code)]

pub mod envelope;
pub mod payload;

pub use envelope::{Envelope, PacketType};
pub use payload::{HandshakeBlob, HandshakePayload};

/// Size of a Curve25519 public, secret or shared key.
pub const KEY_SIZE: usize = 32;

/// Size of an XSalsa20-Poly1305 nonce.
pub const NONCE_SIZE: usize = 24;

/// Size of a handshake challenge blob.
pub const BLOB_SIZE: usize = 24;

/// Shortest prefix that can be inspected at all: type byte plus sender key.
pub const ENVELOPE_MIN_SIZE: usize = 1 + KEY_SIZE;

/// Full fixed header: type, sender key and nonce.
pub const ENVELOPE_HEADER_SIZE: usize = ENVELOPE_MIN_SIZE + NONCE_SIZE;

/// Receive buffer size. Anything larger is truncated by the socket.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Errors produced while decoding wire data.
///
/// Always recoverable: the offending datagram is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("unknown packet type: 0x{0:02x}")]
    UnknownPacketType(u8),
}
