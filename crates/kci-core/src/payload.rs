//! Handshake payloads carried inside the envelope ciphertext.
//!
//! Requests and responses share one layout: a single 24-byte blob. The
//! envelope's type byte decides which variant a body decodes to.

use std::fmt;

use crate::envelope::PacketType;
use crate::{DecodeError, BLOB_SIZE};

/// Random challenge exchanged during a handshake.
///
/// Used only as a liveness token; never as key material.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandshakeBlob([u8; BLOB_SIZE]);

impl HandshakeBlob {
    pub fn from_bytes(bytes: [u8; BLOB_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; BLOB_SIZE] {
        &self.0
    }
}

impl fmt::Debug for HandshakeBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandshakeBlob(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "..)")
    }
}

/// Decrypted handshake payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePayload {
    Request(HandshakeBlob),
    Response(HandshakeBlob),
}

impl HandshakePayload {
    /// Envelope type byte for this payload.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Request(_) => PacketType::HandshakeRequest,
            Self::Response(_) => PacketType::HandshakeResponse,
        }
    }

    pub fn blob(&self) -> &HandshakeBlob {
        match self {
            Self::Request(blob) | Self::Response(blob) => blob,
        }
    }

    pub fn encode(&self) -> [u8; BLOB_SIZE] {
        *self.blob().as_bytes()
    }

    /// Decode a plaintext body. Requires exactly [`BLOB_SIZE`] bytes.
    pub fn decode(packet_type: PacketType, body: &[u8]) -> Result<Self, DecodeError> {
        let bytes: [u8; BLOB_SIZE] = body.try_into().map_err(|_| DecodeError::Truncated {
            needed: BLOB_SIZE,
            got: body.len(),
        })?;

        let blob = HandshakeBlob::from_bytes(bytes);
        Ok(match packet_type {
            PacketType::HandshakeRequest => Self::Request(blob),
            PacketType::HandshakeResponse => Self::Response(blob),
        })
    }
}
