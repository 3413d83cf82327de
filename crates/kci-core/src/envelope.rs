//! Outer encrypted envelope.
//!
//! ```text
//!  0               1                                   33                  57
//! +---------------+-----------------------------------+-------------------+----------------+
//! |     Type      |     Sender public key (32)        |     Nonce (24)    | Ciphertext ... |
//! +---------------+-----------------------------------+-------------------+----------------+
//! ```
//!
//! The sender public key travels in plaintext and is not authenticated by the
//! envelope itself. The receiver feeds it straight into key derivation.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{DecodeError, ENVELOPE_HEADER_SIZE, ENVELOPE_MIN_SIZE, KEY_SIZE, NONCE_SIZE};

/// Envelope packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Initiator challenging a peer.
    HandshakeRequest = 0x00,
    /// Responder echoing the challenge back.
    HandshakeResponse = 0x01,
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::HandshakeRequest),
            0x01 => Ok(Self::HandshakeResponse),
            _ => Err(DecodeError::UnknownPacketType(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub packet_type: PacketType,
    pub sender_public_key: [u8; KEY_SIZE],
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Bytes,
}

impl Envelope {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ENVELOPE_HEADER_SIZE + self.ciphertext.len());
        buf.put_u8(self.packet_type as u8);
        buf.put_slice(&self.sender_public_key);
        buf.put_slice(&self.nonce);
        buf.put_slice(&self.ciphertext);
        buf.freeze()
    }

    /// Decode an envelope from one complete datagram.
    ///
    /// The ciphertext consumes every byte after the fixed header, so the
    /// input must be exactly one datagram.
    pub fn decode(mut bytes: Bytes) -> Result<Self, DecodeError> {
        if bytes.len() < ENVELOPE_MIN_SIZE {
            return Err(DecodeError::Truncated {
                needed: ENVELOPE_MIN_SIZE,
                got: bytes.len(),
            });
        }

        let packet_type = PacketType::try_from(bytes[0])?;

        if bytes.len() < ENVELOPE_HEADER_SIZE {
            return Err(DecodeError::Truncated {
                needed: ENVELOPE_HEADER_SIZE,
                got: bytes.len(),
            });
        }

        let mut sender_public_key = [0u8; KEY_SIZE];
        sender_public_key.copy_from_slice(&bytes[1..ENVELOPE_MIN_SIZE]);

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[ENVELOPE_MIN_SIZE..ENVELOPE_HEADER_SIZE]);

        bytes.advance(ENVELOPE_HEADER_SIZE);

        Ok(Self {
            packet_type,
            sender_public_key,
            nonce,
            ciphertext: bytes,
        })
    }

    /// Quick check if a buffer might be a valid envelope.
    ///
    /// This is a fast pre-check before full parsing.
    pub fn quick_check(buf: &[u8]) -> bool {
        buf.len() >= ENVELOPE_HEADER_SIZE && PacketType::try_from(buf[0]).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(packet_type: PacketType) -> Envelope {
        Envelope {
            packet_type,
            sender_public_key: [0xAB; KEY_SIZE],
            nonce: [0x5C; NONCE_SIZE],
            ciphertext: Bytes::from_static(b"opaque ciphertext bytes"),
        }
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = sample(PacketType::HandshakeResponse);
        let decoded = Envelope::decode(envelope.encode()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_envelope_layout() {
        let envelope = sample(PacketType::HandshakeRequest);
        let encoded = envelope.encode();

        assert_eq!(encoded.len(), ENVELOPE_HEADER_SIZE + envelope.ciphertext.len());
        assert_eq!(encoded[0], 0x00);
        assert_eq!(&encoded[1..33], &[0xAB; KEY_SIZE]);
        assert_eq!(&encoded[33..57], &[0x5C; NONCE_SIZE]);
        assert_eq!(&encoded[57..], b"opaque ciphertext bytes");
    }

    #[test]
    fn test_empty_ciphertext_is_accepted() {
        let mut envelope = sample(PacketType::HandshakeRequest);
        envelope.ciphertext = Bytes::new();

        let decoded = Envelope::decode(envelope.encode()).unwrap();
        assert!(decoded.ciphertext.is_empty());
    }

    #[test]
    fn test_short_input_is_truncated() {
        for len in 0..ENVELOPE_MIN_SIZE {
            let err = Envelope::decode(Bytes::from(vec![0x02; len])).unwrap_err();
            assert_eq!(
                err,
                DecodeError::Truncated {
                    needed: ENVELOPE_MIN_SIZE,
                    got: len
                }
            );
        }
    }

    #[test]
    fn test_missing_nonce_is_truncated() {
        let err = Envelope::decode(Bytes::from(vec![0x01; ENVELOPE_HEADER_SIZE - 1])).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated { needed, .. } if needed == ENVELOPE_HEADER_SIZE
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut raw = sample(PacketType::HandshakeRequest).encode().to_vec();
        raw[0] = 0x02;

        let err = Envelope::decode(Bytes::from(raw)).unwrap_err();
        assert_eq!(err, DecodeError::UnknownPacketType(0x02));
    }

    #[test]
    fn test_quick_check() {
        let encoded = sample(PacketType::HandshakeRequest).encode();
        assert!(Envelope::quick_check(&encoded));
        assert!(!Envelope::quick_check(&encoded[..ENVELOPE_HEADER_SIZE - 1]));

        let mut bad_type = encoded.to_vec();
        bad_type[0] = 0x7F;
        assert!(!Envelope::quick_check(&bad_type));
    }
}
