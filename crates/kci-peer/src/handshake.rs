//! Handshake state machine.
//!
//! Per remote address: `Idle -> AwaitingResponse -> Confirmed`. A response
//! that does not match the pending challenge is rejected and leaves the
//! pending challenge in place. Answering requests is stateless.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use kci_core::{DecodeError, Envelope, HandshakeBlob, HandshakePayload, KEY_SIZE};
use kci_crypto::{
    constant_time_eq, derive_shared_key, generate_nonce, CryptoError, KeyMode, Keypair,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors while building or processing a handshake packet.
///
/// Decode and crypto errors are per-packet: the packet is dropped.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    AwaitingResponse,
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRejection {
    /// No handshake in flight with the sender.
    NoPendingChallenge,
    /// The echoed blob differs from the pending challenge.
    BlobMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Confirmed,
    Rejected(HandshakeRejection),
}

/// What the caller must do after an inbound packet was processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Send these bytes back to the packet's source.
    Reply(Bytes),
    /// A response was checked against our pending challenge.
    Outcome(HandshakeOutcome),
}

#[derive(Debug, Clone, Copy)]
enum PeerSlot {
    Awaiting(HandshakeBlob),
    Confirmed,
}

/// Handshake engine for one local identity.
///
/// Safe to share between the receive loop and an initiating task: the
/// keypair is read-only and per-peer state sits behind a mutex that is never
/// held across an await point.
pub struct HandshakeEngine {
    keypair: Arc<Keypair>,
    mode: KeyMode,
    peers: Mutex<HashMap<SocketAddr, PeerSlot>>,
}

impl HandshakeEngine {
    pub fn new(keypair: Arc<Keypair>, mode: KeyMode) -> Self {
        Self {
            keypair,
            mode,
            peers: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    pub fn public_key(&self) -> &[u8; KEY_SIZE] {
        self.keypair.public_key()
    }

    /// Handshake state for a remote address.
    pub fn state(&self, peer: SocketAddr) -> HandshakeState {
        match self.peers().get(&peer) {
            None => HandshakeState::Idle,
            Some(PeerSlot::Awaiting(_)) => HandshakeState::AwaitingResponse,
            Some(PeerSlot::Confirmed) => HandshakeState::Confirmed,
        }
    }

    /// Start a handshake with `peer`.
    ///
    /// Stores a fresh challenge (replacing any earlier one for that address)
    /// and returns the sealed request to send.
    pub fn initiate(
        &self,
        peer: SocketAddr,
        peer_public: &[u8; KEY_SIZE],
    ) -> Result<Bytes, HandshakeError> {
        let blob = HandshakeBlob::from_bytes(generate_nonce()?);
        let packet = self.seal(HandshakePayload::Request(blob), peer_public)?;

        if let Some(PeerSlot::Awaiting(_)) = self.peers().insert(peer, PeerSlot::Awaiting(blob)) {
            debug!("replaced pending challenge for {}", peer);
        }

        Ok(packet)
    }

    /// Process one inbound datagram from `src`.
    pub fn handle_datagram(&self, data: Bytes, src: SocketAddr) -> Result<Inbound, HandshakeError> {
        let envelope = Envelope::decode(data)?;
        let payload = self.open(&envelope)?;

        match payload {
            HandshakePayload::Request(blob) => {
                info!("handshake request received from {}", src);
                let reply = self.on_handshake_request(&envelope.sender_public_key, blob)?;
                Ok(Inbound::Reply(reply))
            }
            HandshakePayload::Response(blob) => {
                info!("handshake response received from {}", src);
                Ok(Inbound::Outcome(self.on_handshake_response(src, &blob)))
            }
        }
    }

    /// Answer a request: echo the blob back, sealed for the declared sender.
    pub fn on_handshake_request(
        &self,
        declared_public: &[u8; KEY_SIZE],
        blob: HandshakeBlob,
    ) -> Result<Bytes, HandshakeError> {
        self.seal(HandshakePayload::Response(blob), declared_public)
    }

    /// Check an echoed blob against the pending challenge for `src`.
    ///
    /// A match clears the challenge, so replaying the same response later
    /// is rejected.
    pub fn on_handshake_response(&self, src: SocketAddr, blob: &HandshakeBlob) -> HandshakeOutcome {
        let mut peers = self.peers();

        let outcome = match peers.get(&src) {
            Some(PeerSlot::Awaiting(pending)) => {
                if constant_time_eq(pending.as_bytes(), blob.as_bytes()) {
                    HandshakeOutcome::Confirmed
                } else {
                    HandshakeOutcome::Rejected(HandshakeRejection::BlobMismatch)
                }
            }
            _ => HandshakeOutcome::Rejected(HandshakeRejection::NoPendingChallenge),
        };

        match outcome {
            HandshakeOutcome::Confirmed => {
                peers.insert(src, PeerSlot::Confirmed);
                info!("handshake confirmed with {}", src);
            }
            HandshakeOutcome::Rejected(reason) => {
                warn!("bad handshake from {}: {:?}", src, reason);
            }
        }

        outcome
    }

    fn seal(
        &self,
        payload: HandshakePayload,
        peer_public: &[u8; KEY_SIZE],
    ) -> Result<Bytes, HandshakeError> {
        let key = derive_shared_key(self.mode, &self.keypair, peer_public);
        debug!("shared key {} ({} mode)", key.fingerprint(), self.mode);

        let (ciphertext, nonce) = key.encrypt(&payload.encode())?;

        let envelope = Envelope {
            packet_type: payload.packet_type(),
            sender_public_key: *self.keypair.public_key(),
            nonce,
            ciphertext: Bytes::from(ciphertext),
        };
        Ok(envelope.encode())
    }

    fn open(&self, envelope: &Envelope) -> Result<HandshakePayload, HandshakeError> {
        let key = derive_shared_key(self.mode, &self.keypair, &envelope.sender_public_key);
        debug!("shared key {} ({} mode)", key.fingerprint(), self.mode);

        let plaintext = key.decrypt(&envelope.ciphertext, &envelope.nonce)?;
        Ok(HandshakePayload::decode(envelope.packet_type, &plaintext)?)
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<SocketAddr, PeerSlot>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
