//! Handshake engine and UDP transport for the KCI demo.
//!
//! - [`handshake`]: the protocol state machine, independent of any socket
//! - [`transport`]: datagram send/receive abstraction and its UDP implementation
//! - [`peer`]: the receive loop tying the two together
//!
//! # Handshake Flow
//!
//! ```text
//! Initiator                                   Responder
//!     |                                           |
//!     |  Request { blob }  (sealed, type 0x00)    |
//!     |------------------------------------------>|
//!     |                                           |
//!     |  Response { blob } (sealed, type 0x01)    |
//!     |<------------------------------------------|
//!     |                                           |
//!     [ blob matches pending challenge: confirmed ]
//! ```

#![forbid(unsafe_code)]

pub mod handshake;
pub mod peer;
pub mod transport;

pub use handshake::{
    HandshakeEngine, HandshakeError, HandshakeOutcome, HandshakeRejection, HandshakeState, Inbound,
};
pub use peer::{Peer, PeerEvent};
pub use transport::{Transport, UdpTransport};
