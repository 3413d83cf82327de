//! Receive loop.
//!
//! A [`Peer`] owns a transport and a [`HandshakeEngine`]. Wrap it in an `Arc`
//! to run the receive loop on one task while another task initiates
//! handshakes. Each datagram is handled to completion before the next read.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use kci_core::{Envelope, KEY_SIZE};
use kci_crypto::{KeyMode, Keypair};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::handshake::{
    HandshakeEngine, HandshakeError, HandshakeOutcome, HandshakeRejection, HandshakeState, Inbound,
};
use crate::transport::Transport;

/// Notable things the receive loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    /// A handshake request was answered.
    RequestAnswered { peer: SocketAddr },
    Confirmed { peer: SocketAddr },
    Rejected {
        peer: SocketAddr,
        reason: HandshakeRejection,
    },
}

pub struct Peer<T: Transport> {
    transport: T,
    engine: HandshakeEngine,
    events: Option<mpsc::UnboundedSender<PeerEvent>>,
}

impl<T: Transport> Peer<T> {
    pub fn new(transport: T, keypair: Arc<Keypair>, mode: KeyMode) -> Self {
        Self {
            transport,
            engine: HandshakeEngine::new(keypair, mode),
            events: None,
        }
    }

    /// Report loop activity on `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<PeerEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn engine(&self) -> &HandshakeEngine {
        &self.engine
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn public_key(&self) -> &[u8; KEY_SIZE] {
        self.engine.public_key()
    }

    pub fn state(&self, peer: SocketAddr) -> HandshakeState {
        self.engine.state(peer)
    }

    /// Send a handshake request to `addr`.
    pub async fn connect(
        &self,
        addr: SocketAddr,
        peer_public: &[u8; KEY_SIZE],
    ) -> Result<(), HandshakeError> {
        let request = self.engine.initiate(addr, peer_public)?;
        self.transport.send(&request, addr).await?;
        info!("handshake request sent to {}", addr);
        Ok(())
    }

    /// Run the receive loop until `shutdown_rx` fires or its sender is dropped.
    ///
    /// Returns an error only when the transport fails.
    pub async fn run_with_shutdown(
        &self,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> io::Result<()> {
        if let Ok(addr) = self.transport.local_addr() {
            info!("listening on {} ({} mode)", addr, self.engine.mode());
        }

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("peer shutdown requested");
                    return Ok(());
                }

                recv = self.transport.receive() => {
                    let (data, src) = match recv {
                        Ok(r) => r,
                        Err(e) => {
                            warn!("udp read error: {}", e);
                            return Err(e);
                        }
                    };
                    if !Envelope::quick_check(&data) {
                        debug!("{} byte datagram from {} is not an envelope", data.len(), src);
                        continue;
                    }
                    self.handle(data, src).await;
                }
            }
        }
    }

    async fn handle(&self, data: Bytes, src: SocketAddr) {
        match self.engine.handle_datagram(data, src) {
            Ok(Inbound::Reply(reply)) => {
                if let Err(e) = self.transport.send(&reply, src).await {
                    warn!("unable to send handshake response to {}: {}", src, e);
                    return;
                }
                self.emit(PeerEvent::RequestAnswered { peer: src });
            }
            Ok(Inbound::Outcome(HandshakeOutcome::Confirmed)) => {
                self.emit(PeerEvent::Confirmed { peer: src });
            }
            Ok(Inbound::Outcome(HandshakeOutcome::Rejected(reason))) => {
                self.emit(PeerEvent::Rejected { peer: src, reason });
            }
            Err(e) => debug!("packet from {} dropped: {}", src, e),
        }
    }

    fn emit(&self, event: PeerEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
