//! Datagram transport.
//!
//! One protocol message per datagram; the datagram boundary is the only
//! framing. No retransmission, no ordering.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use kci_core::MAX_DATAGRAM_SIZE;
use tokio::net::UdpSocket;

/// Connectionless send/receive used by [`crate::Peer`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one datagram to `dest`.
    async fn send(&self, data: &[u8], dest: SocketAddr) -> io::Result<()>;

    /// Wait for the next datagram. Must be cancel safe.
    async fn receive(&self) -> io::Result<(Bytes, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// [`Transport`] over a tokio UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, data: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.socket.send_to(data, dest).await?;
        Ok(())
    }

    async fn receive(&self) -> io::Result<(Bytes, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, src) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        Ok((Bytes::from(buf), src))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
