//! Datagram socket abstraction.
//!
//! [`DelayedTransport`](super::DelayedTransport) only needs to send and
//! receive whole datagrams, so it talks to a [`DatagramSocket`] rather than
//! to a concrete UDP socket. Production code binds a [`UdpDatagramSocket`];
//! tests use [`MemorySocket`](super::MemorySocket).

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;

/// An unreliable datagram channel.
#[async_trait]
pub trait DatagramSocket: Send + Sync + 'static {
    /// Send one datagram to `addr`.
    async fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize>;

    /// Receive one datagram and return its length and sender.
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Get the local address.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// UDP socket for clocksync traffic.
#[derive(Debug, Clone)]
pub struct UdpDatagramSocket {
    socket: Arc<UdpSocket>,
}

impl UdpDatagramSocket {
    /// Bind a UDP socket to the given address.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket))
    }

    /// Wrap an existing UDP socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket: Arc::new(socket),
        }
    }
}

#[async_trait]
impl DatagramSocket for UdpDatagramSocket {
    async fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(data, addr).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
