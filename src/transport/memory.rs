//! In-process datagram network.
//!
//! [`MemoryNetwork`] routes datagrams between [`MemorySocket`]s by address
//! without touching the OS. Delivery is immediate and in order; datagrams to
//! an address nobody is bound to are dropped, as UDP would.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::socket::DatagramSocket;

/// First port handed out for binds to port 0.
const EPHEMERAL_PORT_START: u16 = 49152;

type Datagram = (Vec<u8>, SocketAddr);

#[derive(Debug)]
struct Routes {
    endpoints: HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>,
    next_port: u16,
}

/// A shared in-memory datagram network.
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    routes: Arc<Mutex<Routes>>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self {
            routes: Arc::new(Mutex::new(Routes {
                endpoints: HashMap::new(),
                next_port: EPHEMERAL_PORT_START,
            })),
        }
    }

    /// Bind a socket to `addr`. Port 0 picks a free ephemeral port.
    pub fn bind(&self, addr: SocketAddr) -> io::Result<MemorySocket> {
        let mut routes = self.lock();

        let mut addr = addr;
        if addr.port() == 0 {
            loop {
                let port = routes.next_port;
                routes.next_port = routes.next_port.checked_add(1).unwrap_or(EPHEMERAL_PORT_START);
                addr.set_port(port);
                if !routes.endpoints.contains_key(&addr) {
                    break;
                }
            }
        } else if routes.endpoints.contains_key(&addr) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{addr} is already bound"),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        routes.endpoints.insert(addr, tx);

        Ok(MemorySocket {
            addr,
            network: self.clone(),
            rx: tokio::sync::Mutex::new(rx),
        })
    }

    /// Number of bound sockets.
    pub fn endpoint_count(&self) -> usize {
        self.lock().endpoints.len()
    }

    fn route(&self, data: &[u8], from: SocketAddr, to: SocketAddr) {
        match self.lock().endpoints.get(&to) {
            Some(tx) => {
                let _ = tx.send((data.to_vec(), from));
            }
            None => tracing::debug!(%to, "memory network: no endpoint, datagram dropped"),
        }
    }

    fn unbind(&self, addr: SocketAddr) {
        self.lock().endpoints.remove(&addr);
    }

    fn lock(&self) -> MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A socket bound on a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemorySocket {
    addr: SocketAddr,
    network: MemoryNetwork,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

#[async_trait]
impl DatagramSocket for MemorySocket {
    async fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.network.route(data, self.addr, addr);
        Ok(data.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (data, from) = self
            .rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "memory network closed"))?;

        // Oversized datagrams are truncated, matching recv_from on a UDP socket.
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok((len, from))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

impl Drop for MemorySocket {
    fn drop(&mut self) {
        self.network.unbind(self.addr);
    }
}
