//! Latency-injecting transport.
//!
//! [`DelayedTransport`] wraps a [`DatagramSocket`] and holds every datagram
//! for a fixed latency in each direction before it reaches the wire or the
//! owning role. The two roles are configured with different latencies; the
//! resulting path asymmetry is what the delay request/reply leg measures.
//!
//! # Ordering
//!
//! Each direction is a single delay line: items are stamped when they enter
//! and released at `stamp + latency` by one task, in entry order. Because the
//! latency is constant per instance, release order equals entry order for one
//! transport. Nothing orders traffic across transports or guarantees the
//! underlying network keeps datagrams in order, so this is a best-effort
//! property of the whole path and tests should only lean on it for a single
//! transport over a [`MemoryNetwork`](super::MemoryNetwork).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use super::socket::DatagramSocket;
use crate::core::{MAX_DATAGRAM_SIZE, TransportError, TransportResult};
use crate::protocol::Message;

/// Capacity of the inbound delay line and delivery queue.
const INBOUND_QUEUE_CAPACITY: usize = 256;

/// A decoded message and the address it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The decoded message.
    pub message: Message,
    /// Sender address as reported by the socket.
    pub from: SocketAddr,
}

/// A datagram waiting in a delay line.
#[derive(Debug)]
struct Pending {
    due: Instant,
    data: Vec<u8>,
    peer: SocketAddr,
}

/// Message transport with fixed one-way latency in both directions.
///
/// Sending is fire-and-forget: [`send`](Self::send) encodes immediately and
/// returns, the datagram leaves after the latency elapses. Inbound datagrams
/// are decoded only after their latency elapses and are handed out by
/// [`recv`](Self::recv), decode failures included.
#[derive(Debug)]
pub struct DelayedTransport {
    latency: Duration,
    local_addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Pending>,
    inbound: mpsc::Receiver<TransportResult<Delivery>>,
    tasks: Vec<JoinHandle<()>>,
}

impl DelayedTransport {
    /// Wrap `socket`, delaying each direction by `latency`.
    ///
    /// Spawns the delay line tasks, so it must be called from within a tokio
    /// runtime.
    pub fn new(socket: Arc<dyn DatagramSocket>, latency: Duration) -> TransportResult<Self> {
        let local_addr = socket.local_addr()?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (line_tx, line_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        let (delivery_tx, delivery_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);

        let tasks = vec![
            tokio::spawn(run_outbound(Arc::clone(&socket), outbound_rx)),
            tokio::spawn(run_reader(socket, latency, line_tx, delivery_tx.clone())),
            tokio::spawn(run_inbound(line_rx, delivery_tx)),
        ];

        tracing::debug!(%local_addr, ?latency, "delayed transport started");

        Ok(Self {
            latency,
            local_addr,
            outbound: outbound_tx,
            inbound: delivery_rx,
            tasks,
        })
    }

    /// Get the one-way latency applied in each direction.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Get the local address of the wrapped socket.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Schedule `message` for transmission to `to` after the latency.
    ///
    /// Returns as soon as the message is encoded and queued. Send failures on
    /// the wire are logged, never reported back.
    pub fn send(&self, message: &Message, to: SocketAddr) -> TransportResult<()> {
        let data = message.encode()?;
        tracing::debug!(kind = message.kind(), %to, "queued for delayed send");

        self.outbound
            .send(Pending {
                due: Instant::now() + self.latency,
                data,
                peer: to,
            })
            .map_err(|_| TransportError::Closed)
    }

    /// Receive the next delivery.
    ///
    /// A [`TransportError::Decode`] only affects the datagram it describes;
    /// later calls keep returning subsequent traffic. Returns
    /// [`TransportError::Closed`] once the socket has failed and every
    /// pending delivery has been handed out. Cancel safe.
    pub async fn recv(&mut self) -> TransportResult<Delivery> {
        self.inbound.recv().await.unwrap_or(Err(TransportError::Closed))
    }
}

impl Drop for DelayedTransport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn run_outbound(socket: Arc<dyn DatagramSocket>, mut rx: mpsc::UnboundedReceiver<Pending>) {
    while let Some(item) = rx.recv().await {
        time::sleep_until(item.due).await;
        if let Err(e) = socket.send_to(&item.data, item.peer).await {
            tracing::warn!(to = %item.peer, error = %e, "delayed send failed");
        }
    }
}

async fn run_reader(
    socket: Arc<dyn DatagramSocket>,
    latency: Duration,
    line: mpsc::Sender<Pending>,
    deliveries: mpsc::Sender<TransportResult<Delivery>>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                let item = Pending {
                    due: Instant::now() + latency,
                    data: buf[..len].to_vec(),
                    peer: from,
                };
                if line.send(item).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "socket receive failed, stopping reader");
                let _ = deliveries.send(Err(TransportError::Io(e))).await;
                break;
            }
        }
    }
}

async fn run_inbound(
    mut line: mpsc::Receiver<Pending>,
    deliveries: mpsc::Sender<TransportResult<Delivery>>,
) {
    while let Some(item) = line.recv().await {
        time::sleep_until(item.due).await;
        let delivery = Message::decode(&item.data)
            .map(|message| Delivery {
                message,
                from: item.peer,
            })
            .map_err(TransportError::from);
        if deliveries.send(delivery).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DecodeError;
    use crate::transport::MemoryNetwork;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_is_delayed_by_latency() {
        let network = MemoryNetwork::new();
        let a = Arc::new(network.bind(addr("10.0.0.1:0")).unwrap());
        let peer = network.bind(addr("10.0.0.2:5555")).unwrap();

        let transport = DelayedTransport::new(a, Duration::from_millis(400)).unwrap();
        let start = Instant::now();
        transport
            .send(&Message::discover("alice"), addr("10.0.0.2:5555"))
            .unwrap();

        let mut buf = [0u8; 256];
        let (len, from) = peer.recv_from(&mut buf).await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(400) && elapsed < Duration::from_millis(401));
        assert_eq!(from, transport.local_addr());
        assert_eq!(Message::decode(&buf[..len]).unwrap(), Message::discover("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_is_delayed_and_decoded() {
        let network = MemoryNetwork::new();
        let a = Arc::new(network.bind(addr("10.0.0.1:5555")).unwrap());
        let peer = network.bind(addr("10.0.0.2:0")).unwrap();

        let mut transport = DelayedTransport::new(a, Duration::from_millis(1245)).unwrap();
        let start = Instant::now();
        let bytes = Message::delay_request("alice").encode().unwrap();
        peer.send_to(&bytes, addr("10.0.0.1:5555")).await.unwrap();

        let delivery = transport.recv().await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1245) && elapsed < Duration::from_millis(1246));
        assert_eq!(delivery.message, Message::delay_request("alice"));
        assert_eq!(delivery.from, peer.local_addr().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_failure_does_not_stop_delivery() {
        let network = MemoryNetwork::new();
        let a = Arc::new(network.bind(addr("10.0.0.1:5555")).unwrap());
        let peer = network.bind(addr("10.0.0.2:0")).unwrap();
        let mut transport = DelayedTransport::new(a, Duration::from_millis(10)).unwrap();

        peer.send_to(b"{garbage", addr("10.0.0.1:5555")).await.unwrap();
        let bytes = Message::discover("alice").encode().unwrap();
        peer.send_to(&bytes, addr("10.0.0.1:5555")).await.unwrap();

        let first = transport.recv().await;
        assert!(matches!(
            first,
            Err(TransportError::Decode(DecodeError::InvalidMessage(_)))
        ));

        let second = transport.recv().await.unwrap();
        assert_eq!(second.message, Message::discover("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_latency_keeps_send_order() {
        let network = MemoryNetwork::new();
        let a = Arc::new(network.bind(addr("10.0.0.1:0")).unwrap());
        let peer = network.bind(addr("10.0.0.2:5555")).unwrap();
        let transport = DelayedTransport::new(a, Duration::from_millis(50)).unwrap();

        for i in 0..5 {
            transport
                .send(&Message::follow_up("server", i), addr("10.0.0.2:5555"))
                .unwrap();
        }

        let mut buf = [0u8; 256];
        for i in 0..5 {
            let (len, _) = peer.recv_from(&mut buf).await.unwrap();
            assert_eq!(
                Message::decode(&buf[..len]).unwrap(),
                Message::follow_up("server", i)
            );
        }
    }
}
