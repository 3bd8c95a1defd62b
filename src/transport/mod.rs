//! clocksync - Transport layer
//!
//! This module carries protocol messages between the two roles. It provides:
//!
//! - **Socket abstraction**: [`DatagramSocket`], implemented for tokio's
//!   [`UdpSocket`](tokio::net::UdpSocket) and for the in-process
//!   [`MemoryNetwork`]
//! - **Latency injection**: [`DelayedTransport`] holds every outbound and
//!   inbound datagram for a fixed per-instance latency
//! - **Wire codec**: messages are encoded on send and decoded on delivery
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │      Initiator / Responder loop         │
//! ├─────────────────────────────────────────┤
//! │         DelayedTransport                │  ← This module
//! │   outbound delay line │ inbound delay   │
//! ├─────────────────────────────────────────┤
//! │   DatagramSocket (UDP or memory)        │
//! └─────────────────────────────────────────┘
//! ```

mod delayed;
mod memory;
mod socket;

pub use delayed::*;
pub use memory::*;
pub use socket::*;
