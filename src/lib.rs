//! # clocksync
//!
//! A two-party, PTP-style clock synchronization protocol over UDP with
//! injected latency, built so every step of offset and delay estimation can
//! be observed.
//!
//! An **initiator** and a **responder** each own a virtual clock that ticks
//! once per tick period. The initiator discovers the responder, timestamps
//! its sync, learns the responder's send time from the follow-up, measures
//! the return path with a delay request, and finally steps its own clock:
//!
//! ```text
//! offset     = master_sync_time - sync_time
//! delay      = (offset - (req_time - delay_req_time)) / 2
//! adjustment = offset - delay
//! ```
//!
//! ## Feature Flags
//!
//! - `transport` (default): Sockets, latency injection, virtual clock ticking
//! - `client` (default): The initiator role
//! - `server` (default): The responder role
//!
//! ## Modules
//!
//! - [`core`]: Constants, error types, and the [`Reporter`](core::Reporter) surface (always included)
//! - [`protocol`]: Wire messages and the estimate arithmetic (always included)
//! - [`clock`]: Virtual clocks (requires `transport` feature)
//! - [`transport`]: Datagram sockets and delay lines (requires `transport` feature)
//! - [`client`]: Initiator state machine (requires `client` feature)
//! - [`server`]: Responder state machine (requires `server` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use clocksync::prelude::*;
//!
//! let offset = sync_offset(5000, 1010).unwrap();
//! let estimate = SyncEstimate::from_exchange(offset, 5050, 1030).unwrap();
//! assert_eq!(estimate.offset, 3990);
//! assert_eq!(estimate.delay, -15.0);
//! assert_eq!(estimate.clock_step(), 4005);
//!
//! let wire = Message::follow_up("server", 5000).encode().unwrap();
//! assert_eq!(Message::decode(&wire).unwrap(), Message::follow_up("server", 5000));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Wire messages and arithmetic (always included)
pub mod protocol;

// Virtual clocks (feature-gated, ticking needs the runtime)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod clock;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Initiator (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Responder (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

#[cfg(all(test, feature = "transport"))]
mod test_support;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::protocol::{Message, SyncEstimate, sync_offset};

    #[cfg(feature = "transport")]
    pub use crate::clock::{ClockReader, VirtualClock};

    #[cfg(feature = "transport")]
    pub use crate::transport::{
        DatagramSocket, DelayedTransport, Delivery, MemoryNetwork, MemorySocket,
        UdpDatagramSocket,
    };

    #[cfg(feature = "client")]
    pub use crate::client::{Initiator, InitiatorBuilder, InitiatorConfig, InitiatorPhase};

    #[cfg(feature = "server")]
    pub use crate::server::{Responder, ResponderBuilder, ResponderConfig};
}

// Re-export commonly used items at crate root
pub use core::{ClockSyncError, DecodeError, ProtocolError, Reporter, TransportError};
pub use protocol::{Message, SyncEstimate};

#[cfg(feature = "transport")]
pub use clock::VirtualClock;

#[cfg(feature = "client")]
pub use client::Initiator;

#[cfg(feature = "server")]
pub use server::Responder;
