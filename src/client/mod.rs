//! clocksync - Initiator role
//!
//! The initiator starts each synchronization cycle and corrects its own clock
//! once the exchange completes.

#[allow(clippy::module_inception)]
mod client;
mod session;

pub use client::*;
pub use session::*;
