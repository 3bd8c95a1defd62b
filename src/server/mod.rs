//! clocksync - Responder role
//!
//! The responder answers discovers from any number of initiators, keeping one
//! [`PeerSession`] per peer id, and serves as the time reference.

#[allow(clippy::module_inception)]
mod server;
mod session;

pub use server::*;
pub use session::*;
