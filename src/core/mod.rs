//! clocksync - Core types, collaborator traits, and constants.
//!
//! This module has no runtime dependencies. It defines the error taxonomy,
//! the [`Reporter`] surface the state machines report progress through, and
//! the protocol constants both roles agree on.

mod constants;
mod error;
#[cfg(feature = "transport")]
mod step;
mod traits;

pub use constants::*;
pub use error::*;
#[cfg(feature = "transport")]
pub use step::*;
pub use traits::*;
