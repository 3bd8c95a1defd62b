//! Virtual clock.
//!
//! Each role owns one [`VirtualClock`]: a logical counter advanced by a
//! fixed-period ticker task and corrected by absolute jumps when the
//! initiator applies its adjustment.

mod virtual_clock;

pub use virtual_clock::{ClockReader, VirtualClock};
