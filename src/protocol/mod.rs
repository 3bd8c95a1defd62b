//! clocksync - Message protocol.
//!
//! The wire messages exchanged by the two roles and the offset/delay
//! arithmetic the initiator derives from their timestamps.
//!
//! ```text
//! Initiator                         Responder
//!     │ ── discover ──────────────────▶ │  register peer
//!     │ ◀───────────────────── sync ─── │  t1 = responder clock
//!  t2 │ ◀──────────── followup(t1) ──── │
//!  t3 │ ── delay_req ─────────────────▶ │  t4 = responder clock
//!     │ ◀───────── delay_reply(t4) ──── │
//!     │  offset = t1 - t2
//!     │  delay  = (offset - (t4 - t3)) / 2
//!     │  clock += offset - delay
//! ```

mod estimate;
mod message;

pub use estimate::*;
pub use message::*;
