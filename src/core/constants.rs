//! Protocol constants.
//!
//! Both roles must agree on the coordination port and the responder id; the
//! timing values are the defaults used when a config does not override them.

use std::time::Duration;

// =============================================================================
// ADDRESSING
// =============================================================================

/// Well-known port the responder listens on.
pub const COORDINATION_PORT: u16 = 5555;

/// Peer id the responder stamps on every message it sends.
pub const RESPONDER_ID: &str = "server";

/// Receive buffer size for a single datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65535;

// =============================================================================
// VIRTUAL CLOCK
// =============================================================================

/// Real time between two clock ticks.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(10);

/// The clock display is refreshed on every Nth unit.
pub const CLOCK_DISPLAY_DECIMATION: i64 = 10;

// =============================================================================
// TIMING - INITIATOR
// =============================================================================

/// One-way latency injected by the initiator's transport.
pub const INITIATOR_LATENCY: Duration = Duration::from_millis(400);

/// Period between discover broadcasts while no sync has arrived.
pub const DISCOVER_RETRY_PERIOD: Duration = Duration::from_millis(7000);

// =============================================================================
// TIMING - RESPONDER
// =============================================================================

/// One-way latency injected by the responder's transport.
///
/// Deliberately much larger than [`INITIATOR_LATENCY`] so the two legs of the
/// exchange are asymmetric.
pub const RESPONDER_LATENCY: Duration = Duration::from_millis(1245);

/// Pause between a sync and its follow-up in automatic mode.
pub const FOLLOW_UP_DELAY: Duration = Duration::from_millis(2000);

// =============================================================================
// STATUS LABELS
// =============================================================================

/// Initiator status while broadcasting discovers.
pub const STATUS_DISCOVER: &str = "DISCOVER";

/// Responder status when idle.
pub const STATUS_SERVER: &str = "SERVER";

/// Prompt logged whenever a role pauses for a step signal.
pub const STEP_PROMPT: &str = "Press space to continue";
