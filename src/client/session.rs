//! Initiator-side session state.

use std::fmt;
use std::net::SocketAddr;

/// Where the initiator is in the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorPhase {
    /// No cycle in flight; the next step is a discover broadcast.
    Discover,
    /// Discover sent, waiting for the responder's sync.
    WaitSync,
    /// Sync received, waiting for the follow-up carrying its send time.
    WaitFollowUp,
    /// Delay request sent, waiting for the reply.
    WaitDelayReply,
}

impl fmt::Display for InitiatorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discover => "DISCOVER",
            Self::WaitSync => "WAIT_SYNC",
            Self::WaitFollowUp => "WAIT_FOLLOWUP",
            Self::WaitDelayReply => "WAIT_DELAY_REPLY",
        })
    }
}

/// The initiator's view of the exchange with its responder.
///
/// Timestamps and estimates are overwritten cycle by cycle; after a cycle
/// completes they hold the values that produced the last adjustment.
#[derive(Debug, Clone)]
pub struct InitiatorSession {
    /// Own peer id.
    pub peer_id: String,
    /// Responder address.
    pub server_addr: SocketAddr,
    /// A cycle is in progress; discover retries are suppressed while set.
    pub ready: bool,
    /// Own clock when the sync arrived.
    pub sync_time: Option<i64>,
    /// Own clock when the delay request was sent.
    pub delay_req_time: Option<i64>,
    /// Forward-leg offset of the current cycle.
    pub offset: Option<i64>,
    /// Delay estimate of the last completed cycle.
    pub delay: Option<f64>,
    /// Number of adjustments applied so far.
    pub completed_cycles: u64,
}

impl InitiatorSession {
    /// Create a session with no cycle in progress.
    pub fn new(peer_id: impl Into<String>, server_addr: SocketAddr) -> Self {
        Self {
            peer_id: peer_id.into(),
            server_addr,
            ready: false,
            sync_time: None,
            delay_req_time: None,
            offset: None,
            delay: None,
            completed_cycles: 0,
        }
    }
}
