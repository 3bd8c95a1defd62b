//! Responder-side session management.
//!
//! One [`PeerSession`] per discovered initiator, keyed by peer id in a
//! [`SessionRegistry`]. A session is created by the first discover from an
//! id and reused by every later one; it lives for the responder's lifetime.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::SocketAddr;

/// Per-initiator session state.
#[derive(Debug, Clone)]
pub struct PeerSession {
    /// Peer id.
    id: String,

    /// Where replies are sent.
    addr: SocketAddr,

    /// Responder clock when the last sync was sent, until its follow-up goes out.
    sync_time: Option<i64>,

    /// Responder clock when the last delay request was handled.
    delay_req_time: Option<i64>,
}

impl PeerSession {
    /// Create a new session.
    pub fn new(id: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            id: id.into(),
            addr,
            sync_time: None,
            delay_req_time: None,
        }
    }

    /// Get the peer id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the peer address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the pending sync time, if a sync is awaiting its follow-up.
    pub fn sync_time(&self) -> Option<i64> {
        self.sync_time
    }

    /// Record the responder clock at which a sync was sent.
    ///
    /// Overwrites the time of a previous cycle whose follow-up never went out.
    pub fn record_sync(&mut self, time: i64) {
        self.sync_time = Some(time);
    }

    /// Consume the pending sync time for a follow-up.
    pub fn take_sync_time(&mut self) -> Option<i64> {
        self.sync_time.take()
    }

    /// Get the time the last delay request was handled.
    pub fn delay_req_time(&self) -> Option<i64> {
        self.delay_req_time
    }

    /// Record the responder clock at which a delay request was handled.
    pub fn record_delay_request(&mut self, time: i64) {
        self.delay_req_time = Some(time);
    }
}

/// Map from peer id to session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, PeerSession>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the session for `peer_id`, creating it at `addr` if absent.
    ///
    /// An existing session is returned as-is; its address is not replaced.
    /// The flag is `true` when the session was created by this call.
    pub fn register(&mut self, peer_id: &str, addr: SocketAddr) -> (&mut PeerSession, bool) {
        match self.sessions.entry(peer_id.to_owned()) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => (entry.insert(PeerSession::new(peer_id, addr)), true),
        }
    }

    /// Get a session by peer id.
    pub fn get(&self, peer_id: &str) -> Option<&PeerSession> {
        self.sessions.get(peer_id)
    }

    /// Get mutable access to a session by peer id.
    pub fn get_mut(&mut self, peer_id: &str) -> Option<&mut PeerSession> {
        self.sessions.get_mut(peer_id)
    }

    /// Check whether a session exists for `peer_id`.
    pub fn contains(&self, peer_id: &str) -> bool {
        self.sessions.contains_key(peer_id)
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no peer has been discovered yet.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Iterate over all sessions.
    pub fn iter(&self) -> impl Iterator<Item = &PeerSession> {
        self.sessions.values()
    }
}
