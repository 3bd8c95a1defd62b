//! Responder state machine.
//!
//! Handles one message at a time, with per-peer state held in the
//! [`SessionRegistry`]:
//!
//! - `discover` → register the peer, send `sync`, record the sync time, then
//!   send `followup` carrying it (after [`ResponderConfig::follow_up_delay`],
//!   or the next step signal in step mode),
//! - `delay_req` → record the receive time and answer with `delay_reply`,
//! - anything else is ignored.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};

use super::session::SessionRegistry;
use crate::clock::VirtualClock;
use crate::core::{
    COORDINATION_PORT, ClockSyncError, DEFAULT_TICK_PERIOD, FOLLOW_UP_DELAY, ProtocolError,
    RESPONDER_ID, RESPONDER_LATENCY, Reporter, STATUS_SERVER, STEP_PROMPT, StepGate,
    TransportError,
};
use crate::protocol::Message;
use crate::transport::{DatagramSocket, DelayedTransport, Delivery, UdpDatagramSocket};

/// Responder configuration.
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,

    /// Initial clock reading.
    pub start_time: i64,

    /// Pause for a step signal before every reply.
    pub step_mode: bool,

    /// One-way latency injected in each direction.
    pub latency: Duration,

    /// Real time between two clock ticks.
    pub tick_period: Duration,

    /// Pause between a sync and its follow-up (automatic mode only).
    pub follow_up_delay: Duration,

    /// Peer id stamped on every outgoing message.
    pub server_id: String,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], COORDINATION_PORT)),
            start_time: 0,
            step_mode: false,
            latency: RESPONDER_LATENCY,
            tick_period: DEFAULT_TICK_PERIOD,
            follow_up_delay: FOLLOW_UP_DELAY,
            server_id: RESPONDER_ID.to_owned(),
        }
    }
}

/// Builder for creating a [`ResponderConfig`].
#[derive(Debug, Default)]
pub struct ResponderBuilder {
    config: ResponderConfig,
}

impl ResponderBuilder {
    /// Create a new responder builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set the initial clock reading.
    pub fn start_time(mut self, time: i64) -> Self {
        self.config.start_time = time;
        self
    }

    /// Enable or disable manual step mode.
    pub fn step_mode(mut self, enabled: bool) -> Self {
        self.config.step_mode = enabled;
        self
    }

    /// Set the one-way latency.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.config.latency = latency;
        self
    }

    /// Set the clock tick period.
    pub fn tick_period(mut self, period: Duration) -> Self {
        self.config.tick_period = period;
        self
    }

    /// Set the sync to follow-up delay.
    pub fn follow_up_delay(mut self, delay: Duration) -> Self {
        self.config.follow_up_delay = delay;
        self
    }

    /// Set the responder's peer id.
    pub fn server_id(mut self, id: impl Into<String>) -> Self {
        self.config.server_id = id.into();
        self
    }

    /// Build the responder configuration.
    pub fn build(self) -> ResponderConfig {
        self.config
    }
}

/// A follow-up waiting for its delay to elapse.
#[derive(Debug)]
struct ScheduledFollowUp {
    due: Instant,
    peer_id: String,
}

/// The responder role.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use clocksync::core::TracingReporter;
/// use clocksync::server::{Responder, ResponderBuilder};
///
/// let config = ResponderBuilder::new().step_mode(false).build();
/// let responder = Responder::bind(config, Arc::new(TracingReporter::new())).await?;
/// responder.run().await?;
/// ```
pub struct Responder {
    config: ResponderConfig,
    clock: VirtualClock,
    transport: DelayedTransport,
    reporter: Arc<dyn Reporter>,
    gate: Arc<StepGate>,
    sessions: SessionRegistry,
    follow_ups: VecDeque<ScheduledFollowUp>,
}

impl Responder {
    /// Bind a UDP socket at `config.bind_addr` and create the responder.
    pub async fn bind(
        config: ResponderConfig,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, ClockSyncError> {
        let socket = UdpDatagramSocket::bind(config.bind_addr).await?;
        Self::with_socket(config, Arc::new(socket), reporter)
    }

    /// Create the responder over an existing socket.
    pub fn with_socket(
        config: ResponderConfig,
        socket: Arc<dyn DatagramSocket>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, ClockSyncError> {
        if config.server_id.is_empty() {
            return Err(ClockSyncError::Config("server id must not be empty".into()));
        }

        let clock = VirtualClock::new(config.start_time, Arc::clone(&reporter))
            .with_tick_period(config.tick_period);
        let transport = DelayedTransport::new(socket, config.latency)?;

        reporter.set_status(STATUS_SERVER);

        Ok(Self {
            config,
            clock,
            transport,
            reporter,
            gate: Arc::new(StepGate::new()),
            sessions: SessionRegistry::new(),
            follow_ups: VecDeque::new(),
        })
    }

    /// Get the responder configuration.
    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    /// Get the responder's clock.
    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    /// Get the session registry.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Get the step gate the UI signals to continue in step mode.
    pub fn step_gate(&self) -> Arc<StepGate> {
        Arc::clone(&self.gate)
    }

    /// Get the local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Start the clock and serve until the transport fails.
    ///
    /// Malformed datagrams and recoverable protocol errors are reported and
    /// dropped; only transport and step gate failures end the loop.
    pub async fn run(mut self) -> Result<(), ClockSyncError> {
        self.clock.start();
        tracing::info!(addr = %self.local_addr(), step_mode = self.config.step_mode, "responder running");

        loop {
            let follow_up_due = self.follow_ups.front().map(|f| f.due);

            tokio::select! {
                received = self.transport.recv() => match received {
                    Ok(Delivery { message, from }) => {
                        match self.handle_message(message, from).await {
                            Err(ClockSyncError::Protocol(e)) => self.report_dropped(&e),
                            other => other?,
                        }
                    }
                    Err(TransportError::Decode(e)) => {
                        tracing::warn!(error = %e, "dropping malformed datagram");
                        self.reporter.log_line(&format!("Dropped malformed datagram: {e}"));
                    }
                    Err(e) => return Err(e.into()),
                },
                _ = time::sleep_until(follow_up_due.unwrap_or_else(Instant::now)), if follow_up_due.is_some() => {
                    if let Some(follow_up) = self.follow_ups.pop_front() {
                        if let Err(e) = self.send_follow_up(&follow_up.peer_id) {
                            match e {
                                ClockSyncError::Protocol(e) => self.report_dropped(&e),
                                e => return Err(e),
                            }
                        }
                    }
                }
            }
        }
    }

    /// Handle one received message.
    ///
    /// In step mode this suspends on the step gate before each reply.
    pub async fn handle_message(
        &mut self,
        message: Message,
        from: SocketAddr,
    ) -> Result<(), ClockSyncError> {
        match message {
            Message::Discover { peer_id } => self.on_discover(peer_id, from).await,
            Message::DelayRequest { peer_id } => self.on_delay_request(&peer_id).await,
            other => {
                tracing::debug!(kind = other.kind(), %from, "ignoring message");
                Ok(())
            }
        }
    }

    async fn on_discover(&mut self, peer_id: String, from: SocketAddr) -> Result<(), ClockSyncError> {
        let (_, created) = self.sessions.register(&peer_id, from);
        if created {
            tracing::info!(peer = %peer_id, %from, "new peer session");
        }

        self.reporter.log_line(&format!("Received DISCOVER message from {peer_id}"));
        self.reporter.log_blank_line();

        if self.config.step_mode {
            self.pause().await?;
        }

        self.send_sync(&peer_id)?;

        if self.config.step_mode {
            self.pause().await?;
            self.send_follow_up(&peer_id)?;
        } else {
            self.follow_ups.push_back(ScheduledFollowUp {
                due: Instant::now() + self.config.follow_up_delay,
                peer_id,
            });
        }

        Ok(())
    }

    fn send_sync(&mut self, peer_id: &str) -> Result<(), ClockSyncError> {
        let session = self
            .sessions
            .get_mut(peer_id)
            .ok_or_else(|| ProtocolError::UnknownPeer(peer_id.to_owned()))?;

        self.transport
            .send(&Message::sync(&self.config.server_id), session.addr())?;

        let sync_time = self.clock.time();
        session.record_sync(sync_time);

        self.reporter.set_status(&format!("SYNC ({sync_time}) ({peer_id})"));
        self.reporter.log_line(&format!("Sending SYNC message to {peer_id}"));
        self.reporter.log_blank_line();

        Ok(())
    }

    fn send_follow_up(&mut self, peer_id: &str) -> Result<(), ClockSyncError> {
        let session = self
            .sessions
            .get_mut(peer_id)
            .ok_or_else(|| ProtocolError::UnknownPeer(peer_id.to_owned()))?;
        let sync_time = session.take_sync_time().ok_or(ProtocolError::OutOfPhase {
            expected: "sync",
            message: "followup",
        })?;

        self.reporter
            .log_line(&format!("Sending FOLLOW_UP ({sync_time}) message to {peer_id}"));
        self.reporter.log_blank_line();
        self.reporter.set_status(&format!("FOLLOW_UP ({sync_time}) ({peer_id})"));

        self.transport.send(
            &Message::follow_up(&self.config.server_id, sync_time),
            session.addr(),
        )?;

        Ok(())
    }

    async fn on_delay_request(&mut self, peer_id: &str) -> Result<(), ClockSyncError> {
        let time = self.clock.time();
        let session = self
            .sessions
            .get_mut(peer_id)
            .ok_or_else(|| ProtocolError::UnknownPeer(peer_id.to_owned()))?;
        session.record_delay_request(time);
        let addr = session.addr();

        self.reporter.log_line(&format!("Received DELAY_REQ message from {peer_id}"));

        if self.config.step_mode {
            self.pause().await?;
        }

        self.reporter
            .log_line(&format!("Sending DELAY_RESP ({time}) message to {peer_id}"));
        self.reporter.log_blank_line();
        self.reporter.set_status(&format!("DELAY_RESP ({time}) ({peer_id})"));

        self.transport
            .send(&Message::delay_reply(&self.config.server_id, time), addr)?;

        Ok(())
    }

    async fn pause(&self) -> Result<(), ClockSyncError> {
        self.reporter.log_line(STEP_PROMPT);
        self.gate.wait().await?;
        Ok(())
    }

    fn report_dropped(&self, error: &ProtocolError) {
        tracing::warn!(%error, "ignoring message");
        self.reporter.log_line(&format!("Ignored message: {error}"));
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("sessions", &self.sessions.len())
            .field("pending_follow_ups", &self.follow_ups.len())
            .finish()
    }
}
