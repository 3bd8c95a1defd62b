//! Initiator state machine.
//!
//! Drives the five-phase exchange from the initiating side:
//!
//! ```text
//! DISCOVER ──sync──▶ WAIT_FOLLOWUP ──followup──▶ WAIT_DELAY_REPLY ──delay_reply──▶ adjust
//!    ▲  (retry every discover_retry until a sync arrives)                            │
//!    └─────────────────────── automatic mode: restart immediately ───────────────────┘
//! ```
//!
//! In step mode the initiator pauses on its [`StepGate`] before sending the
//! delay request and again after adjusting, and never retries discovers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};

use super::session::{InitiatorPhase, InitiatorSession};
use crate::clock::VirtualClock;
use crate::core::{
    COORDINATION_PORT, ClockSyncError, DEFAULT_TICK_PERIOD, DISCOVER_RETRY_PERIOD,
    INITIATOR_LATENCY, ProtocolError, Reporter, STATUS_DISCOVER, STEP_PROMPT, StepGate,
    TransportError,
};
use crate::protocol::{Message, SyncEstimate, sync_offset};
use crate::transport::{DatagramSocket, DelayedTransport, Delivery, UdpDatagramSocket};

/// Initiator configuration.
#[derive(Debug, Clone)]
pub struct InitiatorConfig {
    /// Own peer id.
    pub peer_id: String,

    /// Responder address (its coordination port).
    pub server_addr: SocketAddr,

    /// Local address to bind to.
    pub bind_addr: SocketAddr,

    /// Initial clock reading.
    pub start_time: i64,

    /// Pause for a step signal between phases.
    pub step_mode: bool,

    /// One-way latency injected in each direction.
    pub latency: Duration,

    /// Real time between two clock ticks.
    pub tick_period: Duration,

    /// Period between discover broadcasts (automatic mode only).
    pub discover_retry: Duration,
}

impl Default for InitiatorConfig {
    fn default() -> Self {
        Self {
            peer_id: "client".to_owned(),
            server_addr: SocketAddr::from(([127, 0, 0, 1], COORDINATION_PORT)),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            start_time: 0,
            step_mode: false,
            latency: INITIATOR_LATENCY,
            tick_period: DEFAULT_TICK_PERIOD,
            discover_retry: DISCOVER_RETRY_PERIOD,
        }
    }
}

/// Builder for creating an [`InitiatorConfig`].
#[derive(Debug, Default)]
pub struct InitiatorBuilder {
    config: InitiatorConfig,
}

impl InitiatorBuilder {
    /// Create a new initiator builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the peer id.
    pub fn peer_id(mut self, id: impl Into<String>) -> Self {
        self.config.peer_id = id.into();
        self
    }

    /// Set the responder address.
    pub fn server_addr(mut self, addr: SocketAddr) -> Self {
        self.config.server_addr = addr;
        self
    }

    /// Set the local bind address.
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

    /// Set the discover retry period.
    pub fn discover_retry(mut self, period: Duration) -> Self {
        self.config.discover_retry = period;
        self
    }

    /// Build the initiator configuration.
    pub fn build(self) -> InitiatorConfig {
        self.config
    }
}

/// The initiator role.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use clocksync::client::{Initiator, InitiatorBuilder};
/// use clocksync::core::TracingReporter;
///
/// let config = InitiatorBuilder::new()
///     .peer_id("alice")
///     .server_addr("192.168.1.10:5555".parse()?)
///     .start_time(1000)
///     .build();
///
/// let initiator = Initiator::bind(config, Arc::new(TracingReporter::new())).await?;
/// initiator.run().await?;
/// ```
pub struct Initiator {
    config: InitiatorConfig,
    clock: VirtualClock,
    transport: DelayedTransport,
    reporter: Arc<dyn Reporter>,
    gate: Arc<StepGate>,
    session: InitiatorSession,
    phase: InitiatorPhase,
    next_discover: Option<Instant>,
}

impl Initiator {
    /// Bind a UDP socket at `config.bind_addr` and create the initiator.
    pub async fn bind(
        config: InitiatorConfig,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, ClockSyncError> {
        let socket = UdpDatagramSocket::bind(config.bind_addr).await?;
        Self::with_socket(config, Arc::new(socket), reporter)
    }

    /// Create the initiator over an existing socket.
    pub fn with_socket(
        config: InitiatorConfig,
        socket: Arc<dyn DatagramSocket>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, ClockSyncError> {
        if config.peer_id.is_empty() {
            return Err(ClockSyncError::Config("peer id must not be empty".into()));
        }

        let clock = VirtualClock::new(config.start_time, Arc::clone(&reporter))
            .with_tick_period(config.tick_period);
        let transport = DelayedTransport::new(socket, config.latency)?;
        let session = InitiatorSession::new(config.peer_id.clone(), config.server_addr);

        reporter.set_status(STATUS_DISCOVER);

        Ok(Self {
            config,
            clock,
            transport,
            reporter,
            gate: Arc::new(StepGate::new()),
            session,
            phase: InitiatorPhase::Discover,
            next_discover: None,
        })
    }

    /// Get the initiator configuration.
    pub fn config(&self) -> &InitiatorConfig {
        &self.config
    }

    /// Get the initiator's clock.
    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    /// Get the session state.
    pub fn session(&self) -> &InitiatorSession {
        &self.session
    }

    /// Get the current phase.
    pub fn phase(&self) -> InitiatorPhase {
        self.phase
    }

    /// Get the step gate the UI signals to continue in step mode.
    pub fn step_gate(&self) -> Arc<StepGate> {
        Arc::clone(&self.gate)
    }

    /// Get the local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Start the clock, broadcast the first discover, and run cycles until
    /// the transport fails.
    ///
    /// Malformed datagrams and out-of-phase messages are reported and dropped.
    pub async fn run(mut self) -> Result<(), ClockSyncError> {
        self.clock.start();
        tracing::info!(
            peer = %self.config.peer_id,
            server = %self.config.server_addr,
            step_mode = self.config.step_mode,
            "initiator running"
        );
        self.send_discover()?;

        loop {
            let retry_due = self.next_discover;

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
                _ = time::sleep_until(retry_due.unwrap_or_else(Instant::now)), if retry_due.is_some() => {
                    self.on_discover_retry()?;
                }
            }
        }
    }

    /// Broadcast a discover to the responder.
    ///
    /// Suppressed while a cycle is in progress. Outside step mode this also
    /// arms the retry deadline, replacing any earlier one.
    pub fn send_discover(&mut self) -> Result<(), ClockSyncError> {
        if self.session.ready {
            return Ok(());
        }

        self.transport
            .send(&Message::discover(&self.config.peer_id), self.config.server_addr)?;
        self.phase = InitiatorPhase::WaitSync;

        self.reporter.log_line("Sent DISCOVER message to responder");
        self.reporter.log_blank_line();
        self.reporter.set_status(STATUS_DISCOVER);

        if !self.config.step_mode {
            self.next_discover = Some(Instant::now() + self.config.discover_retry);
        }

        Ok(())
    }

    /// Handle one received message.
    ///
    /// In step mode this suspends on the step gate between phases.
    pub async fn handle_message(
        &mut self,
        message: Message,
        from: SocketAddr,
    ) -> Result<(), ClockSyncError> {
        match message {
            Message::Sync { .. } => {
                self.on_sync();
                Ok(())
            }
            Message::FollowUp {
                master_sync_time, ..
            } => self.on_follow_up(master_sync_time).await,
            Message::DelayReply { req_time, .. } => self.on_delay_reply(req_time).await,
            other => {
                tracing::debug!(kind = other.kind(), %from, "ignoring message");
                Ok(())
            }
        }
    }

    /// The retry deadline fired. The deadline is not cancelled when a cycle
    /// starts; the ready flag is checked here instead.
    fn on_discover_retry(&mut self) -> Result<(), ClockSyncError> {
        self.next_discover = None;
        if self.session.ready {
            tracing::debug!("discover retry suppressed, cycle in progress");
            return Ok(());
        }
        self.send_discover()
    }

    fn on_sync(&mut self) {
        let sync_time = self.clock.time();
        self.session.ready = true;
        self.session.sync_time = Some(sync_time);
        self.phase = InitiatorPhase::WaitFollowUp;

        self.reporter.log_line("Received SYNC message from responder");
        self.reporter.log_blank_line();
        self.reporter.set_status(&format!("SYNC ({sync_time})"));
    }

    async fn on_follow_up(&mut self, master_sync_time: i64) -> Result<(), ClockSyncError> {
        let sync_time = match (self.phase, self.session.sync_time) {
            (InitiatorPhase::WaitFollowUp, Some(sync_time)) => sync_time,
            _ => {
                return Err(ProtocolError::OutOfPhase {
                    expected: "sync",
                    message: "followup",
                }
                .into());
            }
        };

        let offset = sync_offset(master_sync_time, sync_time)?;
        self.session.offset = Some(offset);

        self.reporter.log_line("Received FOLLOW_UP message from responder");
        self.reporter.log_line(&format!(
            "Responder SYNC time: {master_sync_time}. My SYNC time was {sync_time}"
        ));
        self.reporter
            .log_line(&format!("Offset is {master_sync_time} - {sync_time} = {offset}"));
        self.reporter.log_blank_line();

        if self.config.step_mode {
            self.pause().await?;
        }

        self.send_delay_request()
    }

    fn send_delay_request(&mut self) -> Result<(), ClockSyncError> {
        self.reporter.log_line("Sending DELAY_REQ message to responder");
        self.reporter.log_blank_line();

        let delay_req_time = self.clock.time();
        self.session.delay_req_time = Some(delay_req_time);
        self.reporter.set_status(&format!("DELAY_REQ ({delay_req_time})"));

        self.transport.send(
            &Message::delay_request(&self.config.peer_id),
            self.config.server_addr,
        )?;
        self.phase = InitiatorPhase::WaitDelayReply;

        Ok(())
    }

    async fn on_delay_reply(&mut self, req_time: i64) -> Result<(), ClockSyncError> {
        let (offset, delay_req_time) = match (
            self.phase,
            self.session.offset,
            self.session.delay_req_time,
        ) {
            (InitiatorPhase::WaitDelayReply, Some(offset), Some(delay_req_time)) => {
                (offset, delay_req_time)
            }
            _ => {
                return Err(ProtocolError::OutOfPhase {
                    expected: "delay_req",
                    message: "delay_reply",
                }
                .into());
            }
        };

        let estimate = SyncEstimate::from_exchange(offset, req_time, delay_req_time)?;
        let before = self.clock.time();
        let after = before
            .checked_add(estimate.clock_step())
            .ok_or(ProtocolError::TimestampOverflow {
                message: "delay_reply",
            })?;
        self.session.delay = Some(estimate.delay);

        self.reporter.log_line("Received DELAY_RESP message from responder");
        self.reporter
            .log_line(&format!("Responder DELAY_REQ time: {req_time}"));
        self.reporter.log_line(&format!(
            "Delay is: ({offset} - ({req_time} - {delay_req_time})) / 2 = {}",
            estimate.delay
        ));
        self.reporter.log_blank_line();
        self.reporter.log_line(&format!(
            "Total offset is {offset} - {} = {}",
            estimate.delay, estimate.adjustment
        ));
        self.reporter.log_line(&format!(
            "Adjusting from {before} by {} to {after}",
            estimate.adjustment
        ));
        self.reporter.log_blank_line();

        self.clock.adjust(after);
        self.session.completed_cycles += 1;
        self.phase = InitiatorPhase::Discover;
        self.reporter.set_status(&format!("ADJUSTED ({after})"));
        tracing::info!(
            offset,
            delay = estimate.delay,
            adjustment = estimate.adjustment,
            before,
            after,
            "clock adjusted"
        );

        self.session.ready = false;
        if self.config.step_mode {
            // The cycle ends here; only a step signal starts the next one.
            self.pause().await?;
        }
        self.send_discover()
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

impl std::fmt::Debug for Initiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initiator")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("phase", &self.phase)
            .field("session", &self.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingReporter;
    use crate::transport::{MemoryNetwork, MemorySocket};

    const SERVER: &str = "10.0.0.1:5555";

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn config(step_mode: bool) -> InitiatorConfig {
        InitiatorBuilder::new()
            .peer_id("alice")
            .server_addr(addr(SERVER))
            .latency(Duration::ZERO)
            .step_mode(step_mode)
            .build()
    }

    fn initiator(
        network: &MemoryNetwork,
        config: InitiatorConfig,
    ) -> (Initiator, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        let socket = Arc::new(network.bind(addr("10.0.0.2:0")).unwrap());
        let initiator = Initiator::with_socket(config, socket, reporter.clone()).unwrap();
        (initiator, reporter)
    }

    async fn recv_message(socket: &MemorySocket) -> Message {
        let mut buf = [0u8; 512];
        let (len, _) = socket.recv_from(&mut buf).await.unwrap();
        Message::decode(&buf[..len]).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = InitiatorConfig::default();
        assert_eq!(config.server_addr.port(), COORDINATION_PORT);
        assert_eq!(config.latency, Duration::from_millis(400));
        assert_eq!(config.discover_retry, Duration::from_millis(7000));
        assert_eq!(config.tick_period, Duration::from_millis(10));
        assert!(!config.step_mode);
    }

    #[tokio::test]
    async fn test_empty_peer_id_is_rejected() {
        let network = MemoryNetwork::new();
        let socket = Arc::new(network.bind(addr("10.0.0.2:0")).unwrap());
        let config = InitiatorBuilder::new().peer_id("").build();
        let result = Initiator::with_socket(config, socket, Arc::new(RecordingReporter::default()));
        assert!(matches!(result, Err(ClockSyncError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reference_exchange() {
        let network = MemoryNetwork::new();
        let server = network.bind(addr(SERVER)).unwrap();
        let (mut init, reporter) = initiator(&network, config(false));

        init.clock().adjust(1000);
        init.send_discover().unwrap();
        assert_eq!(recv_message(&server).await, Message::discover("alice"));
        assert_eq!(init.phase(), InitiatorPhase::WaitSync);

        init.clock().adjust(1010);
        init.handle_message(Message::sync("server"), addr(SERVER))
            .await
            .unwrap();
        assert_eq!(init.session().sync_time, Some(1010));
        assert!(init.session().ready);
        assert_eq!(init.phase(), InitiatorPhase::WaitFollowUp);

        init.clock().adjust(1030);
        init.handle_message(Message::follow_up("server", 5000), addr(SERVER))
            .await
            .unwrap();
        assert_eq!(init.session().offset, Some(3990));
        assert_eq!(init.session().delay_req_time, Some(1030));
        assert_eq!(recv_message(&server).await, Message::delay_request("alice"));

        init.clock().adjust(1100);
        init.handle_message(Message::delay_reply("server", 5050), addr(SERVER))
            .await
            .unwrap();
        assert_eq!(init.session().delay, Some(-15.0));
        assert_eq!(init.clock().time(), 1100 + 4005);
        assert_eq!(init.session().completed_cycles, 1);
        assert!(reporter.has_line_containing("Delay is: (3990 - (5050 - 1030)) / 2 = -15"));
        assert!(reporter.has_line_containing("Adjusting from 1100 by 4005 to 5105"));

        // Automatic mode restarts immediately.
        assert!(!init.session().ready);
        assert_eq!(init.phase(), InitiatorPhase::WaitSync);
        assert_eq!(recv_message(&server).await, Message::discover("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_up_before_sync_is_out_of_phase() {
        let network = MemoryNetwork::new();
        let _server = network.bind(addr(SERVER)).unwrap();
        let (mut init, _) = initiator(&network, config(false));

        let result = init
            .handle_message(Message::follow_up("server", 5000), addr(SERVER))
            .await;
        assert!(matches!(
            result,
            Err(ClockSyncError::Protocol(ProtocolError::OutOfPhase { .. }))
        ));
        assert!(init.session().offset.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_reply_without_request_is_out_of_phase() {
        let network = MemoryNetwork::new();
        let _server = network.bind(addr(SERVER)).unwrap();
        let (mut init, _) = initiator(&network, config(false));
        init.clock().adjust(700);

        let result = init
            .handle_message(Message::delay_reply("server", 5050), addr(SERVER))
            .await;
        assert!(result.is_err());
        assert_eq!(init.clock().time(), 700);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflowing_follow_up_is_rejected() {
        let network = MemoryNetwork::new();
        let server = network.bind(addr(SERVER)).unwrap();
        let (mut init, _) = initiator(&network, config(false));

        init.send_discover().unwrap();
        recv_message(&server).await;
        init.clock().adjust(1);
        init.handle_message(Message::sync("server"), addr(SERVER))
            .await
            .unwrap();

        let result = init
            .handle_message(Message::follow_up("server", i64::MIN), addr(SERVER))
            .await;
        assert!(matches!(
            result,
            Err(ClockSyncError::Protocol(ProtocolError::TimestampOverflow { .. }))
        ));
        assert!(init.session().offset.is_none());
        assert_eq!(init.phase(), InitiatorPhase::WaitFollowUp);

        // A sane follow-up for the same sync still completes the phase.
        init.handle_message(Message::follow_up("server", 5000), addr(SERVER))
            .await
            .unwrap();
        assert_eq!(init.session().offset, Some(4999));
        assert_eq!(recv_message(&server).await, Message::delay_request("alice"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflowing_delay_reply_leaves_clock_alone() {
        let network = MemoryNetwork::new();
        let server = network.bind(addr(SERVER)).unwrap();
        let (mut init, _) = initiator(&network, config(false));

        init.send_discover().unwrap();
        recv_message(&server).await;
        init.handle_message(Message::sync("server"), addr(SERVER))
            .await
            .unwrap();
        init.handle_message(Message::follow_up("server", i64::MAX), addr(SERVER))
            .await
            .unwrap();
        recv_message(&server).await;
        init.clock().adjust(1);

        // The last reply fits the estimate but not the adjusted clock.
        for req_time in [-1, i64::MIN, i64::MAX] {
            let result = init
                .handle_message(Message::delay_reply("server", req_time), addr(SERVER))
                .await;
            assert!(matches!(
                result,
                Err(ClockSyncError::Protocol(ProtocolError::TimestampOverflow { .. }))
            ));
        }
        assert_eq!(init.clock().time(), 1);
        assert!(init.session().delay.is_none());
        assert_eq!(init.session().completed_cycles, 0);
        assert_eq!(init.phase(), InitiatorPhase::WaitDelayReply);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_messages_are_ignored() {
        let network = MemoryNetwork::new();
        let _server = network.bind(addr(SERVER)).unwrap();
        let (mut init, _) = initiator(&network, config(false));

        init.handle_message(Message::Unknown, addr(SERVER)).await.unwrap();
        init.handle_message(Message::discover("bob"), addr(SERVER))
            .await
            .unwrap();
        assert_eq!(init.phase(), InitiatorPhase::Discover);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_is_suppressed_once_ready() {
        let network = MemoryNetwork::new();
        let server = network.bind(addr(SERVER)).unwrap();
        let (mut init, _) = initiator(&network, config(false));

        init.send_discover().unwrap();
        assert!(init.next_discover.is_some());
        recv_message(&server).await;

        init.handle_message(Message::sync("server"), addr(SERVER))
            .await
            .unwrap();

        // The deadline still fires once, but sends nothing.
        init.on_discover_retry().unwrap();
        assert!(init.next_discover.is_none());

        let nothing = time::timeout(Duration::from_secs(30), recv_message(&server)).await;
        assert!(nothing.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_rebroadcasts_until_sync() {
        let network = MemoryNetwork::new();
        let server = network.bind(addr(SERVER)).unwrap();
        let (init, _) = initiator(&network, config(false));
        let task = tokio::spawn(init.run());

        let start = Instant::now();
        for expected in [0u64, 7000, 14000] {
            assert_eq!(recv_message(&server).await, Message::discover("alice"));
            let elapsed = start.elapsed().as_millis() as u64;
            assert!(elapsed >= expected && elapsed < expected + 5, "discover at {elapsed}ms");
        }

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_mode_waits_before_delay_request() {
        let network = MemoryNetwork::new();
        let server = network.bind(addr(SERVER)).unwrap();
        let (mut init, reporter) = initiator(&network, config(true));
        let gate = init.step_gate();

        init.send_discover().unwrap();
        assert!(init.next_discover.is_none());
        recv_message(&server).await;

        init.handle_message(Message::sync("server"), addr(SERVER))
            .await
            .unwrap();

        let signaller = async {
            while !gate.is_waiting() {
                tokio::task::yield_now().await;
            }
            // Nothing may be sent while paused.
            let early = time::timeout(Duration::from_secs(10), recv_message(&server)).await;
            assert!(early.is_err());
            assert!(gate.signal());
        };
        let (handled, ()) = tokio::join!(
            init.handle_message(Message::follow_up("server", 5000), addr(SERVER)),
            signaller
        );
        handled.unwrap();

        assert!(reporter.has_line_containing(STEP_PROMPT));
        assert_eq!(recv_message(&server).await, Message::delay_request("alice"));
        assert_eq!(init.phase(), InitiatorPhase::WaitDelayReply);
    }
}
