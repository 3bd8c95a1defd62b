//! Error types for clocksync.

use std::io;

use thiserror::Error;

/// Errors that can occur when decoding a wire message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The datagram carried no bytes.
    #[error("empty payload")]
    Empty,

    /// The payload is not valid UTF-8 text.
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    /// Structurally invalid message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// Errors in the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error (socket operations).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Inbound datagram could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Outbound message could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// The transport's background tasks have stopped.
    #[error("transport closed")]
    Closed,
}

/// Errors raised by the manual step gate.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StepError {
    /// A pause was requested while another one is still pending.
    #[error("a step waiter is already pending")]
    WaiterPending,

    /// The pending waiter was dropped without being resumed.
    #[error("step waiter cancelled")]
    Cancelled,
}

/// Recoverable protocol violations.
///
/// None of these stop a role; the run loops report and drop the message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A delay request arrived from a peer that never sent a discover.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// A message arrived before the state it depends on was recorded.
    #[error("{message} received before {expected}")]
    OutOfPhase {
        /// What had to happen first.
        expected: &'static str,
        /// Kind of the offending message.
        message: &'static str,
    },

    /// Timestamps carried by a message put the estimate outside the clock range.
    #[error("{message} timestamps overflow the clock range")]
    TimestampOverflow {
        /// Kind of the offending message.
        message: &'static str,
    },
}

/// Top-level clocksync errors.
#[derive(Debug, Error)]
pub enum ClockSyncError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Step gate error.
    #[error("step error: {0}")]
    Step(#[from] StepError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
