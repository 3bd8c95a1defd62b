//! Collaborator traits.
//!
//! The state machines never touch a terminal. Everything a user sees goes
//! through a [`Reporter`], which the embedding application implements.

use std::sync::atomic::{AtomicI64, Ordering};

/// Reporting surface the protocol roles write progress to.
///
/// Implementations are called from the clock ticker task as well as the role's
/// own loop, so they must be cheap and must not block.
pub trait Reporter: Send + Sync + 'static {
    /// Append a human-readable progress line.
    fn log_line(&self, text: &str);

    /// Append an empty separator line.
    fn log_blank_line(&self);

    /// Replace the status label (current protocol phase).
    fn set_status(&self, label: &str);

    /// Refresh the virtual clock display.
    ///
    /// Called on every [`CLOCK_DISPLAY_DECIMATION`](super::CLOCK_DISPLAY_DECIMATION)th
    /// tick and after every clock adjustment.
    fn set_clock_display(&self, time: i64);
}

/// A [`Reporter`] that forwards everything to `tracing`.
///
/// Progress lines are emitted at `info` with the last displayed clock value,
/// clock refreshes at `trace`.
#[derive(Debug, Default)]
pub struct TracingReporter {
    displayed_time: AtomicI64,
}

impl TracingReporter {
    /// Create a new tracing reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value passed to [`Reporter::set_clock_display`].
    pub fn displayed_time(&self) -> i64 {
        self.displayed_time.load(Ordering::Relaxed)
    }
}

impl Reporter for TracingReporter {
    fn log_line(&self, text: &str) {
        tracing::info!(time = self.displayed_time(), "{text}");
    }

    fn log_blank_line(&self) {}

    fn set_status(&self, label: &str) {
        tracing::info!(time = self.displayed_time(), status = label, "status changed");
    }

    fn set_clock_display(&self, time: i64) {
        self.displayed_time.store(time, Ordering::Relaxed);
        tracing::trace!(time, "clock");
    }
}
