//! Manual step-mode gate.
//!
//! In step mode a role pauses after each phase until the user signals it to
//! continue. [`StepGate`] is the resolvable handle behind that pause: the role
//! calls [`StepGate::wait`], the UI calls [`StepGate::signal`].
//!
//! Invariants:
//! - at most one waiter is pending at any time; a second `wait` fails with
//!   [`StepError::WaiterPending`] instead of replacing the first,
//! - a waiter is resolved exactly once and then cleared,
//! - a signal with no pending waiter is discarded, never buffered.

use std::sync::Mutex;

use tokio::sync::oneshot;

use super::error::StepError;

/// Suspend/resume handle shared between a protocol role and its UI.
#[derive(Debug, Default)]
pub struct StepGate {
    pending: Mutex<Option<oneshot::Sender<()>>>,
}

impl StepGate {
    /// Create a gate with no pending waiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend until the next [`signal`](Self::signal).
    pub async fn wait(&self) -> Result<(), StepError> {
        let rx = {
            let mut pending = self.lock();
            if pending.as_ref().is_some_and(|tx| !tx.is_closed()) {
                return Err(StepError::WaiterPending);
            }
            let (tx, rx) = oneshot::channel();
            *pending = Some(tx);
            rx
        };

        rx.await.map_err(|_| StepError::Cancelled)
    }

    /// Resume the pending waiter.
    ///
    /// Returns `true` if a waiter was resumed, `false` if the signal was
    /// discarded because nothing was waiting.
    pub fn signal(&self) -> bool {
        match self.lock().take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Check whether a waiter is currently suspended on this gate.
    pub fn is_waiting(&self) -> bool {
        self.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<()>>> {
        // The guarded value is a plain Option; a poisoned lock still holds a
        // consistent one.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
