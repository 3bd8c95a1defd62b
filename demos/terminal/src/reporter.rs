//! Line-oriented reporter for a plain terminal.

use std::io::{self, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use clocksync::Reporter;

/// Prints progress lines to stdout, prefixed with the last displayed clock
/// value. Status changes are printed on their own line.
#[derive(Debug, Default)]
pub struct TerminalReporter {
    displayed_time: AtomicI64,
    status: Mutex<String>,
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn print(&self, text: &str) {
        let mut out = io::stdout().lock();
        // stdout going away is not worth tearing the protocol down for.
        let _ = writeln!(out, "{text}");
    }
}

impl Reporter for TerminalReporter {
    fn log_line(&self, line: &str) {
        let time = self.displayed_time.load(Ordering::Relaxed);
        self.print(&format!("[{time:>8}] {line}"));
    }

    fn log_blank_line(&self) {
        self.print("");
    }

    fn set_status(&self, status: &str) {
        let mut current = self.status.lock().unwrap_or_else(|e| e.into_inner());
        if *current != status {
            status.clone_into(&mut *current);
            self.print(&format!("== {status} =="));
        }
    }

    fn set_clock_display(&self, time: i64) {
        self.displayed_time.store(time, Ordering::Relaxed);
    }
}
