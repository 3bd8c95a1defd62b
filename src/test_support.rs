//! Shared helpers for unit tests.

use std::sync::Mutex;

use crate::core::Reporter;

/// Reporter that records every call.
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    lines: Mutex<Vec<String>>,
    statuses: Mutex<Vec<String>>,
}

impl RecordingReporter {
    /// Non-blank progress lines, in order.
    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub(crate) fn last_status(&self) -> Option<String> {
        self.statuses.lock().unwrap().last().cloned()
    }

    pub(crate) fn has_line_containing(&self, needle: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l.contains(needle))
    }
}

impl Reporter for RecordingReporter {
    fn log_line(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_owned());
    }

    fn log_blank_line(&self) {}

    fn set_status(&self, label: &str) {
        self.statuses.lock().unwrap().push(label.to_owned());
    }

    fn set_clock_display(&self, _time: i64) {}
}
