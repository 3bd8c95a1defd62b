//! Free-running logical clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::core::{CLOCK_DISPLAY_DECIMATION, DEFAULT_TICK_PERIOD, Reporter};

/// State shared between the clock handle and its ticker task.
struct ClockState {
    time: AtomicI64,
    reporter: Arc<dyn Reporter>,
}

impl ClockState {
    fn tick(&self) {
        let now = self.time.fetch_add(1, Ordering::AcqRel) + 1;
        if now.rem_euclid(CLOCK_DISPLAY_DECIMATION) == 0 {
            self.reporter.set_clock_display(now);
        }
    }
}

/// A logical clock advanced by one unit every tick period.
///
/// Time only moves forward through ticking; [`adjust`](Self::adjust) may move
/// it anywhere. The counter is only ever mutated by the ticker task and the
/// owning role's loop, both on the same runtime, so ticks and adjustments
/// never interleave inside a single update.
pub struct VirtualClock {
    state: Arc<ClockState>,
    tick_period: Duration,
    ticker: Option<JoinHandle<()>>,
}

impl VirtualClock {
    /// Create a stopped clock reading `start_time`.
    pub fn new(start_time: i64, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            state: Arc::new(ClockState {
                time: AtomicI64::new(start_time),
                reporter,
            }),
            tick_period: DEFAULT_TICK_PERIOD,
            ticker: None,
        }
    }

    /// Set the real time between two ticks. Takes effect on the next `start`.
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Start ticking.
    ///
    /// Does nothing if the clock is already running; call [`stop`](Self::stop)
    /// first to restart it. Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.is_running() {
            tracing::debug!("virtual clock already running");
            return;
        }

        let state = Arc::clone(&self.state);
        let period = self.tick_period;
        self.ticker = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                state.tick();
            }
        }));
    }

    /// Stop ticking. The current reading is kept.
    pub fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    /// Check if the ticker is running.
    pub fn is_running(&self) -> bool {
        self.ticker.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Advance the clock by a single unit.
    ///
    /// Every [`CLOCK_DISPLAY_DECIMATION`]th unit refreshes the clock display.
    pub fn tick(&self) {
        self.state.tick();
    }

    /// Get the current reading.
    pub fn time(&self) -> i64 {
        self.state.time.load(Ordering::Acquire)
    }

    /// Get a cheap read-only handle to this clock.
    pub fn reader(&self) -> ClockReader {
        ClockReader {
            state: Arc::clone(&self.state),
        }
    }

    /// Jump to `new_time`, forward or backward.
    pub fn adjust(&self, new_time: i64) {
        self.state.time.store(new_time, Ordering::Release);
        self.state.reporter.set_clock_display(new_time);
    }

    /// Set the reading back to zero.
    pub fn reset(&self) {
        self.state.time.store(0, Ordering::Release);
    }
}

impl std::fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualClock")
            .field("time", &self.time())
            .field("tick_period", &self.tick_period)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Read-only view of a [`VirtualClock`], usable after the clock's owner has
/// been moved into its run loop.
#[derive(Clone)]
pub struct ClockReader {
    state: Arc<ClockState>,
}

impl ClockReader {
    /// Get the current reading.
    pub fn time(&self) -> i64 {
        self.state.time.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ClockReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockReader").field("time", &self.time()).finish()
    }
}

impl Drop for VirtualClock {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct DisplayLog(Mutex<Vec<i64>>);

    impl Reporter for DisplayLog {
        fn log_line(&self, _text: &str) {}
        fn log_blank_line(&self) {}
        fn set_status(&self, _label: &str) {}
        fn set_clock_display(&self, time: i64) {
            self.0.lock().unwrap().push(time);
        }
    }

    #[test]
    fn test_tick_and_decimated_display() {
        let log = Arc::new(DisplayLog::default());
        let clock = VirtualClock::new(0, log.clone());

        for _ in 0..25 {
            clock.tick();
        }

        assert_eq!(clock.time(), 25);
        assert_eq!(*log.0.lock().unwrap(), vec![10, 20]);
    }

    #[test]
    fn test_adjust_moves_both_ways() {
        let log = Arc::new(DisplayLog::default());
        let clock = VirtualClock::new(1000, log);

        clock.adjust(5005);
        assert_eq!(clock.time(), 5005);

        clock.adjust(-3);
        assert_eq!(clock.time(), -3);

        // Display decimation is based on the value, negative included.
        clock.tick();
        clock.tick();
        clock.tick();
        assert_eq!(clock.time(), 0);

        clock.reset();
        assert_eq!(clock.time(), 0);
    }

    #[test]
    fn test_reader_follows_clock() {
        let clock = VirtualClock::new(7, Arc::new(DisplayLog::default()));
        let reader = clock.reader();
        clock.tick();
        assert_eq!(reader.time(), 8);
        clock.adjust(42);
        assert_eq!(reader.time(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_advances_with_virtual_time() {
        let log = Arc::new(DisplayLog::default());
        let mut clock = VirtualClock::new(100, log.clone());
        clock.start();
        assert!(clock.is_running());

        time::sleep(Duration::from_millis(105)).await;
        assert_eq!(clock.time(), 110);

        clock.stop();
        assert!(!clock.is_running());

        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(clock.time(), 110);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_single_ticker() {
        let log = Arc::new(DisplayLog::default());
        let mut clock = VirtualClock::new(0, log).with_tick_period(Duration::from_millis(5));
        clock.start();
        clock.start();

        time::sleep(Duration::from_millis(52)).await;
        assert_eq!(clock.time(), 10);
    }
}
