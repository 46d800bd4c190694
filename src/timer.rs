//! Wall-clock timers handed out by communicators and the session.

use std::time::{Duration, Instant};

/// A restartable wall-clock stopwatch.
///
/// Elapsed time accumulates across `start`/`stop` pairs until the timer is
/// dropped.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    started: Option<Instant>,
    accumulated: Duration,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or resume) the timer. Has no effect if it is already running.
    pub fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now())
        }
    }

    /// Stop the timer, folding the running interval into the total.
    pub fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.accumulated += started.elapsed()
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// Total elapsed seconds, including the interval in progress.
    pub fn elapsed(&self) -> f64 {
        let running = self.started.map(|s| s.elapsed()).unwrap_or_default();
        (self.accumulated + running).as_secs_f64()
    }
}
