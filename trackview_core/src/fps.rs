//! Display refresh rate measurement.

use std::collections::VecDeque;
use std::time::Duration;

/// Counts display refreshes over a trailing window.
///
/// Until the first full window has been observed the monitor reports the
/// configured nominal rate, so the first animation steps after start-up are
/// not expanded into a single frame.
#[derive(Debug, Clone)]
pub struct FpsMonitor {
    window: Duration,
    nominal_fps: u32,
    samples: VecDeque<Duration>,
    first_sample: Option<Duration>,
}

impl FpsMonitor {
    pub fn new(window: Duration, nominal_fps: u32) -> Self {
        Self {
            window,
            nominal_fps,
            samples: VecDeque::new(),
            first_sample: None,
        }
    }

    /// Records a refresh at `timestamp` and drops samples outside the window.
    ///
    /// Timestamps are expected to be monotonic; an earlier timestamp is
    /// recorded but evicts nothing.
    pub fn record(&mut self, timestamp: Duration) {
        self.first_sample.get_or_insert(timestamp);
        self.samples.push_back(timestamp);

        if let Some(cutoff) = timestamp.checked_sub(self.window) {
            while self.samples.front().is_some_and(|t| *t <= cutoff) {
                self.samples.pop_front();
            }
        }
    }

    /// Refreshes per second over the trailing window.
    pub fn fps(&self) -> f64 {
        let (Some(first), Some(latest)) = (self.first_sample, self.samples.back()) else {
            return f64::from(self.nominal_fps);
        };
        if latest.saturating_sub(first) < self.window {
            return f64::from(self.nominal_fps);
        }
        self.samples.len() as f64 * (1000.0 / self.window.as_millis().max(1) as f64)
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.first_sample = None;
    }
}
