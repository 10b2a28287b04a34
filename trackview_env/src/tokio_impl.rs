//! Production implementations backed by Tokio.

use crate::context::{FrameClock, TaskHandle, TrackingContext};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Production context backed by the Tokio runtime.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F) -> TaskHandle
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        TaskHandle::new(name, handle.abort_handle())
    }
}

/// Frame clock ticking at a fixed nominal refresh rate.
///
/// Stands in for a compositor vsync callback when running headless. Missed
/// ticks are skipped rather than bursted, the way a busy display drops frames.
pub struct TokioFrameClock {
    start: Instant,
    interval: Mutex<Interval>,
}

impl TokioFrameClock {
    /// Creates a clock refreshing `refresh_hz` times per second.
    pub fn new(refresh_hz: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / refresh_hz.max(1) as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            start: Instant::now(),
            interval: Mutex::new(interval),
        }
    }

    pub fn shared(refresh_hz: u32) -> Arc<Self> {
        Arc::new(Self::new(refresh_hz))
    }
}

#[async_trait]
impl FrameClock for TokioFrameClock {
    async fn next_frame(&self) -> Duration {
        let tick = self.interval.lock().await.tick().await;
        tick.saturating_duration_since(self.start)
    }
}
