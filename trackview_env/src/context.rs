//! Execution context and display refresh abstractions.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The central interface for time and task scheduling.
///
/// Long-running loops (the animator's frame and step loops) are spawned
/// through the context so hosts decide which runtime they live on.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and `tokio::spawn`
/// - **Simulation**: `SimContext` - a manually advanced virtual clock
#[async_trait]
pub trait TrackingContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task and returns a handle that can cancel it.
    fn spawn<F>(&self, name: &str, future: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Cancellation handle for a task spawned through a [`TrackingContext`].
///
/// Dropping the handle does not cancel the task; call [`TaskHandle::abort`].
#[derive(Debug)]
pub struct TaskHandle {
    name: String,
    inner: tokio::task::AbortHandle,
}

impl TaskHandle {
    pub fn new(name: impl Into<String>, inner: tokio::task::AbortHandle) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }

    /// Cancels the task at its next suspension point.
    pub fn abort(&self) {
        self.inner.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Source of display refresh callbacks.
///
/// Each call resolves at the next refresh of the rendering surface and
/// yields that refresh's timestamp. The cadence is not assumed constant:
/// surfaces get throttled or backgrounded.
#[async_trait]
pub trait FrameClock: Send + Sync + 'static {
    async fn next_frame(&self) -> Duration;
}
