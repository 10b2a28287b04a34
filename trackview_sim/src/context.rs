//! Simulation context implementing TrackingContext for deterministic runs.

use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use trackview_env::{TaskHandle, TrackingContext};

/// Simulation context backed by virtual time and a seeded RNG.
///
/// This implements `TrackingContext` using:
/// - A virtual clock that only moves when advanced
/// - A seeded ChaCha8 RNG for delivery jitter
/// - Simulated sleep that advances virtual time and yields
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,

    /// Deterministic RNG shared by every clone
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn clock(&self) -> MutexGuard<'_, u64> {
        self.virtual_time_ns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut time = self.clock();
        *time = time.saturating_add(duration.as_nanos() as u64);
    }

    /// Moves virtual time forward to `target`. Never moves it backwards.
    pub fn advance_to(&self, target: Duration) {
        let mut time = self.clock();
        *time = (*time).max(target.as_nanos() as u64);
    }

    /// Returns the current virtual time in milliseconds.
    pub fn time_ms(&self) -> u64 {
        *self.clock() / 1_000_000
    }

    /// Runs `f` with exclusive access to the simulation RNG.
    pub fn with_rng<R>(&self, f: impl FnOnce(&mut ChaCha8Rng) -> R) -> R {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            rng: Arc::clone(&self.rng),
        }
    }
}

#[async_trait]
impl TrackingContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(*self.clock())
    }

    async fn sleep(&self, duration: Duration) {
        // Virtual time jumps; the yield is the only suspension point
        self.advance_time(duration);
        tokio::task::yield_now().await;
    }

    fn spawn<F>(&self, name: &str, future: F) -> TaskHandle
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        TaskHandle::new(name, handle.abort_handle())
    }
}
