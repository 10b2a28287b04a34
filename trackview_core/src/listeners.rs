//! Per-event listener sets with isolated fan-out.
//!
//! Listeners are shared function references. Membership is by pointer
//! identity, so registering the same `Arc` twice is a no-op and removing a
//! listener that was never added does nothing.

use crate::location::{LocationUpdate, Position};
use crate::types::Resolution;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::error;

/// A registered callback receiving values of type `T`.
pub type Listener<T> = Arc<dyn Fn(T) + Send + Sync>;

pub type LocationListener = Listener<LocationUpdate>;
pub type StatusListener = Listener<bool>;
pub type ResolutionListener = Listener<Resolution>;
pub type LocationUpdateIntervalListener = Listener<u64>;
pub type PositionListener = Listener<Position>;

/// An insertion-ordered set of listeners for one event kind.
pub struct ListenerSet<T> {
    kind: &'static str,
    members: Mutex<Vec<Listener<T>>>,
}

impl<T: Clone> ListenerSet<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            members: Mutex::new(Vec::new()),
        }
    }

    fn members(&self) -> MutexGuard<'_, Vec<Listener<T>>> {
        // Listeners never run under this lock, so poisoning carries no torn state.
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a listener. Returns false if it was already registered.
    pub fn add(&self, listener: Listener<T>) -> bool {
        let mut members = self.members();
        if members.iter().any(|m| Arc::ptr_eq(m, &listener)) {
            return false;
        }
        members.push(listener);
        true
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn remove(&self, listener: &Listener<T>) -> bool {
        let mut members = self.members();
        let before = members.len();
        members.retain(|m| !Arc::ptr_eq(m, listener));
        members.len() != before
    }

    pub fn contains(&self, listener: &Listener<T>) -> bool {
        self.members().iter().any(|m| Arc::ptr_eq(m, listener))
    }

    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members().is_empty()
    }

    pub fn clear(&self) {
        self.members().clear();
    }

    /// Delivers `value` to every listener registered at call time.
    ///
    /// The membership is snapshotted first: listeners may add or remove
    /// listeners from inside the callback. A panicking listener is logged
    /// and skipped. Returns the number of listeners that completed.
    pub fn dispatch(&self, value: &T) -> usize {
        let snapshot: Vec<Listener<T>> = self.members().clone();
        let mut delivered = 0;
        for listener in snapshot {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(value.clone())));
            match outcome {
                Ok(()) => delivered += 1,
                Err(_) => error!(kind = self.kind, "listener panicked during dispatch"),
            }
        }
        delivered
    }
}

/// The five listener sets of one tracked asset.
pub struct ListenerRegistry {
    pub enhanced_location: ListenerSet<LocationUpdate>,
    pub raw_location: ListenerSet<LocationUpdate>,
    pub status: ListenerSet<bool>,
    pub resolution: ListenerSet<Resolution>,
    pub location_update_interval: ListenerSet<u64>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            enhanced_location: ListenerSet::new("enhanced"),
            raw_location: ListenerSet::new("raw"),
            status: ListenerSet::new("status"),
            resolution: ListenerSet::new("resolution"),
            location_update_interval: ListenerSet::new("interval"),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub(crate) fn notify_status(&self, online: bool) {
        self.status.dispatch(&online);
    }

    /// Announces a publisher resolution and the interval derived from it.
    pub(crate) fn notify_publisher_resolution(&self, resolution: Resolution) {
        self.resolution.dispatch(&resolution);
        self.location_update_interval
            .dispatch(&resolution.desired_interval);
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
