//! TrackView Core - Asset tracking subscriber
//!
//! This library follows publishers of live asset locations:
//! 1. **Sessions**: one realtime channel per tracked asset, presence-driven
//!    online/offline status and resolution negotiation
//! 2. **Fan-out**: decoded location updates delivered to registered listeners
//! 3. **Playback**: a location animator that turns sparse, batched updates
//!    into smooth per-frame marker positions

pub mod animator;
pub mod asset;
pub mod asset_connection;
pub mod config;
pub mod error;
pub mod fps;
pub mod listeners;
pub mod location;
pub mod presence;
pub mod subscriber;
pub mod types;

#[cfg(test)]
mod testutil;

// Re-export key types for convenience
pub use animator::{AnimationQueue, AnimationStep, LocationAnimator, StepAdvance};
pub use asset::Asset;
pub use asset_connection::{AssetConnection, SessionState};
pub use config::{AnimatorConfig, SubscriberConfig};
pub use error::{Result, TrackingError};
pub use listeners::{
    Listener, ListenerRegistry, ListenerSet, LocationListener, LocationUpdateIntervalListener,
    PositionListener, ResolutionListener, StatusListener,
};
pub use location::{Location, LocationUpdate, LocationUpdateType, Position};
pub use subscriber::Subscriber;
pub use types::{Accuracy, ClientType, PresenceData, Resolution};
