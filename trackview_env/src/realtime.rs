//! Realtime publish/subscribe transport abstraction.
//!
//! The transport itself (connection management, reconnection, auth) lives
//! outside TrackView. These traits describe the slice of it the tracking
//! session consumes: named channels carrying data messages and a presence set.

use crate::error::EnvError;
use crate::types::{ChannelMessage, ChannelOptions, ClientId, PresenceMessage};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Callback invoked for every data message of a subscribed event class.
pub type MessageHandler = Arc<dyn Fn(ChannelMessage) + Send + Sync>;

/// Callback invoked for every presence event on a channel.
pub type PresenceHandler = Arc<dyn Fn(PresenceMessage) + Send + Sync>;

/// A connected realtime client.
///
/// # Implementations
///
/// - **Production**: an adapter over the hosted realtime SDK
/// - **Simulation**: `SimRealtime`, an in-memory hub with fault injection
#[async_trait]
pub trait RealtimeClient: Send + Sync + 'static {
    type Channel: RealtimeChannel;

    /// Returns the channel with the given name, creating it if needed.
    ///
    /// Obtaining a channel performs no I/O; attachment happens on the first
    /// subscribe or presence call.
    fn channel(&self, name: &str, options: ChannelOptions) -> Arc<Self::Channel>;

    /// Releases the channel resource. Subsequent `channel()` calls start fresh.
    async fn release(&self, name: &str);

    /// Closes the connection. Every channel becomes unusable.
    async fn close(&self);
}

/// One named channel: data messages plus presence membership.
///
/// # Message Flow
///
/// ```text
/// Publisher                  Channel                    Subscriber
///   |                           |                          |
///   |-- publish("enhanced") --->|                          |
///   |                           |-- handler(message) ----->|
///   |-- presence.enter -------->|                          |
///   |                           |-- presence handler ----->|
/// ```
#[async_trait]
pub trait RealtimeChannel: Send + Sync + 'static {
    /// Returns the channel name.
    fn name(&self) -> &str;

    /// Registers `handler` for messages published under `event`.
    ///
    /// Resolves once the channel is attached.
    async fn subscribe(&self, event: &str, handler: MessageHandler) -> Result<(), EnvError>;

    /// Removes every data handler registered on this channel.
    fn unsubscribe(&self);

    /// Registers `handler` for presence events.
    ///
    /// Members already present are replayed as `present` events.
    async fn presence_subscribe(&self, handler: PresenceHandler) -> Result<(), EnvError>;

    /// Removes every presence handler registered on this channel.
    fn presence_unsubscribe(&self);

    /// Enters the presence set on behalf of `client_id` with `data`.
    async fn presence_enter(&self, client_id: &ClientId, data: Value) -> Result<(), EnvError>;

    /// Replaces the presence data of an already-entered member.
    async fn presence_update(&self, client_id: &ClientId, data: Value) -> Result<(), EnvError>;

    /// Leaves the presence set on behalf of `client_id`.
    ///
    /// # Returns
    /// * `Err(EnvError::ConnectionClosed)` - the connection is already gone;
    ///   the server will drop the member on its own
    async fn presence_leave(&self, client_id: &ClientId) -> Result<(), EnvError>;
}
