//! Asset Handle - one independently tracked asset.

use crate::asset_connection::{AssetConnection, SessionState};
use crate::error::Result;
use crate::listeners::{
    ListenerRegistry, LocationListener, LocationUpdateIntervalListener, ResolutionListener,
    StatusListener,
};
use crate::types::Resolution;
use std::sync::Arc;
use trackview_env::{ChannelOptions, ClientId, RealtimeClient};

/// A tracked asset: its session plus the listeners interested in it.
///
/// Listeners stay registered across stop/start cycles, so an asset can be
/// restarted without re-wiring callbacks.
pub struct Asset<C: RealtimeClient> {
    tracking_id: String,
    listeners: Arc<ListenerRegistry>,
    connection: AssetConnection<C>,
}

impl<C: RealtimeClient> Asset<C> {
    pub fn new(
        client: Arc<C>,
        client_id: Option<ClientId>,
        tracking_id: impl Into<String>,
        channel_options: ChannelOptions,
        resolution: Option<Resolution>,
    ) -> Self {
        let tracking_id = tracking_id.into();
        let listeners = ListenerRegistry::shared();
        let connection = AssetConnection::new(
            client,
            client_id,
            tracking_id.clone(),
            channel_options,
            Arc::clone(&listeners),
            resolution,
        );
        Self {
            tracking_id,
            listeners,
            connection,
        }
    }

    pub fn tracking_id(&self) -> &str {
        &self.tracking_id
    }

    pub async fn state(&self) -> SessionState {
        self.connection.state().await
    }

    /// The resolution currently requested from the publisher.
    pub fn resolution(&self) -> Option<Resolution> {
        self.connection.resolution()
    }

    /// Starts tracking. Resolves once this client has entered channel presence.
    pub async fn start(&self) -> Result<()> {
        self.connection.start().await
    }

    /// Stops tracking. Safe to call in any state and more than once.
    pub async fn stop(&self) -> Result<()> {
        self.connection.stop().await
    }

    /// Asks the publisher to send updates at `resolution`.
    ///
    /// # Errors
    /// * `TrackingError::NotStarted` - the asset is not being tracked
    pub async fn send_change_request(&self, resolution: Resolution) -> Result<()> {
        self.connection.send_change_request(resolution).await
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn add_location_listener(&self, listener: LocationListener) {
        self.listeners.enhanced_location.add(listener);
    }

    pub fn add_raw_location_listener(&self, listener: LocationListener) {
        self.listeners.raw_location.add(listener);
    }

    pub fn add_status_listener(&self, listener: StatusListener) {
        self.listeners.status.add(listener);
    }

    pub fn add_resolution_listener(&self, listener: ResolutionListener) {
        self.listeners.resolution.add(listener);
    }

    pub fn add_location_update_interval_listener(&self, listener: LocationUpdateIntervalListener) {
        self.listeners.location_update_interval.add(listener);
    }

    pub fn remove_location_listener(&self, listener: &LocationListener) {
        self.listeners.enhanced_location.remove(listener);
    }

    pub fn remove_raw_location_listener(&self, listener: &LocationListener) {
        self.listeners.raw_location.remove(listener);
    }

    pub fn remove_status_listener(&self, listener: &StatusListener) {
        self.listeners.status.remove(listener);
    }

    pub fn remove_resolution_listener(&self, listener: &ResolutionListener) {
        self.listeners.resolution.remove(listener);
    }

    pub fn remove_location_update_interval_listener(
        &self,
        listener: &LocationUpdateIntervalListener,
    ) {
        self.listeners.location_update_interval.remove(listener);
    }
}
