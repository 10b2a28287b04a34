//! Channel Session - one tracking channel per asset.
//!
//! Owns the `tracking:{id}` channel and this client's presence on it:
//!
//! ```text
//! start():  subscribe(raw) → subscribe(enhanced) → presence.subscribe → presence.enter
//! stop():   unsubscribe → presence.unsubscribe → [offline] → presence.leave → release
//! ```
//!
//! Inbound data and presence events are decoded here and fanned out to the
//! asset's [`ListenerRegistry`].

use crate::error::{Result, TrackingError};
use crate::listeners::{ListenerRegistry, ListenerSet};
use crate::location::LocationUpdate;
use crate::presence::{PresenceEvent, PresenceTracker};
use crate::types::{PresenceData, Resolution};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};
use trackview_env::{
    ChannelMessage, ChannelOptions, ClientId, MessageHandler, PresenceHandler, PresenceMessage,
    RealtimeChannel, RealtimeClient,
};

/// Event class carrying unprocessed publisher fixes.
pub const EVENT_RAW: &str = "raw";

/// Event class carrying map-matched/enhanced publisher fixes.
pub const EVENT_ENHANCED: &str = "enhanced";

/// Returns the channel name used for a tracking id.
pub fn channel_name(tracking_id: &str) -> String {
    format!("tracking:{tracking_id}")
}

/// Lifecycle of a session or asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Initialized,
    Started,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocationEvent {
    Raw,
    Enhanced,
}

impl LocationEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Raw => EVENT_RAW,
            Self::Enhanced => EVENT_ENHANCED,
        }
    }

    fn listeners<'a>(&self, registry: &'a ListenerRegistry) -> &'a ListenerSet<LocationUpdate> {
        match self {
            Self::Raw => &registry.raw_location,
            Self::Enhanced => &registry.enhanced_location,
        }
    }
}

struct Session<Ch> {
    state: SessionState,
    channel: Option<Arc<Ch>>,
}

/// The transport-facing half of a tracked asset.
pub struct AssetConnection<C: RealtimeClient> {
    client: Arc<C>,
    client_id: Option<ClientId>,
    tracking_id: String,
    channel_options: ChannelOptions,
    listeners: Arc<ListenerRegistry>,
    presence: Arc<Mutex<PresenceTracker>>,

    /// Resolution this client requests from the publisher
    resolution: Mutex<Option<Resolution>>,

    /// Serializes start/stop/change requests across their transport awaits
    session: tokio::sync::Mutex<Session<C::Channel>>,
}

impl<C: RealtimeClient> AssetConnection<C> {
    /// Creates a session for `tracking_id`. No transport calls are made
    /// until [`start`](Self::start).
    pub fn new(
        client: Arc<C>,
        client_id: Option<ClientId>,
        tracking_id: impl Into<String>,
        channel_options: ChannelOptions,
        listeners: Arc<ListenerRegistry>,
        resolution: Option<Resolution>,
    ) -> Self {
        Self {
            client,
            client_id,
            tracking_id: tracking_id.into(),
            channel_options,
            listeners,
            presence: Arc::new(Mutex::new(PresenceTracker::new())),
            resolution: Mutex::new(resolution),
            session: tokio::sync::Mutex::new(Session {
                state: SessionState::Initialized,
                channel: None,
            }),
        }
    }

    pub fn tracking_id(&self) -> &str {
        &self.tracking_id
    }

    pub fn channel_name(&self) -> String {
        channel_name(&self.tracking_id)
    }

    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state
    }

    /// The resolution currently requested from the publisher.
    pub fn resolution(&self) -> Option<Resolution> {
        *self.resolution.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tracker(&self) -> MutexGuard<'_, PresenceTracker> {
        self.presence.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens the channel, subscribes to data and presence, and enters
    /// presence as a subscriber. No-op when already started.
    ///
    /// # Errors
    /// * `TrackingError::MissingClientId` - raised before any transport call
    /// * `TrackingError::Transport` - a subscription or the presence enter
    ///   failed; everything attached so far is torn down again
    pub async fn start(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.state == SessionState::Started {
            return Ok(());
        }
        let client_id = self.client_id.clone().ok_or_else(|| {
            error!(tracking_id = %self.tracking_id, "no clientId provided");
            TrackingError::MissingClientId
        })?;

        let name = self.channel_name();
        let channel = self.client.channel(&name, self.channel_options.clone());
        self.tracker().reset();

        if let Err(err) = self.attach(channel.as_ref(), &client_id).await {
            error!(tracking_id = %self.tracking_id, error = %err, "failed to start tracking session");
            channel.unsubscribe();
            channel.presence_unsubscribe();
            self.client.release(&name).await;
            return Err(err);
        }

        session.channel = Some(channel);
        session.state = SessionState::Started;
        debug!(tracking_id = %self.tracking_id, channel = %name, "tracking session started");
        Ok(())
    }

    async fn attach(&self, channel: &C::Channel, client_id: &ClientId) -> Result<()> {
        for event in [LocationEvent::Raw, LocationEvent::Enhanced] {
            channel
                .subscribe(event.name(), self.location_handler(event))
                .await?;
        }
        channel.presence_subscribe(self.presence_handler()).await?;

        let data = PresenceData::subscriber(self.resolution()).to_value();
        channel.presence_enter(client_id, data).await?;
        Ok(())
    }

    /// Tears the session down. No-op unless started; safe to call repeatedly.
    ///
    /// Listeners are told the asset is offline. A presence leave that fails
    /// because the connection is already gone is tolerated; any other leave
    /// failure is returned after the channel has been released.
    pub async fn stop(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.state != SessionState::Started {
            return Ok(());
        }
        session.state = SessionState::Stopped;
        let Some(channel) = session.channel.take() else {
            return Ok(());
        };

        channel.unsubscribe();
        channel.presence_unsubscribe();
        self.tracker().mark_offline();
        self.listeners.notify_status(false);

        let left = match &self.client_id {
            Some(client_id) => match channel.presence_leave(client_id).await {
                Ok(()) => Ok(()),
                Err(err) if err.is_connection_closed() => {
                    debug!(tracking_id = %self.tracking_id, "connection already closed; skipping presence leave");
                    Ok(())
                }
                Err(err) => {
                    error!(tracking_id = %self.tracking_id, error = %err, "error leaving channel presence");
                    Err(TrackingError::from(err))
                }
            },
            None => Ok(()),
        };

        self.client.release(channel.name()).await;
        debug!(tracking_id = %self.tracking_id, "tracking session stopped");
        left
    }

    /// Requests a new resolution from the publisher via a presence update.
    ///
    /// Advisory: success means the update was accepted by the channel, not
    /// that the publisher applied it.
    pub async fn send_change_request(&self, resolution: Resolution) -> Result<()> {
        let session = self.session.lock().await;
        let (SessionState::Started, Some(channel), Some(client_id)) =
            (session.state, session.channel.as_ref(), self.client_id.as_ref())
        else {
            return Err(TrackingError::NotStarted {
                tracking_id: self.tracking_id.clone(),
            });
        };

        *self.resolution.lock().unwrap_or_else(PoisonError::into_inner) = Some(resolution);
        let data = PresenceData::subscriber(Some(resolution)).to_value();
        channel.presence_update(client_id, data).await?;
        debug!(tracking_id = %self.tracking_id, ?resolution, "resolution change requested");
        Ok(())
    }

    fn location_handler(&self, event: LocationEvent) -> MessageHandler {
        let listeners = Arc::clone(&self.listeners);
        let tracking_id = self.tracking_id.clone();
        Arc::new(move |message: ChannelMessage| {
            match LocationUpdate::parse_batch(&message.data) {
                Ok(updates) => {
                    let set = event.listeners(&listeners);
                    for update in &updates {
                        set.dispatch(update);
                    }
                }
                Err(err) => {
                    warn!(tracking_id = %tracking_id, event = event.name(), error = %err, "dropping malformed location message");
                }
            }
        })
    }

    fn presence_handler(&self) -> PresenceHandler {
        let listeners = Arc::clone(&self.listeners);
        let tracker = Arc::clone(&self.presence);
        let tracking_id = self.tracking_id.clone();
        Arc::new(move |message: PresenceMessage| {
            let interpreted = tracker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .interpret(&message);
            match interpreted {
                Ok(events) => {
                    for event in events {
                        match event {
                            PresenceEvent::Online => listeners.notify_status(true),
                            PresenceEvent::Offline => listeners.notify_status(false),
                            PresenceEvent::PublisherResolution(resolution) => {
                                listeners.notify_publisher_resolution(resolution)
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(tracking_id = %tracking_id, action = %message.action, error = %err, "dropping malformed presence message");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{feature, Call, RecordingClient};
    use crate::types::Accuracy;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use trackview_env::{EnvError, PresenceAction};

    fn connection(client: &Arc<RecordingClient>, resolution: Option<Resolution>) -> AssetConnection<RecordingClient> {
        AssetConnection::new(
            client.clone(),
            Some(ClientId::new("clientId")),
            "trackingId",
            ChannelOptions::with_rewind(1),
            ListenerRegistry::shared(),
            resolution,
        )
    }

    #[tokio::test]
    async fn test_start_subscribes_then_enters_presence() {
        let client = RecordingClient::shared();
        let resolution = Resolution::new(Accuracy::Low, 3, 4.0);
        let conn = connection(&client, Some(resolution));

        conn.start().await.unwrap();

        assert_eq!(conn.state().await, SessionState::Started);
        assert_eq!(
            client.calls(),
            vec![
                Call::Channel("tracking:trackingId".into(), Some(1)),
                Call::Subscribe("raw".into()),
                Call::Subscribe("enhanced".into()),
                Call::PresenceSubscribe,
                Call::Enter(
                    "clientId".into(),
                    json!({"type": "SUBSCRIBER", "resolution": {"accuracy": "LOW", "desiredInterval": 3, "minimumDisplacement": 4.0}})
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let client = RecordingClient::shared();
        let conn = connection(&client, None);
        conn.start().await.unwrap();
        let calls = client.calls().len();

        conn.start().await.unwrap();
        assert_eq!(client.calls().len(), calls);
    }

    #[tokio::test]
    async fn test_missing_client_id_fails_before_transport() {
        let client = RecordingClient::shared();
        let conn = AssetConnection::new(
            client.clone(),
            None,
            "trackingId",
            ChannelOptions::default(),
            ListenerRegistry::shared(),
            None,
        );

        assert_eq!(conn.start().await, Err(TrackingError::MissingClientId));
        assert!(client.calls().is_empty());
        assert_eq!(conn.state().await, SessionState::Initialized);
    }

    #[tokio::test]
    async fn test_rejected_enter_leaves_no_partial_session() {
        let client = RecordingClient::shared();
        client.fail_enter(EnvError::rejected("not permitted"));
        let conn = connection(&client, None);

        let result = conn.start().await;

        assert!(matches!(result, Err(TrackingError::Transport(EnvError::Rejected(_)))));
        assert_eq!(conn.state().await, SessionState::Initialized);
        let calls = client.calls();
        assert!(calls.contains(&Call::Unsubscribe));
        assert!(calls.contains(&Call::PresenceUnsubscribe));
        assert_eq!(calls.last(), Some(&Call::Release("tracking:trackingId".into())));
    }

    #[tokio::test]
    async fn test_stop_sequence_and_idempotence() {
        let client = RecordingClient::shared();
        let conn = connection(&client, None);
        conn.start().await.unwrap();
        client.clear_calls();

        conn.stop().await.unwrap();
        conn.stop().await.unwrap();

        assert_eq!(
            client.calls(),
            vec![
                Call::Unsubscribe,
                Call::PresenceUnsubscribe,
                Call::Leave("clientId".into()),
                Call::Release("tracking:trackingId".into()),
            ]
        );
        assert_eq!(conn.state().await, SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let client = RecordingClient::shared();
        let conn = connection(&client, None);
        conn.stop().await.unwrap();
        assert!(client.calls().is_empty());
        assert_eq!(conn.state().await, SessionState::Initialized);
    }

    #[tokio::test]
    async fn test_stop_tolerates_closed_connection() {
        let client = RecordingClient::shared();
        let conn = connection(&client, None);
        conn.start().await.unwrap();
        client.fail_leave(EnvError::ConnectionClosed);

        assert_eq!(conn.stop().await, Ok(()));
    }

    #[tokio::test]
    async fn test_stop_surfaces_leave_failure_after_cleanup() {
        let client = RecordingClient::shared();
        let conn = connection(&client, None);
        conn.start().await.unwrap();
        client.fail_leave(EnvError::rejected("leave refused"));

        let result = conn.stop().await;

        assert!(matches!(result, Err(TrackingError::Transport(EnvError::Rejected(_)))));
        assert_eq!(client.calls().last(), Some(&Call::Release("tracking:trackingId".into())));
        assert_eq!(conn.state().await, SessionState::Stopped);
        assert_eq!(conn.stop().await, Ok(()));
    }

    #[tokio::test]
    async fn test_stop_notifies_offline() {
        let client = RecordingClient::shared();
        let conn = connection(&client, None);
        let statuses = Arc::new(StdMutex::new(Vec::new()));
        let sink = statuses.clone();
        conn.listeners
            .status
            .add(Arc::new(move |online: bool| sink.lock().unwrap().push(online)));

        conn.start().await.unwrap();
        conn.stop().await.unwrap();

        assert_eq!(*statuses.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn test_change_request_requires_started_session() {
        let client = RecordingClient::shared();
        let conn = connection(&client, None);
        let resolution = Resolution::new(Accuracy::High, 1000, 1.0);

        let result = conn.send_change_request(resolution).await;
        assert_eq!(
            result,
            Err(TrackingError::NotStarted {
                tracking_id: "trackingId".into()
            })
        );
        assert_eq!(conn.resolution(), None);
    }

    #[tokio::test]
    async fn test_change_request_publishes_one_presence_update() {
        let client = RecordingClient::shared();
        let conn = connection(&client, None);
        conn.start().await.unwrap();
        client.clear_calls();
        let resolution = Resolution::new(Accuracy::Maximum, 500, 0.5);

        conn.send_change_request(resolution).await.unwrap();

        assert_eq!(
            client.calls(),
            vec![Call::Update(
                "clientId".into(),
                json!({"type": "SUBSCRIBER", "resolution": {"accuracy": "MAXIMUM", "desiredInterval": 500, "minimumDisplacement": 0.5}})
            )]
        );
        assert_eq!(conn.resolution(), Some(resolution));
    }

    #[tokio::test]
    async fn test_batch_fans_out_in_order() {
        let client = RecordingClient::shared();
        let conn = connection(&client, None);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        conn.listeners
            .enhanced_location
            .add(Arc::new(move |update: LocationUpdate| {
                sink.lock().unwrap().push(update.location.longitude)
            }));
        conn.start().await.unwrap();

        client.deliver(
            "enhanced",
            json!([
                {"location": feature(1.0, 0.0), "type": "ACTUAL"},
                {"location": feature(2.0, 0.0), "type": "ACTUAL"},
                {"location": feature(3.0, 0.0), "type": "ACTUAL"},
            ]),
        );
        client.deliver("enhanced", json!({"location": feature(4.0, 0.0), "type": "ACTUAL"}));

        assert_eq!(*seen.lock().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn test_raw_and_enhanced_are_routed_separately() {
        let client = RecordingClient::shared();
        let conn = connection(&client, None);
        let raw = Arc::new(StdMutex::new(0));
        let sink = raw.clone();
        conn.listeners
            .raw_location
            .add(Arc::new(move |_: LocationUpdate| *sink.lock().unwrap() += 1));
        conn.start().await.unwrap();

        client.deliver("enhanced", json!({"location": feature(1.0, 1.0), "type": "ACTUAL"}));
        client.deliver("raw", json!({"location": feature(1.0, 1.0), "type": "ACTUAL"}));

        assert_eq!(*raw.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_message_is_dropped() {
        let client = RecordingClient::shared();
        let conn = connection(&client, None);
        let count = Arc::new(StdMutex::new(0));
        let sink = count.clone();
        conn.listeners
            .enhanced_location
            .add(Arc::new(move |_: LocationUpdate| *sink.lock().unwrap() += 1));
        conn.start().await.unwrap();

        client.deliver("enhanced", json!({"garbage": true}));
        client.deliver("enhanced", json!({"location": feature(1.0, 1.0), "type": "ACTUAL"}));

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_publisher_presence_drives_status_and_interval() {
        let client = RecordingClient::shared();
        let conn = connection(&client, None);
        let statuses = Arc::new(StdMutex::new(Vec::new()));
        let intervals = Arc::new(StdMutex::new(Vec::new()));
        let status_sink = statuses.clone();
        let interval_sink = intervals.clone();
        conn.listeners
            .status
            .add(Arc::new(move |online: bool| status_sink.lock().unwrap().push(online)));
        conn.listeners
            .location_update_interval
            .add(Arc::new(move |ms: u64| interval_sink.lock().unwrap().push(ms)));
        conn.start().await.unwrap();

        let with_resolution = json!({"type": "PUBLISHER", "resolution": {"accuracy": "BALANCED", "desiredInterval": 2000, "minimumDisplacement": 10}});
        client.presence(PresenceAction::Enter, with_resolution.clone());
        client.presence(PresenceAction::Update, with_resolution);
        client.presence(PresenceAction::Enter, json!({"type": "SUBSCRIBER"}));
        client.presence(PresenceAction::Leave, json!({"type": "PUBLISHER"}));

        assert_eq!(*statuses.lock().unwrap(), vec![true, false]);
        assert_eq!(*intervals.lock().unwrap(), vec![2000, 2000]);
    }

    #[tokio::test]
    async fn test_listeners_survive_restart() {
        let client = RecordingClient::shared();
        let conn = connection(&client, None);
        let count = Arc::new(StdMutex::new(0));
        let sink = count.clone();
        conn.listeners
            .enhanced_location
            .add(Arc::new(move |_: LocationUpdate| *sink.lock().unwrap() += 1));

        conn.start().await.unwrap();
        conn.stop().await.unwrap();
        conn.start().await.unwrap();
        assert_eq!(conn.state().await, SessionState::Started);

        client.deliver("enhanced", json!({"location": feature(1.0, 1.0), "type": "ACTUAL"}));
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
