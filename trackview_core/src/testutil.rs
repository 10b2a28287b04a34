//! Recording transport fake for unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use trackview_env::{
    ChannelMessage, ChannelOptions, ClientId, EnvError, MessageHandler, PresenceAction,
    PresenceHandler, PresenceMessage, RealtimeChannel, RealtimeClient,
};

/// A transport call, in the order it was made.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Channel(String, Option<u32>),
    Subscribe(String),
    Unsubscribe,
    PresenceSubscribe,
    PresenceUnsubscribe,
    Enter(String, Value),
    Update(String, Value),
    Leave(String),
    Release(String),
    Close,
}

#[derive(Default)]
struct Recorder {
    calls: Vec<Call>,
    handlers: Vec<(String, MessageHandler)>,
    presence_handlers: Vec<PresenceHandler>,
    fail_enter: Option<EnvError>,
    fail_leave: Option<EnvError>,
}

/// Client whose every channel shares one recorder.
#[derive(Default)]
pub struct RecordingClient {
    recorder: Arc<Mutex<Recorder>>,
}

pub struct RecordingChannel {
    name: String,
    recorder: Arc<Mutex<Recorder>>,
}

fn lock(recorder: &Mutex<Recorder>) -> MutexGuard<'_, Recorder> {
    recorder.lock().unwrap()
}

impl RecordingClient {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.recorder).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.recorder).calls.clear();
    }

    pub fn fail_enter(&self, err: EnvError) {
        lock(&self.recorder).fail_enter = Some(err);
    }

    pub fn fail_leave(&self, err: EnvError) {
        lock(&self.recorder).fail_leave = Some(err);
    }

    /// Delivers a data message to every handler subscribed to `event`.
    pub fn deliver(&self, event: &str, data: Value) {
        let handlers: Vec<MessageHandler> = lock(&self.recorder)
            .handlers
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(ChannelMessage::new(event, data.clone()));
        }
    }

    /// Delivers a presence event from `publisher-1`.
    pub fn presence(&self, action: PresenceAction, data: Value) {
        let handlers = lock(&self.recorder).presence_handlers.clone();
        for handler in handlers {
            handler(PresenceMessage::new(action, ClientId::new("publisher-1"), data.clone()));
        }
    }
}

#[async_trait]
impl RealtimeClient for RecordingClient {
    type Channel = RecordingChannel;

    fn channel(&self, name: &str, options: ChannelOptions) -> Arc<RecordingChannel> {
        lock(&self.recorder)
            .calls
            .push(Call::Channel(name.to_string(), options.rewind));
        Arc::new(RecordingChannel {
            name: name.to_string(),
            recorder: self.recorder.clone(),
        })
    }

    async fn release(&self, name: &str) {
        lock(&self.recorder).calls.push(Call::Release(name.to_string()));
    }

    async fn close(&self) {
        lock(&self.recorder).calls.push(Call::Close);
    }
}

#[async_trait]
impl RealtimeChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn subscribe(&self, event: &str, handler: MessageHandler) -> Result<(), EnvError> {
        let mut recorder = lock(&self.recorder);
        recorder.calls.push(Call::Subscribe(event.to_string()));
        recorder.handlers.push((event.to_string(), handler));
        Ok(())
    }

    fn unsubscribe(&self) {
        let mut recorder = lock(&self.recorder);
        recorder.calls.push(Call::Unsubscribe);
        recorder.handlers.clear();
    }

    async fn presence_subscribe(&self, handler: PresenceHandler) -> Result<(), EnvError> {
        let mut recorder = lock(&self.recorder);
        recorder.calls.push(Call::PresenceSubscribe);
        recorder.presence_handlers.push(handler);
        Ok(())
    }

    fn presence_unsubscribe(&self) {
        let mut recorder = lock(&self.recorder);
        recorder.calls.push(Call::PresenceUnsubscribe);
        recorder.presence_handlers.clear();
    }

    async fn presence_enter(&self, client_id: &ClientId, data: Value) -> Result<(), EnvError> {
        let mut recorder = lock(&self.recorder);
        recorder
            .calls
            .push(Call::Enter(client_id.to_string(), data));
        match recorder.fail_enter.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn presence_update(&self, client_id: &ClientId, data: Value) -> Result<(), EnvError> {
        lock(&self.recorder)
            .calls
            .push(Call::Update(client_id.to_string(), data));
        Ok(())
    }

    async fn presence_leave(&self, client_id: &ClientId) -> Result<(), EnvError> {
        let mut recorder = lock(&self.recorder);
        recorder.calls.push(Call::Leave(client_id.to_string()));
        match recorder.fail_leave.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A GeoJSON point feature at `(lon, lat)`.
pub fn feature(lon: f64, lat: f64) -> Value {
    json!({
        "type": "Feature",
        "geometry": {"type": "Point", "coordinates": [lon, lat]},
        "properties": {"accuracyHorizontal": 1.0, "bearing": 0.0, "speed": 0.0, "time": 0.0}
    })
}
