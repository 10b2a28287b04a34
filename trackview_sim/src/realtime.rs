//! In-memory realtime hub with fault injection.
//!
//! Every [`SimRealtime`] is one connection onto a shared hub. Publishers and
//! subscribers connect separately so presence membership, handler ownership
//! and connection loss behave per participant:
//!
//! ```text
//!  SimRealtime (subscriber) ─┐
//!                            ├──▶ Hub { channels, stats, faults }
//!  SimRealtime (publisher) ──┘
//! ```
//!
//! Delivery is synchronous: handlers run inside `publish` and the presence
//! calls, outside the hub lock.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};
use trackview_env::{
    ChannelMessage, ChannelOptions, ClientId, EnvError, MessageHandler, PresenceAction,
    PresenceHandler, PresenceMessage, RealtimeChannel, RealtimeClient,
};

/// Messages kept per channel for rewind.
const HISTORY_LIMIT: usize = 100;

/// Counters for calls made against the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub subscribes: u64,
    pub enters: u64,
    pub updates: u64,
    pub leaves: u64,
    pub releases: u64,
    pub published: u64,
    pub delivered: u64,
}

type ConnectionId = u64;

struct Member {
    client_id: ClientId,
    connection: ConnectionId,
    data: Value,
}

#[derive(Default)]
struct ChannelState {
    history: VecDeque<ChannelMessage>,
    handlers: Vec<(ConnectionId, String, MessageHandler)>,
    presence_handlers: Vec<(ConnectionId, PresenceHandler)>,
    members: Vec<Member>,
}

impl ChannelState {
    fn presence_handlers(&self) -> Vec<PresenceHandler> {
        self.presence_handlers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }
}

#[derive(Default)]
struct Hub {
    channels: HashMap<String, ChannelState>,
    disconnected: HashSet<ConnectionId>,
    fail_next_enter: Option<EnvError>,
    fail_next_leave: Option<EnvError>,
    stats: SimStats,
}

impl Hub {
    fn check_connected(&self, connection: ConnectionId) -> Result<(), EnvError> {
        if self.disconnected.contains(&connection) {
            Err(EnvError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

/// One connection onto the simulated realtime hub.
#[derive(Clone)]
pub struct SimRealtime {
    hub: Arc<Mutex<Hub>>,
    connection: ConnectionId,
    next_connection: Arc<AtomicU64>,
}

impl SimRealtime {
    /// Creates a new hub and returns its first connection.
    pub fn new() -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub::default())),
            connection: 0,
            next_connection: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Opens another connection onto the same hub.
    pub fn connect(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
            connection: self.next_connection.fetch_add(1, Ordering::Relaxed),
            next_connection: Arc::clone(&self.next_connection),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> SimStats {
        self.hub().stats
    }

    /// Fails the next presence enter on any connection with `err`.
    pub fn fail_next_enter(&self, err: EnvError) {
        self.hub().fail_next_enter = Some(err);
    }

    /// Fails the next presence leave on any connection with `err`.
    pub fn fail_next_leave(&self, err: EnvError) {
        self.hub().fail_next_leave = Some(err);
    }

    /// Drops this connection. Its presence members leave every channel and
    /// further presence calls fail with `ConnectionClosed`.
    pub fn disconnect(&self) {
        let mut notifications = Vec::new();
        {
            let mut hub = self.hub();
            hub.disconnected.insert(self.connection);
            for (name, channel) in hub.channels.iter_mut() {
                let (gone, kept): (Vec<Member>, Vec<Member>) = channel
                    .members
                    .drain(..)
                    .partition(|m| m.connection == self.connection);
                channel.members = kept;
                for member in gone {
                    debug!(channel = %name, client_id = %member.client_id, "member dropped with connection");
                    notifications.push((
                        channel.presence_handlers(),
                        PresenceMessage::new(PresenceAction::Leave, member.client_id, member.data),
                    ));
                }
            }
        }
        for (handlers, message) in notifications {
            for handler in handlers {
                handler(message.clone());
            }
        }
    }

    /// Restores a dropped connection. Members must enter again.
    pub fn reconnect(&self) {
        self.hub().disconnected.remove(&self.connection);
    }

    pub fn is_connected(&self) -> bool {
        !self.hub().disconnected.contains(&self.connection)
    }

    /// Publishes `data` under `event` on channel `name`.
    ///
    /// # Returns
    /// Number of handlers the message was delivered to.
    pub fn publish(&self, name: &str, event: &str, data: Value) -> Result<usize, EnvError> {
        let message = ChannelMessage {
            name: event.to_string(),
            data,
            client_id: None,
        };
        let handlers: Vec<MessageHandler> = {
            let mut hub = self.hub();
            hub.check_connected(self.connection)?;
            let channel = hub.channels.entry(name.to_string()).or_default();
            channel.history.push_back(message.clone());
            while channel.history.len() > HISTORY_LIMIT {
                channel.history.pop_front();
            }
            let handlers: Vec<MessageHandler> = channel
                .handlers
                .iter()
                .filter(|(_, subscribed, _)| subscribed == event)
                .map(|(_, _, handler)| Arc::clone(handler))
                .collect();
            hub.stats.published += 1;
            hub.stats.delivered += handlers.len() as u64;
            handlers
        };

        trace!(channel = name, event, receivers = handlers.len(), "publish");
        for handler in &handlers {
            handler(message.clone());
        }
        Ok(handlers.len())
    }

    /// Client ids currently present on channel `name`.
    pub fn members(&self, name: &str) -> Vec<ClientId> {
        self.hub()
            .channels
            .get(name)
            .map(|c| c.members.iter().map(|m| m.client_id.clone()).collect())
            .unwrap_or_default()
    }

    /// Data and presence handlers registered on channel `name`, all connections.
    pub fn handler_count(&self, name: &str) -> usize {
        self.hub()
            .channels
            .get(name)
            .map(|c| c.handlers.len() + c.presence_handlers.len())
            .unwrap_or(0)
    }
}

impl Default for SimRealtime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeClient for SimRealtime {
    type Channel = SimChannel;

    fn channel(&self, name: &str, options: ChannelOptions) -> Arc<SimChannel> {
        Arc::new(SimChannel {
            name: name.to_string(),
            options,
            realtime: self.clone(),
        })
    }

    async fn release(&self, name: &str) {
        let mut hub = self.hub();
        hub.stats.releases += 1;
        if let Some(channel) = hub.channels.get_mut(name) {
            channel.handlers.retain(|(owner, _, _)| *owner != self.connection);
            channel
                .presence_handlers
                .retain(|(owner, _)| *owner != self.connection);
        }
    }

    async fn close(&self) {
        self.disconnect();
    }
}

/// A channel as seen from one connection.
pub struct SimChannel {
    name: String,
    options: ChannelOptions,
    realtime: SimRealtime,
}

impl SimChannel {
    fn connection(&self) -> ConnectionId {
        self.realtime.connection
    }

    fn broadcast(&self, handlers: Vec<PresenceHandler>, message: PresenceMessage) {
        for handler in handlers {
            handler(message.clone());
        }
    }
}

#[async_trait]
impl RealtimeChannel for SimChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn subscribe(&self, event: &str, handler: MessageHandler) -> Result<(), EnvError> {
        let replay: Vec<ChannelMessage> = {
            let mut hub = self.realtime.hub();
            hub.check_connected(self.connection())?;
            hub.stats.subscribes += 1;
            let channel = hub.channels.entry(self.name.clone()).or_default();
            channel
                .handlers
                .push((self.connection(), event.to_string(), Arc::clone(&handler)));

            let rewind = self.options.rewind.unwrap_or(0) as usize;
            let mut replay: Vec<ChannelMessage> = channel
                .history
                .iter()
                .rev()
                .filter(|m| m.name == event)
                .take(rewind)
                .cloned()
                .collect();
            replay.reverse();
            replay
        };

        for message in replay {
            handler(message);
        }
        Ok(())
    }

    fn unsubscribe(&self) {
        let mut hub = self.realtime.hub();
        if let Some(channel) = hub.channels.get_mut(&self.name) {
            channel
                .handlers
                .retain(|(owner, _, _)| *owner != self.realtime.connection);
        }
    }

    async fn presence_subscribe(&self, handler: PresenceHandler) -> Result<(), EnvError> {
        let present: Vec<PresenceMessage> = {
            let mut hub = self.realtime.hub();
            hub.check_connected(self.connection())?;
            let channel = hub.channels.entry(self.name.clone()).or_default();
            channel
                .presence_handlers
                .push((self.connection(), Arc::clone(&handler)));
            channel
                .members
                .iter()
                .map(|m| {
                    PresenceMessage::new(PresenceAction::Present, m.client_id.clone(), m.data.clone())
                })
                .collect()
        };

        for message in present {
            handler(message);
        }
        Ok(())
    }

    fn presence_unsubscribe(&self) {
        let mut hub = self.realtime.hub();
        if let Some(channel) = hub.channels.get_mut(&self.name) {
            channel
                .presence_handlers
                .retain(|(owner, _)| *owner != self.realtime.connection);
        }
    }

    async fn presence_enter(&self, client_id: &ClientId, data: Value) -> Result<(), EnvError> {
        let handlers = {
            let mut hub = self.realtime.hub();
            hub.check_connected(self.connection())?;
            if let Some(err) = hub.fail_next_enter.take() {
                return Err(err);
            }
            hub.stats.enters += 1;
            let channel = hub.channels.entry(self.name.clone()).or_default();
            channel.members.retain(|m| &m.client_id != client_id);
            channel.members.push(Member {
                client_id: client_id.clone(),
                connection: self.connection(),
                data: data.clone(),
            });
            channel.presence_handlers()
        };

        debug!(channel = %self.name, %client_id, "presence enter");
        self.broadcast(
            handlers,
            PresenceMessage::new(PresenceAction::Enter, client_id.clone(), data),
        );
        Ok(())
    }

    async fn presence_update(&self, client_id: &ClientId, data: Value) -> Result<(), EnvError> {
        let handlers = {
            let mut hub = self.realtime.hub();
            hub.check_connected(self.connection())?;
            hub.stats.updates += 1;
            let channel = hub.channels.entry(self.name.clone()).or_default();
            match channel.members.iter_mut().find(|m| &m.client_id == client_id) {
                Some(member) => member.data = data.clone(),
                None => channel.members.push(Member {
                    client_id: client_id.clone(),
                    connection: self.connection(),
                    data: data.clone(),
                }),
            }
            channel.presence_handlers()
        };

        self.broadcast(
            handlers,
            PresenceMessage::new(PresenceAction::Update, client_id.clone(), data),
        );
        Ok(())
    }

    async fn presence_leave(&self, client_id: &ClientId) -> Result<(), EnvError> {
        let (handlers, data) = {
            let mut hub = self.realtime.hub();
            hub.check_connected(self.connection())?;
            if let Some(err) = hub.fail_next_leave.take() {
                return Err(err);
            }
            hub.stats.leaves += 1;
            let channel = hub.channels.entry(self.name.clone()).or_default();
            let Some(index) = channel.members.iter().position(|m| &m.client_id == client_id)
            else {
                return Ok(());
            };
            let member = channel.members.remove(index);
            (channel.presence_handlers(), member.data)
        };

        debug!(channel = %self.name, %client_id, "presence leave");
        self.broadcast(
            handlers,
            PresenceMessage::new(PresenceAction::Leave, client_id.clone(), data),
        );
        Ok(())
    }
}
