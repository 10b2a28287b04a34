//! Simulated publisher - the asset side of a tracking channel.
//!
//! Drives a vehicle around a circular route, enters presence as the
//! publisher, and publishes `enhanced` and `raw` location updates. Subscriber
//! resolution requests seen in presence are adopted and re-announced.

use crate::realtime::{SimChannel, SimRealtime};
use geo::{HaversineDistance, Point};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};
use trackview_core::asset_connection::{channel_name, EVENT_ENHANCED, EVENT_RAW};
use trackview_core::{ClientType, Location, LocationUpdate, PresenceData, Resolution};
use trackview_env::{
    ChannelOptions, ClientId, EnvError, PresenceAction, PresenceMessage, RealtimeChannel,
    RealtimeClient,
};

/// Meters per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Ground truth: a vehicle circling at constant speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Route {
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub radius_m: f64,

    /// Meters per second
    pub speed: f64,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            center_latitude: 51.5074,
            center_longitude: -0.1278,
            radius_m: 400.0,
            speed: 12.0,
        }
    }
}

impl Route {
    /// Where the vehicle is `elapsed` after the start.
    pub fn location_at(&self, elapsed: Duration) -> Location {
        let t = elapsed.as_secs_f64();
        let angle = t * self.speed / self.radius_m;
        let north_m = self.radius_m * angle.cos();
        let east_m = self.radius_m * angle.sin();

        let latitude = self.center_latitude + north_m / METERS_PER_DEGREE;
        let longitude = self.center_longitude
            + east_m / (METERS_PER_DEGREE * self.center_latitude.to_radians().cos());

        // Clockwise travel: heading is the radius angle plus a quarter turn.
        let bearing = (angle.to_degrees() + 90.0).rem_euclid(360.0);
        Location::new(latitude, longitude, bearing, 5.0)
            .with_speed(self.speed)
            .with_timestamp(elapsed.as_millis() as f64)
    }
}

/// Great-circle distance between two locations in meters.
pub fn distance_m(a: &Location, b: &Location) -> f64 {
    Point::new(a.longitude, a.latitude).haversine_distance(&Point::new(b.longitude, b.latitude))
}

/// The publishing side of one tracked asset.
pub struct SimPublisher {
    tracking_id: String,
    client_id: ClientId,
    realtime: SimRealtime,
    channel: Arc<SimChannel>,
    route: Route,

    /// Resolution the publisher currently works at
    applied: Resolution,

    /// Latest resolution requested by a subscriber, written by the presence handler
    requested: Arc<Mutex<Option<Resolution>>>,

    /// Fixes recorded but not yet published
    pending: Vec<Location>,
    last_recorded: Option<Location>,
    last_published: Option<Location>,
    online: bool,
}

impl SimPublisher {
    /// Connects a publisher for `tracking_id` to the hub behind `realtime`.
    pub fn new(
        realtime: &SimRealtime,
        tracking_id: impl Into<String>,
        route: Route,
        resolution: Resolution,
    ) -> Self {
        let tracking_id = tracking_id.into();
        let realtime = realtime.connect();
        let channel = realtime.channel(&channel_name(&tracking_id), ChannelOptions::default());
        Self {
            client_id: ClientId::new(format!("publisher:{tracking_id}")),
            tracking_id,
            realtime,
            channel,
            route,
            applied: resolution,
            requested: Arc::new(Mutex::new(None)),
            pending: Vec::new(),
            last_recorded: None,
            last_published: None,
            online: false,
        }
    }

    pub fn tracking_id(&self) -> &str {
        &self.tracking_id
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn resolution(&self) -> Resolution {
        self.applied
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn last_published(&self) -> Option<Location> {
        self.last_published
    }

    fn presence_data(&self) -> serde_json::Value {
        PresenceData::publisher(Some(self.applied)).to_value()
    }

    /// Watches subscriber presence and enters as the publisher.
    pub async fn go_online(&mut self) -> Result<(), EnvError> {
        if self.online {
            return Ok(());
        }
        self.realtime.reconnect();

        let requested = Arc::clone(&self.requested);
        self.channel
            .presence_subscribe(Arc::new(move |message: PresenceMessage| {
                let wants_resolution = matches!(
                    message.action,
                    PresenceAction::Enter | PresenceAction::Present | PresenceAction::Update
                );
                if !wants_resolution {
                    return;
                }
                if let Ok(PresenceData {
                    client_type: ClientType::Subscriber,
                    resolution: Some(resolution),
                }) = PresenceData::from_value(&message.data)
                {
                    *requested.lock().unwrap_or_else(PoisonError::into_inner) = Some(resolution);
                }
            }))
            .await?;

        let data = self.presence_data();
        self.channel.presence_enter(&self.client_id, data).await?;
        self.online = true;
        info!(tracking_id = %self.tracking_id, "publisher online");
        Ok(())
    }

    /// Leaves presence gracefully.
    pub async fn go_offline(&mut self) -> Result<(), EnvError> {
        if !self.online {
            return Ok(());
        }
        self.online = false;
        self.channel.presence_unsubscribe();
        self.channel.presence_leave(&self.client_id).await?;
        info!(tracking_id = %self.tracking_id, "publisher offline");
        Ok(())
    }

    /// Loses the connection without leaving; the hub drops the member.
    pub fn drop_connection(&mut self) {
        self.online = false;
        self.channel.presence_unsubscribe();
        self.realtime.disconnect();
        info!(tracking_id = %self.tracking_id, "publisher connection lost");
    }

    /// Adopts the latest subscriber request, re-announcing it via presence.
    ///
    /// # Returns
    /// * `Ok(true)` - the applied resolution changed
    pub async fn sync_resolution(&mut self) -> Result<bool, EnvError> {
        let requested = *self.requested.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(requested) = requested.filter(|r| *r != self.applied) else {
            return Ok(false);
        };
        if !self.online {
            return Ok(false);
        }

        self.applied = requested;
        let data = self.presence_data();
        self.channel.presence_update(&self.client_id, data).await?;
        debug!(tracking_id = %self.tracking_id, resolution = ?requested, "publisher adopted resolution");
        Ok(true)
    }

    /// Takes a fix at `elapsed` along the route.
    ///
    /// Fixes closer than the resolution's minimum displacement to the previous
    /// one are discarded.
    ///
    /// # Returns
    /// * `true` - the fix was kept for the next publish
    pub fn record_fix(&mut self, elapsed: Duration) -> bool {
        let fix = self.route.location_at(elapsed);
        if let Some(previous) = &self.last_recorded {
            if distance_m(previous, &fix) < self.applied.minimum_displacement {
                return false;
            }
        }
        self.last_recorded = Some(fix);
        self.pending.push(fix);
        true
    }

    /// Bundles recorded fixes into one update: the newest as its location,
    /// older ones as skipped locations.
    pub fn take_update(&mut self) -> Option<LocationUpdate> {
        let location = self.pending.pop()?;
        let skipped = std::mem::take(&mut self.pending);
        Some(LocationUpdate::new(location).with_skipped(skipped))
    }

    /// Publishes `update` on both event classes.
    pub fn publish(&mut self, update: &LocationUpdate) -> Result<(), EnvError> {
        let data = serde_json::to_value(update)?;
        let name = self.channel.name().to_string();
        self.realtime.publish(&name, EVENT_ENHANCED, data.clone())?;
        self.realtime.publish(&name, EVENT_RAW, data)?;
        self.last_published = Some(update.location);
        Ok(())
    }
}
