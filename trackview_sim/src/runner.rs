//! Scenario runner - plays a publisher against a subscriber on virtual time.
//!
//! Each run wires one [`SimPublisher`] and one [`Subscriber`] through a
//! [`SimRealtime`] hub and feeds the subscriber's location updates into a
//! [`LocationAnimator`]. Both animator loops are driven by hand, one virtual
//! millisecond at a time:
//!
//! ```text
//!  t ─▶ scenario events ─▶ publisher fixes ─▶ delivery queue ─▶ hub
//!                                                              │
//!        marker ◀── on_display_frame ◀── advance_step ◀── animator
//! ```

use crate::context::SimContext;
use crate::error::SimError;
use crate::exporter::{MarkerFrame, TraceExport, TruthSample};
use crate::publisher::{distance_m, Route, SimPublisher};
use crate::realtime::SimRealtime;
use crate::scenarios::ScenarioId;

use rand_distr::{Distribution, Normal};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use trackview_core::{
    Accuracy, Asset, AnimatorConfig, Location, LocationAnimator, LocationUpdate, Position,
    PositionListener, Resolution, Subscriber, SubscriberConfig,
};
use trackview_env::TrackingContext;

/// Tracking id used by every scenario.
pub const TRACKING_ID: &str = "sim-vehicle";

/// Client id the simulated subscriber enters presence with.
pub const SUBSCRIBER_CLIENT_ID: &str = "trackview-sim";

/// Largest delivery delay drawn in the jitter scenario.
const MAX_JITTER_MS: f64 = 1500.0;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Marker trace, when recording was requested
    pub trace: Option<TraceExport>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    /// Updates the publisher put on the channel
    pub updates_published: u64,

    /// Updates that carried skipped locations
    pub batched_updates: u64,

    /// Updates lost because the publisher was disconnected at delivery time
    pub updates_lost: u64,

    /// Enhanced updates received by the subscriber
    pub updates_received: u64,

    /// Raw updates received by the subscriber
    pub raw_updates_received: u64,

    /// Marker frames shown
    pub frames_emitted: u64,

    /// Display refreshes with no frame while the marker was behind the asset
    pub stalled_frames: u64,

    pub camera_updates: u64,

    /// Online/offline notifications, in order
    pub status_transitions: Vec<bool>,

    /// Publisher resolutions announced to the subscriber
    pub resolution_updates: u64,

    /// Last desired interval announced to the subscriber (ms)
    pub final_interval_ms: u64,

    /// Refresh rate measured by the animator at the end of the run
    pub measured_fps: f64,

    /// Distance between the marker and the last published fix (m)
    pub final_distance_m: f64,
}

impl ScenarioMetrics {
    pub fn stall_ratio(&self) -> f64 {
        let refreshes = self.frames_emitted + self.stalled_frames;
        if refreshes == 0 {
            return 0.0;
        }
        self.stalled_frames as f64 / refreshes as f64
    }
}

/// Scenario-specific knobs.
#[derive(Debug, Clone)]
struct ScenarioPlan {
    refresh_hz: u32,
    jitter: Option<Normal<f64>>,

    /// (period, hold) - the first `hold` ms of every `period` withhold delivery
    burst: Option<(u64, u64)>,

    /// Publisher disconnected in [start, end)
    dropout: Option<(u64, u64)>,

    /// Subscriber change request sent at this time
    renegotiate: Option<(u64, Resolution)>,
}

/// Subscriber-side observations, written by listeners.
#[derive(Default)]
struct Observations {
    updates: AtomicU64,
    raw_updates: AtomicU64,
    camera_updates: AtomicU64,
    resolution_updates: AtomicU64,
    statuses: Mutex<Vec<bool>>,
}

/// Runs playback scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Display refresh rate in Hz
    refresh_hz: u32,

    /// Publisher's initial desired interval in ms
    interval_ms: u64,

    /// Duration in seconds
    duration_secs: f64,

    snap_to_location: bool,
    record_trace: bool,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            refresh_hz: 60,
            interval_ms: 1000,
            duration_secs: 30.0,
            snap_to_location: false,
            record_trace: false,
        }
    }

    /// Sets the display refresh rate.
    pub fn with_refresh_rate(mut self, hz: u32) -> Self {
        self.refresh_hz = hz.max(1);
        self
    }

    /// Sets the publisher's initial desired interval.
    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms.max(1);
        self
    }

    /// Sets the duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_snap_to_location(mut self, snap: bool) -> Self {
        self.snap_to_location = snap;
        self
    }

    /// Records every marker frame into the result's trace.
    pub fn with_trace(mut self, record: bool) -> Self {
        self.record_trace = record;
        self
    }

    fn duration_ms(&self) -> u64 {
        (self.duration_secs.max(0.0) * 1000.0) as u64
    }

    /// Time before the end of the run after which the publisher stops
    /// sampling, so the animator can drain its queue.
    fn settle_ms(&self) -> u64 {
        let expected = AnimatorConfig::default().intentional_animation_delay_ms as u64 + self.interval_ms;
        3 * expected + MAX_JITTER_MS as u64
    }

    fn plan(&self, scenario: ScenarioId) -> ScenarioPlan {
        let active_ms = self.duration_ms().saturating_sub(self.settle_ms());
        let mut plan = ScenarioPlan {
            refresh_hz: scenario.refresh_override().unwrap_or(self.refresh_hz),
            jitter: None,
            burst: None,
            dropout: None,
            renegotiate: None,
        };
        match scenario {
            ScenarioId::Steady | ScenarioId::Throttled => {}
            ScenarioId::Jitter => plan.jitter = Normal::new(300.0, 300.0).ok(),
            ScenarioId::Burst => plan.burst = Some((8000, 3000)),
            ScenarioId::Dropout => plan.dropout = Some((active_ms * 2 / 5, active_ms * 3 / 5)),
            ScenarioId::Renegotiate => {
                let faster = Resolution::new(Accuracy::High, (self.interval_ms / 2).max(1), 1.0);
                plan.renegotiate = Some((active_ms * 3 / 10, faster));
            }
        }
        plan
    }

    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        match self.execute(scenario).await {
            Ok(result) => result,
            Err(err) => ScenarioResult {
                scenario,
                seed: self.seed,
                passed: false,
                final_time_secs: 0.0,
                failure_reason: Some(format!("setup failed: {err}")),
                metrics: ScenarioMetrics::default(),
                trace: None,
            },
        }
    }

    async fn execute(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        let plan = self.plan(scenario);
        let ctx = SimContext::shared(self.seed);
        let hub = SimRealtime::new();
        let initial = Resolution::new(Accuracy::Balanced, self.interval_ms, 1.0);
        let mut trace = self
            .record_trace
            .then(|| TraceExport::new(scenario.name(), self.seed, plan.refresh_hz, self.snap_to_location));

        // Publisher comes first so the subscriber attaches to a live channel
        let mut publisher = SimPublisher::new(&hub, TRACKING_ID, Route::default(), initial);
        publisher.go_online().await?;
        publisher.record_fix(Duration::ZERO);
        let mut metrics = ScenarioMetrics::default();
        if let Some(update) = publisher.take_update() {
            publisher.publish(&update)?;
            record_truth(&mut trace, 0, &update);
            metrics.updates_published += 1;
        }

        let observations = Arc::new(Observations::default());
        let interval = Arc::new(AtomicU64::new(self.interval_ms));
        let animator = Arc::new(self.animator(&observations));
        let subscriber = Subscriber::new(
            Arc::new(hub.connect()),
            SubscriberConfig::default().with_client_id(SUBSCRIBER_CLIENT_ID),
        );
        let asset = subscriber.get(TRACKING_ID, Some(initial));
        attach_listeners(&asset, &animator, &observations, &interval);
        asset.start().await?;

        let duration_ms = self.duration_ms();
        let publish_until = duration_ms.saturating_sub(self.settle_ms());
        let frame_period_ms = 1000.0 / plan.refresh_hz as f64;

        let mut deliveries: VecDeque<(u64, LocationUpdate)> = VecDeque::new();
        let mut last_delivery_at = 0u64;
        let mut next_sample_at = publisher.resolution().desired_interval;
        let mut next_step_at = 0.0f64;
        let mut next_frame_at = 0.0f64;
        let mut marker: Option<Position> = None;
        let mut dropped = false;
        let mut renegotiated = false;

        for t in 0..=duration_ms {
            ctx.advance_to(Duration::from_millis(t));

            // Scenario events
            if let Some((start, end)) = plan.dropout {
                if t == start && !dropped {
                    publisher.drop_connection();
                    dropped = true;
                } else if t == end && dropped {
                    publisher.go_online().await?;
                    next_sample_at = t;
                }
            }
            if let Some((at, resolution)) = plan.renegotiate {
                if t == at && !renegotiated {
                    info!("  Requesting {} ms updates at t={:.1}s", resolution.desired_interval, t as f64 / 1000.0);
                    asset.send_change_request(resolution).await?;
                    renegotiated = true;
                }
            }
            publisher.sync_resolution().await?;

            // Publisher fixes
            if publisher.is_online() && t < publish_until && t >= next_sample_at {
                publisher.record_fix(Duration::from_millis(t));
                next_sample_at = t + publisher.resolution().desired_interval;
            }
            let holding = plan
                .burst
                .is_some_and(|(period, hold)| t % period < hold);
            if !holding {
                if let Some(update) = publisher.take_update() {
                    let delay = plan
                        .jitter
                        .as_ref()
                        .map(|normal| ctx.with_rng(|rng| normal.sample(rng)).clamp(0.0, MAX_JITTER_MS))
                        .unwrap_or(0.0);
                    let deliver_at = last_delivery_at.max(t + delay as u64);
                    last_delivery_at = deliver_at;
                    deliveries.push_back((deliver_at, update));
                }
            }

            // Network
            while deliveries.front().is_some_and(|(at, _)| *at <= t) {
                let Some((_, update)) = deliveries.pop_front() else {
                    break;
                };
                match publisher.publish(&update) {
                    Ok(()) => {
                        metrics.updates_published += 1;
                        if !update.skipped_locations.is_empty() {
                            metrics.batched_updates += 1;
                        }
                        record_truth(&mut trace, t, &update);
                    }
                    Err(err) => {
                        debug!("  update lost at t={}ms: {}", t, err);
                        metrics.updates_lost += 1;
                    }
                }
            }

            // Step loop
            if t as f64 >= next_step_at {
                let delay = animator.advance_step();
                next_step_at = t as f64 + delay.as_secs_f64() * 1000.0;
            }

            // Frame loop
            if t as f64 >= next_frame_at {
                next_frame_at += frame_period_ms;
                match animator.on_display_frame(ctx.now()) {
                    Some(position) => {
                        metrics.frames_emitted += 1;
                        marker = Some(position);
                        if let Some(trace) = trace.as_mut() {
                            trace.add_frame(MarkerFrame {
                                time_ms: t,
                                latitude: position.latitude,
                                longitude: position.longitude,
                                bearing: position.bearing,
                                accuracy: position.accuracy,
                            });
                        }
                    }
                    None => {
                        if publisher.is_online() && is_behind(marker, publisher.last_published()) {
                            metrics.stalled_frames += 1;
                        }
                    }
                }
            }

            if t % 5000 == 0 {
                debug!(
                    "  t={:.1}s | steps={} | frames={} | fps={:.1}",
                    t as f64 / 1000.0,
                    animator.pending_steps(),
                    animator.pending_frames(),
                    animator.current_fps()
                );
            }
        }

        metrics.updates_received = observations.updates.load(Ordering::Relaxed);
        metrics.raw_updates_received = observations.raw_updates.load(Ordering::Relaxed);
        metrics.camera_updates = observations.camera_updates.load(Ordering::Relaxed);
        metrics.resolution_updates = observations.resolution_updates.load(Ordering::Relaxed);
        metrics.final_interval_ms = interval.load(Ordering::Relaxed);
        metrics.measured_fps = animator.current_fps();
        metrics.status_transitions = observations
            .statuses
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        metrics.final_distance_m = match (marker, publisher.last_published()) {
            (Some(marker), Some(truth)) => distance_m(&as_location(&marker), &truth),
            _ => f64::INFINITY,
        };

        if let Err(err) = subscriber.close().await {
            warn!("  subscriber close failed: {}", err);
        }
        animator.stop();

        let failure_reason = self.evaluate(scenario, &plan, &metrics, &publisher).err();
        let passed = failure_reason.is_none();
        if let Some(trace) = trace.as_mut() {
            trace.finalize(passed, Some(metrics.final_distance_m));
        }

        info!(
            "  {} complete: {} updates, {} frames, stall ratio {:.3}, final distance {:.2}m",
            scenario.name(),
            metrics.updates_received,
            metrics.frames_emitted,
            metrics.stall_ratio(),
            metrics.final_distance_m
        );

        Ok(ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            final_time_secs: ctx.now().as_secs_f64(),
            failure_reason,
            metrics,
            trace,
        })
    }

    fn animator(&self, observations: &Arc<Observations>) -> LocationAnimator {
        let config = AnimatorConfig::default().with_snap_to_location(self.snap_to_location);
        let cameras = Arc::clone(observations);
        let marker: PositionListener = Arc::new(|_: Position| {});
        let camera: PositionListener = Arc::new(move |_: Position| {
            cameras.camera_updates.fetch_add(1, Ordering::Relaxed);
        });
        LocationAnimator::new(config, marker, Some(camera))
    }

    /// Checks the scenario's pass criteria.
    fn evaluate(
        &self,
        scenario: ScenarioId,
        plan: &ScenarioPlan,
        metrics: &ScenarioMetrics,
        publisher: &SimPublisher,
    ) -> Result<(), String> {
        if metrics.frames_emitted == 0 {
            return Err("no marker frames emitted".to_string());
        }
        if metrics.updates_received != metrics.updates_published {
            return Err(format!(
                "{} updates published but {} received",
                metrics.updates_published, metrics.updates_received
            ));
        }
        let max_distance_m = 1.0;
        if metrics.final_distance_m > max_distance_m {
            return Err(format!(
                "marker {:.2}m from last fix exceeds {:.1}m",
                metrics.final_distance_m, max_distance_m
            ));
        }

        let smooth = !self.snap_to_location;
        match scenario {
            ScenarioId::Steady => {
                expect_transitions(metrics, &[true])?;
                if smooth && metrics.stall_ratio() > 0.01 {
                    return Err(format!("stall ratio {:.3} exceeds 0.01", metrics.stall_ratio()));
                }
            }
            ScenarioId::Jitter => {
                if smooth && metrics.stall_ratio() > 0.05 {
                    return Err(format!("stall ratio {:.3} exceeds 0.05", metrics.stall_ratio()));
                }
            }
            ScenarioId::Burst => {
                if metrics.batched_updates == 0 {
                    return Err("no batched updates were delivered".to_string());
                }
            }
            ScenarioId::Dropout => {
                expect_transitions(metrics, &[true, false, true])?;
            }
            ScenarioId::Renegotiate => {
                let wanted = plan
                    .renegotiate
                    .map(|(_, r)| r.desired_interval)
                    .unwrap_or(self.interval_ms);
                if publisher.resolution().desired_interval != wanted {
                    return Err(format!(
                        "publisher interval {}ms, requested {}ms",
                        publisher.resolution().desired_interval,
                        wanted
                    ));
                }
                if metrics.final_interval_ms != wanted {
                    return Err(format!(
                        "subscriber saw interval {}ms, requested {}ms",
                        metrics.final_interval_ms, wanted
                    ));
                }
            }
            ScenarioId::Throttled => {
                let expected = plan.refresh_hz as f64;
                if (metrics.measured_fps - expected).abs() > 2.0 {
                    return Err(format!(
                        "measured {:.1} fps, display runs at {:.0}",
                        metrics.measured_fps, expected
                    ));
                }
            }
        }
        Ok(())
    }
}

fn attach_listeners(
    asset: &Asset<SimRealtime>,
    animator: &Arc<LocationAnimator>,
    observations: &Arc<Observations>,
    interval: &Arc<AtomicU64>,
) {
    let (obs, anim, ms) = (Arc::clone(observations), Arc::clone(animator), Arc::clone(interval));
    asset.add_location_listener(Arc::new(move |update: LocationUpdate| {
        obs.updates.fetch_add(1, Ordering::Relaxed);
        anim.animate_location_update(&update, ms.load(Ordering::Relaxed));
    }));

    let obs = Arc::clone(observations);
    asset.add_raw_location_listener(Arc::new(move |_: LocationUpdate| {
        obs.raw_updates.fetch_add(1, Ordering::Relaxed);
    }));

    let obs = Arc::clone(observations);
    asset.add_status_listener(Arc::new(move |online: bool| {
        debug!("  publisher {}", if online { "online" } else { "offline" });
        if let Ok(mut statuses) = obs.statuses.lock() {
            statuses.push(online);
        }
    }));

    let obs = Arc::clone(observations);
    asset.add_resolution_listener(Arc::new(move |_: Resolution| {
        obs.resolution_updates.fetch_add(1, Ordering::Relaxed);
    }));

    let ms = Arc::clone(interval);
    asset.add_location_update_interval_listener(Arc::new(move |interval_ms: u64| {
        ms.store(interval_ms, Ordering::Relaxed);
    }));
}

fn expect_transitions(metrics: &ScenarioMetrics, expected: &[bool]) -> Result<(), String> {
    if metrics.status_transitions != expected {
        return Err(format!(
            "status transitions {:?}, expected {:?}",
            metrics.status_transitions, expected
        ));
    }
    Ok(())
}

fn record_truth(trace: &mut Option<TraceExport>, time_ms: u64, update: &LocationUpdate) {
    if let Some(trace) = trace.as_mut() {
        trace.add_truth(TruthSample {
            time_ms,
            latitude: update.location.latitude,
            longitude: update.location.longitude,
            skipped: update.skipped_locations.len(),
        });
    }
}

fn as_location(position: &Position) -> Location {
    Location::new(position.latitude, position.longitude, position.bearing, position.accuracy)
}

/// Whether the marker still has ground to cover towards the last fix.
fn is_behind(marker: Option<Position>, truth: Option<Location>) -> bool {
    match (marker, truth) {
        (Some(marker), Some(truth)) => distance_m(&as_location(&marker), &truth) > 1.0,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ScenarioRunner {
        ScenarioRunner::new(42).with_duration(25.0)
    }

    #[tokio::test]
    async fn test_steady_scenario_passes() {
        let result = ScenarioRunner::new(42).run(ScenarioId::Steady).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.camera_updates > 0);
        assert_eq!(
            result.metrics.raw_updates_received,
            result.metrics.updates_received
        );
    }

    #[tokio::test]
    async fn test_snap_mode_lands_on_last_fix() {
        let result = runner()
            .with_snap_to_location(true)
            .run(ScenarioId::Steady)
            .await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.final_distance_m < 1e-6);
    }

    #[tokio::test]
    async fn test_dropout_reports_offline_then_online() {
        let result = runner().run(ScenarioId::Dropout).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.status_transitions, vec![true, false, true]);
    }

    #[tokio::test]
    async fn test_burst_delivers_skipped_locations() {
        let result = runner().run(ScenarioId::Burst).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.batched_updates > 0);
    }

    #[tokio::test]
    async fn test_trace_records_frames() {
        let result = runner().with_trace(true).run(ScenarioId::Throttled).await;
        let trace = result.trace.expect("trace requested");
        assert_eq!(trace.refresh_hz, 30);
        assert_eq!(trace.frames.len() as u64, result.metrics.frames_emitted);
        assert!(!trace.truth.is_empty());
    }

    #[tokio::test]
    async fn test_same_seed_same_result() {
        let a = runner().run(ScenarioId::Jitter).await;
        let b = runner().run(ScenarioId::Jitter).await;
        assert_eq!(a.metrics.frames_emitted, b.metrics.frames_emitted);
        assert_eq!(a.metrics.stalled_frames, b.metrics.stalled_frames);
        assert_eq!(a.metrics.final_distance_m, b.metrics.final_distance_m);
    }
}
