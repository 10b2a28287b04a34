//! Location Animator - smooth marker playback between location updates.
//!
//! Updates arrive every few seconds, in batches, and sometimes late. The
//! animator turns them into a steady stream of marker positions:
//!
//! ```text
//!  LocationUpdate ──▶ steps ──(step loop, one per step duration)──▶ frames
//!                                                                     │
//!                        marker ◀──(frame loop, one per refresh)──────┘
//!                        camera ◀── every N steps
//! ```
//!
//! [`AnimationQueue`] holds the pure state machine and is driven with
//! explicit timestamps. [`LocationAnimator`] owns one queue plus the two
//! perpetual loops that drive it on a [`TrackingContext`] and [`FrameClock`].

use crate::config::AnimatorConfig;
use crate::fps::FpsMonitor;
use crate::listeners::PositionListener;
use crate::location::{Location, LocationUpdate, Position};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, trace};
use trackview_env::{FrameClock, TaskHandle, TrackingContext};

// ============================================================================
// INTERPOLATION
// ============================================================================

/// Linear interpolation between `start` and `end`.
pub fn interpolate_linear(start: f64, end: f64, fraction: f64) -> f64 {
    (end - start) * fraction + start
}

/// Moves along the straight line from `start` to `end` by `fraction`.
///
/// Accuracy is interpolated too; the bearing is always the end bearing.
pub fn interpolate_position(start: &Position, end: &Position, fraction: f64) -> Position {
    Position {
        latitude: interpolate_linear(start.latitude, end.latitude, fraction),
        longitude: interpolate_linear(start.longitude, end.longitude, fraction),
        bearing: end.bearing,
        accuracy: interpolate_linear(start.accuracy, end.accuracy, fraction),
    }
}

// ============================================================================
// ANIMATION QUEUE
// ============================================================================

/// Longest stretch of a single step that is expanded into frames. Longer
/// steps reach their end position after this many seconds of playback.
pub const MAX_STEP_FRAME_SECS: f64 = 600.0;

/// Movement between two consecutive positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationStep {
    pub start: Position,
    pub end: Position,
    pub duration_ms: f64,
}

impl AnimationStep {
    /// Wall-clock duration, zero when the stored duration is not usable.
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_ms / 1000.0).unwrap_or_default()
    }
}

/// Outcome of one step-loop iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepAdvance {
    /// No step was pending.
    Idle,

    /// A step was expanded into the frame buffer.
    Advanced {
        /// How long to wait before advancing again
        delay: Duration,

        /// Position to move the camera to, when it is due
        camera: Option<Position>,
    },
}

/// Pending steps and frames of one animated marker.
#[derive(Debug, Clone)]
pub struct AnimationQueue {
    config: AnimatorConfig,
    steps: VecDeque<AnimationStep>,
    frames: VecDeque<Position>,

    /// End position of the most recently queued step
    previous_final_position: Option<Position>,

    steps_since_camera_update: u32,
    fps: FpsMonitor,
}

impl AnimationQueue {
    pub fn new(config: AnimatorConfig) -> Self {
        let fps = FpsMonitor::new(config.fps_window(), config.nominal_fps);
        Self {
            config,
            steps: VecDeque::new(),
            frames: VecDeque::new(),
            previous_final_position: None,
            steps_since_camera_update: 0,
            fps,
        }
    }

    pub fn config(&self) -> &AnimatorConfig {
        &self.config
    }

    pub fn set_snap_to_location(&mut self, snap: bool) {
        self.config.snap_to_location = snap;
    }

    pub fn set_intentional_delay_ms(&mut self, delay_ms: f64) {
        self.config.intentional_animation_delay_ms = delay_ms;
    }

    pub fn set_camera_update_step_interval(&mut self, steps: u32) {
        self.config.camera_update_step_interval = steps;
    }

    pub fn pending_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn steps(&self) -> impl Iterator<Item = &AnimationStep> {
        self.steps.iter()
    }

    pub fn current_fps(&self) -> f64 {
        self.fps.fps()
    }

    /// Turns `update` into steps and re-times the whole queue.
    ///
    /// Every queued step gets an equal share of
    /// `intentional_animation_delay_ms + interval_ms`. In snap mode the new
    /// steps replace whatever was still pending.
    pub fn ingest(&mut self, update: &LocationUpdate, interval_ms: u64) {
        let positions: Vec<Position> = update.path().map(Location::position).collect();
        let Some(&first) = positions.first() else {
            return;
        };

        if self.config.snap_to_location {
            self.steps.clear();
        }

        let mut start = self.previous_final_position.unwrap_or(first);
        for end in positions {
            self.steps.push_back(AnimationStep {
                start,
                end,
                duration_ms: 0.0,
            });
            start = end;
        }

        let expected_ms = self.config.intentional_animation_delay_ms + interval_ms as f64;
        let step_ms = expected_ms / self.steps.len() as f64;
        for step in self.steps.iter_mut() {
            step.duration_ms = step_ms;
        }
        self.previous_final_position = Some(start);

        trace!(
            pending_steps = self.steps.len(),
            step_ms,
            "queued location update"
        );
    }

    /// Pops the next step and replaces the frame buffer with its frames.
    ///
    /// The camera position is reported every `camera_update_step_interval`
    /// steps, only if `camera_registered`; otherwise the count keeps running.
    pub fn advance_step(&mut self, camera_registered: bool) -> StepAdvance {
        let Some(step) = self.steps.pop_front() else {
            return StepAdvance::Idle;
        };

        self.steps_since_camera_update = self.steps_since_camera_update.saturating_add(1);
        self.frames = self.expand(&step);

        let camera = if camera_registered
            && self.steps_since_camera_update >= self.config.camera_update_step_interval
        {
            self.steps_since_camera_update = 0;
            Some(step.end)
        } else {
            None
        };

        StepAdvance::Advanced {
            delay: step.duration(),
            camera,
        }
    }

    /// Frames for one step at the currently measured refresh rate.
    fn expand(&self, step: &AnimationStep) -> VecDeque<Position> {
        if self.config.snap_to_location {
            return VecDeque::from([step.end]);
        }

        let fps = self.fps.fps();
        let frame_count = step.duration_ms / 1000.0 * fps;
        if !frame_count.is_finite() || frame_count < 1.0 {
            return VecDeque::from([step.end]);
        }
        let frame_count = frame_count.min(MAX_STEP_FRAME_SECS * fps);

        let last = frame_count.floor() as usize;
        (0..=last)
            .map(|index| interpolate_position(&step.start, &step.end, index as f64 / frame_count))
            .collect()
    }

    /// Records a display refresh and pops the frame to show, if any.
    pub fn next_frame(&mut self, timestamp: Duration) -> Option<Position> {
        self.fps.record(timestamp);
        self.frames.pop_front()
    }

    /// Drops pending steps and frames. The last queued end position is kept
    /// so the next update continues from it.
    pub fn clear(&mut self) {
        self.steps.clear();
        self.frames.clear();
    }
}

// ============================================================================
// LOCATION ANIMATOR
// ============================================================================

struct AnimatorCore {
    queue: Mutex<AnimationQueue>,
    marker: PositionListener,
    camera: Mutex<Option<PositionListener>>,
}

impl AnimatorCore {
    fn queue(&self) -> MutexGuard<'_, AnimationQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn camera(&self) -> Option<PositionListener> {
        self.camera
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn on_display_frame(&self, timestamp: Duration) -> Option<Position> {
        let frame = self.queue().next_frame(timestamp);
        if let Some(position) = frame {
            notify("marker", &self.marker, position);
        }
        frame
    }

    fn advance_step(&self) -> Duration {
        let camera = self.camera();
        let (advance, idle) = {
            let mut queue = self.queue();
            (
                queue.advance_step(camera.is_some()),
                queue.config().idle_loop_delay(),
            )
        };

        match advance {
            StepAdvance::Idle => idle,
            StepAdvance::Advanced { delay, camera: due } => {
                if let (Some(listener), Some(position)) = (camera, due) {
                    notify("camera", &listener, position);
                }
                delay
            }
        }
    }
}

/// Calls a map listener; a panic is logged and does not end the loop.
fn notify(kind: &'static str, listener: &PositionListener, position: Position) {
    if panic::catch_unwind(AssertUnwindSafe(|| listener(position))).is_err() {
        error!(kind, "map listener panicked");
    }
}

/// Animates one map marker (and optionally the camera) from location updates.
///
/// # Usage
///
/// ```ignore
/// let animator = LocationAnimator::new(AnimatorConfig::default(), marker, Some(camera));
/// animator.start(TokioContext::shared(), TokioFrameClock::shared(60));
///
/// asset.add_location_listener(Arc::new(move |update| {
///     animator.animate_location_update(&update, interval_ms);
/// }));
/// ```
pub struct LocationAnimator {
    core: Arc<AnimatorCore>,
    tasks: Mutex<Vec<TaskHandle>>,
}

impl LocationAnimator {
    pub fn new(
        config: AnimatorConfig,
        marker: PositionListener,
        camera: Option<PositionListener>,
    ) -> Self {
        Self {
            core: Arc::new(AnimatorCore {
                queue: Mutex::new(AnimationQueue::new(config)),
                marker,
                camera: Mutex::new(camera),
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<TaskHandle>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the frame loop and the step loop. No-op if already running.
    ///
    /// # Arguments
    /// * `ctx` - schedules both loops and provides the step-loop sleeps
    /// * `clock` - resolves once per display refresh
    pub fn start<Ctx, Clk>(&self, ctx: Arc<Ctx>, clock: Arc<Clk>)
    where
        Ctx: TrackingContext,
        Clk: FrameClock,
    {
        let mut tasks = self.tasks();
        if !tasks.is_empty() {
            return;
        }

        let core = Arc::clone(&self.core);
        let frame_loop = ctx.spawn("animation-frames", async move {
            loop {
                let timestamp = clock.next_frame().await;
                core.on_display_frame(timestamp);
            }
        });

        let core = Arc::clone(&self.core);
        let sleeper = Arc::clone(&ctx);
        let step_loop = ctx.spawn("animation-steps", async move {
            loop {
                let delay = core.advance_step();
                sleeper.sleep(delay).await;
            }
        });

        tasks.push(frame_loop);
        tasks.push(step_loop);
        debug!("location animator started");
    }

    /// Aborts both loops. Safe to call repeatedly; also invoked on drop.
    pub fn stop(&self) {
        let mut tasks = self.tasks();
        if tasks.is_empty() {
            return;
        }
        for task in tasks.drain(..) {
            task.abort();
        }
        debug!("location animator stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.tasks().is_empty()
    }

    /// Queues a location update for playback.
    ///
    /// # Arguments
    /// * `update` - the update, including any skipped locations
    /// * `interval_ms` - the publisher's expected interval until the next update
    pub fn animate_location_update(&self, update: &LocationUpdate, interval_ms: u64) {
        self.core.queue().ingest(update, interval_ms);
    }

    /// Runs one frame-loop iteration: shows the next frame, if any.
    pub fn on_display_frame(&self, timestamp: Duration) -> Option<Position> {
        self.core.on_display_frame(timestamp)
    }

    /// Runs one step-loop iteration and returns the delay until the next one.
    pub fn advance_step(&self) -> Duration {
        self.core.advance_step()
    }

    pub fn set_snap_to_location(&self, snap: bool) {
        self.core.queue().set_snap_to_location(snap);
    }

    pub fn set_intentional_delay_ms(&self, delay_ms: f64) {
        self.core.queue().set_intentional_delay_ms(delay_ms);
    }

    pub fn set_camera_update_step_interval(&self, steps: u32) {
        self.core.queue().set_camera_update_step_interval(steps);
    }

    pub fn set_camera_listener(&self, camera: Option<PositionListener>) {
        *self
            .core
            .camera
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = camera;
    }

    pub fn pending_steps(&self) -> usize {
        self.core.queue().pending_steps()
    }

    pub fn pending_frames(&self) -> usize {
        self.core.queue().pending_frames()
    }

    pub fn current_fps(&self) -> f64 {
        self.core.queue().current_fps()
    }
}

impl Drop for LocationAnimator {
    fn drop(&mut self) {
        self.stop();
    }
}
