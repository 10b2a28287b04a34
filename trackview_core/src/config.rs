//! Configuration for subscribers and animators.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`Subscriber`](crate::Subscriber).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Local participant identity used for presence enter/update/leave.
    /// Required to start tracking.
    pub client_id: Option<String>,

    /// Messages replayed when a tracking channel attaches (default: 1, the
    /// latest location, so a new session renders the asset immediately)
    pub rewind: Option<u32>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            rewind: Some(1),
        }
    }
}

impl SubscriberConfig {
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_rewind(mut self, rewind: Option<u32>) -> Self {
        self.rewind = rewind;
        self
    }
}

/// Configuration for a [`LocationAnimator`](crate::LocationAnimator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimatorConfig {
    /// Buffer added to the expected playback time of each update so the
    /// marker keeps moving when the next update arrives late (default: 2000 ms)
    pub intentional_animation_delay_ms: f64,

    /// Number of advanced steps between camera re-centering requests
    /// (default: 15). Lower values move the camera more often.
    pub camera_update_step_interval: u32,

    /// Delay before re-checking an empty step queue (default: 50 ms)
    pub idle_loop_delay_ms: u64,

    /// Trailing window over which display refreshes are counted (default: 1 s)
    pub fps_window_ms: u64,

    /// Refresh rate assumed until a full window has been measured (default: 60)
    pub nominal_fps: u32,

    /// Disable smoothing: markers jump straight to each new position
    pub snap_to_location: bool,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            intentional_animation_delay_ms: 2000.0,
            camera_update_step_interval: 15,
            idle_loop_delay_ms: 50,
            fps_window_ms: 1000,
            nominal_fps: 60,
            snap_to_location: false,
        }
    }
}

impl AnimatorConfig {
    pub fn with_snap_to_location(mut self, snap: bool) -> Self {
        self.snap_to_location = snap;
        self
    }

    pub fn with_intentional_delay_ms(mut self, delay_ms: f64) -> Self {
        self.intentional_animation_delay_ms = delay_ms;
        self
    }

    pub fn with_camera_update_step_interval(mut self, steps: u32) -> Self {
        self.camera_update_step_interval = steps;
        self
    }

    pub fn idle_loop_delay(&self) -> Duration {
        Duration::from_millis(self.idle_loop_delay_ms)
    }

    pub fn fps_window(&self) -> Duration {
        Duration::from_millis(self.fps_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_animator_config_default() {
        let config = AnimatorConfig::default();
        assert_eq!(config.intentional_animation_delay_ms, 2000.0);
        assert_eq!(config.camera_update_step_interval, 15);
        assert_eq!(config.idle_loop_delay(), Duration::from_millis(50));
        assert_eq!(config.fps_window(), Duration::from_secs(1));
        assert!(!config.snap_to_location);
    }

    #[test]
    fn test_partial_config_from_json() {
        let config: AnimatorConfig =
            serde_json::from_str(r#"{"snap_to_location": true, "nominal_fps": 30}"#).unwrap();
        assert!(config.snap_to_location);
        assert_eq!(config.nominal_fps, 30);
        assert_eq!(config.camera_update_step_interval, 15);

        let subscriber: SubscriberConfig = serde_json::from_str(r#"{"client_id": "web-1"}"#).unwrap();
        assert_eq!(subscriber.client_id.as_deref(), Some("web-1"));
        assert_eq!(subscriber.rewind, Some(1));
    }
}
