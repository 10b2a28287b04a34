//! JSON exporter for marker traces.
//!
//! Exports every emitted marker frame plus the ground-truth fixes the
//! publisher sent, so playback can be plotted offline.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// One marker position shown on the display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerFrame {
    /// Virtual time in milliseconds
    pub time_ms: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub bearing: f64,
    pub accuracy: f64,
}

/// One fix published by the simulated asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruthSample {
    pub time_ms: u64,
    pub latitude: f64,
    pub longitude: f64,

    /// Fixes carried as skipped locations alongside this one
    #[serde(skip_serializing_if = "is_zero", default)]
    pub skipped: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Complete scenario trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    pub refresh_hz: u32,
    pub snap_to_location: bool,

    /// Duration in seconds
    pub duration_sec: f64,

    pub frames: Vec<MarkerFrame>,
    pub truth: Vec<TruthSample>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_distance_m: Option<f64>,
}

impl TraceExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64, refresh_hz: u32, snap_to_location: bool) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            refresh_hz,
            snap_to_location,
            duration_sec: 0.0,
            frames: Vec::new(),
            truth: Vec::new(),
            passed: false,
            final_distance_m: None,
        }
    }

    pub fn add_frame(&mut self, frame: MarkerFrame) {
        self.duration_sec = frame.time_ms as f64 / 1000.0;
        self.frames.push(frame);
    }

    pub fn add_truth(&mut self, sample: TruthSample) {
        self.truth.push(sample);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, final_distance_m: Option<f64>) {
        self.passed = passed;
        self.final_distance_m = final_distance_m;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
