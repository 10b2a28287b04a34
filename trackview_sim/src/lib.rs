//! TrackView deterministic playback harness
//!
//! Runs a simulated publisher and a real [`trackview_core::Subscriber`]
//! against an in-process realtime hub, on virtual time, so marker playback
//! can be checked end to end without a network or a display.
//!
//! # Core Principle
//!
//! Every source of non-determinism is owned by the harness:
//! - **Time**: a virtual clock advanced one millisecond at a time
//! - **Network**: the [`SimRealtime`] hub, with scripted delays and dropouts
//! - **Randomness**: all entropy derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  enhanced/raw  ┌───────────┐  updates  ┌──────────────────┐
//! │ SimPublisher │───────────────►│ SimRealtime│─────────►│ Subscriber/Asset │
//! │   (Route)    │◄───────────────│    hub     │◄─────────│                  │
//! └──────────────┘    presence    └───────────┘  presence └────────┬─────────┘
//!                                                                  ▼
//!                                                         LocationAnimator
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use trackview_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::Jitter).await;
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod publisher;
mod realtime;
mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{MarkerFrame, TraceExport, TruthSample};
pub use publisher::{distance_m, Route, SimPublisher};
pub use realtime::{SimChannel, SimRealtime, SimStats};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner, SUBSCRIBER_CLIENT_ID, TRACKING_ID};
