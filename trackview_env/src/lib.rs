//! TrackView Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seams that let the tracking engine run
//! against a hosted realtime service in **Production** (tokio) and against an
//! in-memory broker in **Simulation**.
//!
//! # Seams
//!
//! - Transport: `RealtimeClient` / `RealtimeChannel` (data + presence)
//! - Time and tasks: `TrackingContext` (`now()`, `sleep()`, `spawn()`)
//! - Display refresh: `FrameClock` (one callback per rendered frame)
//!
//! # Example
//!
//! ```ignore
//! use trackview_env::{RealtimeChannel, RealtimeClient, ChannelOptions};
//!
//! async fn watch<C: RealtimeClient>(client: &C) {
//!     let channel = client.channel("tracking:van-7", ChannelOptions::with_rewind(1));
//!     channel
//!         .subscribe("enhanced", Arc::new(|msg| println!("{:?}", msg.data)))
//!         .await?;
//! }
//! ```

mod context;
mod error;
mod realtime;
mod tokio_impl;
mod types;

pub use context::{FrameClock, TaskHandle, TrackingContext};
pub use error::EnvError;
pub use realtime::{MessageHandler, PresenceHandler, RealtimeChannel, RealtimeClient};
pub use tokio_impl::{TokioContext, TokioFrameClock};
pub use types::{ChannelMessage, ChannelOptions, ClientId, PresenceAction, PresenceMessage};
