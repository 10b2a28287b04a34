//! Errors raised while setting up or driving a scenario.

use thiserror::Error;
use trackview_core::TrackingError;
use trackview_env::EnvError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Transport error: {0}")]
    Transport(#[from] EnvError),
}
