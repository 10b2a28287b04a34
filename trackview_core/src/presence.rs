//! Publisher presence interpretation.
//!
//! Turns raw presence events into the status and resolution notifications
//! a tracking session emits:
//!
//! | action             | publisher role                     |
//! |--------------------|------------------------------------|
//! | `enter`            | online (+ resolution if present)   |
//! | `present`          | online once (+ resolution)         |
//! | `update`           | resolution if present              |
//! | `leave` / `absent` | offline                            |
//!
//! Members with any other role never produce notifications.

use crate::error::Result;
use crate::types::{PresenceData, Resolution};
use trackview_env::{PresenceAction, PresenceMessage};

/// A notification derived from one presence event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PresenceEvent {
    Online,
    Offline,
    PublisherResolution(Resolution),
}

/// Last publisher status observed on one channel.
///
/// `present` events are inventory replays; they announce "online" only when
/// listeners have not already been told the publisher is online. `enter`
/// always announces.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    publisher_online: Option<bool>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last status announced, `None` before any publisher event.
    pub fn publisher_online(&self) -> Option<bool> {
        self.publisher_online
    }

    /// Forgets the publisher status (new session).
    pub fn reset(&mut self) {
        self.publisher_online = None;
    }

    /// Records that listeners were told the publisher is offline.
    pub fn mark_offline(&mut self) {
        self.publisher_online = Some(false);
    }

    /// Interprets one presence event.
    ///
    /// # Returns
    /// * `Ok(events)` - notifications to emit, in order (possibly none)
    /// * `Err(TrackingError::MalformedPayload)` - the member data is unreadable
    pub fn interpret(&mut self, message: &PresenceMessage) -> Result<Vec<PresenceEvent>> {
        let data = PresenceData::from_value(&message.data)?;
        if !data.is_publisher() {
            return Ok(Vec::new());
        }

        let mut events = Vec::with_capacity(2);
        match message.action {
            PresenceAction::Enter => {
                self.publisher_online = Some(true);
                events.push(PresenceEvent::Online);
            }
            PresenceAction::Present => {
                if self.publisher_online != Some(true) {
                    self.publisher_online = Some(true);
                    events.push(PresenceEvent::Online);
                }
            }
            PresenceAction::Leave | PresenceAction::Absent => {
                self.publisher_online = Some(false);
                events.push(PresenceEvent::Offline);
            }
            PresenceAction::Update => {}
        }

        let carries_resolution = matches!(
            message.action,
            PresenceAction::Enter | PresenceAction::Present | PresenceAction::Update
        );
        if carries_resolution {
            if let Some(resolution) = data.resolution {
                events.push(PresenceEvent::PublisherResolution(resolution));
            }
        }

        Ok(events)
    }
}
