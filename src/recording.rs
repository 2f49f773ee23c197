// SPDX-License-Identifier: GPL-3.0-only

//! Screen recording session lifecycle
//!
//! Media capture itself belongs to the host; this tracks which phase the
//! session is in, the elapsed-time counter shown on the controller and the
//! `isRecording` flag other contexts read from the shared state.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::RecordingError;
use crate::store::{keys, StateStore, StateStoreExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordingState {
    #[default]
    Idle,
    /// Waiting for the user to pick what to share
    AwaitingPermission,
    Recording,
    Paused,
    Finished,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::AwaitingPermission => "awaiting permission",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Finished => "finished",
        })
    }
}

/// `mm:ss`, with minutes growing past two digits for long sessions
#[must_use]
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Default)]
pub struct RecordingSession {
    state: RecordingState,
    elapsed: u64,
    muted: bool,
    video_url: Option<String>,
    store: Option<Arc<dyn StateStore>>,
}

impl fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingSession")
            .field("state", &self.state)
            .field("elapsed", &self.elapsed)
            .field("muted", &self.muted)
            .field("video_url", &self.video_url)
            .finish_non_exhaustive()
    }
}

impl RecordingSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror the recording flag into `store`
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn state(&self) -> RecordingState {
        self.state
    }

    #[must_use]
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    #[must_use]
    pub fn timer_label(&self) -> String {
        format_elapsed(self.elapsed)
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
    }

    #[must_use]
    pub fn video_url(&self) -> Option<&str> {
        self.video_url.as_deref()
    }

    fn transition(
        &mut self,
        action: &'static str,
        allowed: &[RecordingState],
        next: RecordingState,
    ) -> Result<(), RecordingError> {
        if !allowed.contains(&self.state) {
            return Err(RecordingError::InvalidTransition {
                state: self.state,
                action,
            });
        }
        info!(from = %self.state, to = %next, "recording session");
        self.state = next;
        Ok(())
    }

    /// Ask the host for a capture stream
    ///
    /// # Errors
    /// `InvalidTransition` unless idle or finished
    pub fn request_start(&mut self) -> Result<(), RecordingError> {
        self.transition(
            "start recording",
            &[RecordingState::Idle, RecordingState::Finished],
            RecordingState::AwaitingPermission,
        )?;
        self.elapsed = 0;
        self.video_url = None;
        Ok(())
    }

    /// # Errors
    /// `InvalidTransition` unless awaiting permission
    pub fn permission_granted(&mut self) -> Result<(), RecordingError> {
        self.transition(
            "begin recording",
            &[RecordingState::AwaitingPermission],
            RecordingState::Recording,
        )?;
        self.elapsed = 0;
        self.mirror(true);
        Ok(())
    }

    /// The user declined or cancelled the share prompt
    ///
    /// # Errors
    /// `InvalidTransition` unless awaiting permission
    pub fn permission_denied(&mut self) -> Result<(), RecordingError> {
        self.transition(
            "cancel the permission prompt",
            &[RecordingState::AwaitingPermission],
            RecordingState::Idle,
        )
    }

    /// # Errors
    /// `InvalidTransition` unless recording
    pub fn pause(&mut self) -> Result<(), RecordingError> {
        self.transition("pause", &[RecordingState::Recording], RecordingState::Paused)
    }

    /// # Errors
    /// `InvalidTransition` unless paused
    pub fn resume(&mut self) -> Result<(), RecordingError> {
        self.transition("resume", &[RecordingState::Paused], RecordingState::Recording)
    }

    /// Discard what was recorded so far and keep going from zero
    ///
    /// # Errors
    /// `InvalidTransition` unless recording or paused
    pub fn restart(&mut self) -> Result<(), RecordingError> {
        self.transition(
            "restart",
            &[RecordingState::Recording, RecordingState::Paused],
            RecordingState::Recording,
        )?;
        self.elapsed = 0;
        Ok(())
    }

    /// # Errors
    /// `InvalidTransition` unless recording or paused
    pub fn stop(&mut self) -> Result<(), RecordingError> {
        self.transition(
            "stop",
            &[RecordingState::Recording, RecordingState::Paused],
            RecordingState::Finished,
        )?;
        self.mirror(false);
        Ok(())
    }

    /// Attach the finished recording
    ///
    /// # Errors
    /// `InvalidTransition` unless finished
    pub fn set_video(&mut self, url: impl Into<String>) -> Result<(), RecordingError> {
        if self.state != RecordingState::Finished {
            return Err(RecordingError::InvalidTransition {
                state: self.state,
                action: "attach a video",
            });
        }
        self.video_url = Some(url.into());
        Ok(())
    }

    /// Advance the timer by one second. Only counts while recording.
    pub fn tick(&mut self) {
        if self.state == RecordingState::Recording {
            self.elapsed += 1;
        }
    }

    /// Back to idle from anywhere, dropping the recorded video
    pub fn reset(&mut self) {
        if matches!(self.state, RecordingState::Recording | RecordingState::Paused) {
            self.mirror(false);
        }
        self.state = RecordingState::Idle;
        self.elapsed = 0;
        self.video_url = None;
    }

    fn mirror(&self, recording: bool) {
        let Some(store) = &self.store else {
            return;
        };
        let result = if recording {
            store.set(keys::IS_RECORDING, &true)
        } else {
            store.remove(keys::IS_RECORDING)
        };
        if let Err(err) = result {
            warn!(error = %err, "failed to persist recording flag");
        }
    }
}
