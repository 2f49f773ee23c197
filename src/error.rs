// SPDX-License-Identifier: GPL-3.0-only

use std::io;

use thiserror::Error;

/// Errors raised by screenshot providers and the full-page capture pipeline.
///
/// The primary purpose of the helpers on this type is to provide simple user
/// facing messages.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The provider denied the request or answered with no image data
    #[error("screenshot provider returned no image data")]
    Unavailable,
    /// A step of the capture sequence did not finish in time
    #[error("timed out while {0}")]
    Timeout(&'static str),
    /// The capture was cancelled between two steps
    #[error("capture cancelled")]
    Cancelled,
    /// Another full-page capture is already running
    #[error("a full-page capture is already in progress")]
    Busy,
    /// No provider is available for the request
    #[error("no screenshot provider available")]
    NotAvailable,
    /// The page driver failed to scroll, measure or toggle elements
    #[error("page error: {0}")]
    Page(String),
    /// Screenshot portal errors
    #[error("portal error: {0}")]
    Portal(String),
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// A single step of a full-page capture failed, aborting the whole capture
    #[error("full-page capture failed at step {step}: {source}")]
    FullPage {
        step: usize,
        #[source]
        source: Box<CaptureError>,
    },
}

impl CaptureError {
    /// Wrap a per-step failure so it is reported as a full-page failure.
    ///
    /// Cancellation and the busy guard pass through untouched.
    #[must_use]
    pub fn at_step(self, step: usize) -> Self {
        match self {
            Self::Cancelled | Self::Busy | Self::FullPage { .. } => self,
            other => Self::FullPage {
                step,
                source: Box::new(other),
            },
        }
    }

    /// Capture request cancelled
    #[must_use]
    pub fn cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Rejected because a capture was already in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Failure belongs to a full-page run rather than a single viewport capture
    #[must_use]
    pub fn is_full_page(&self) -> bool {
        matches!(self, Self::FullPage { .. })
    }

    /// Condensed error message for end users
    #[must_use]
    pub fn user_facing(&self) -> String {
        match self {
            _ if self.cancelled() => "Capture was cancelled.".to_string(),
            _ if self.is_busy() => "A full-page capture is already running.".to_string(),
            Self::FullPage { step, source } => match source.as_ref() {
                Self::Timeout(what) => {
                    format!("Full-page capture timed out at section {} while {what}.", step + 1)
                }
                _ => format!("Full-page capture failed at section {}.", step + 1),
            },
            Self::Unavailable | Self::NotAvailable => {
                "The screen could not be captured. Check capture permissions.".to_string()
            }
            _ => "Screenshot failed.".to_string(),
        }
    }
}

/// Errors restoring a Scene from a history snapshot
#[derive(Error, Debug)]
pub enum HistoryError {
    /// The snapshot could not be parsed back into a Scene
    #[error("history snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    /// The snapshot references an image that is not in the asset table
    #[error("history snapshot references unknown image {0}")]
    MissingAsset(u64),
}

/// Errors from the persisted key/value state
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("config error: {0}")]
    Config(String),
    #[error("value for `{key}` is malformed: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{0}` is not a PNG data URL")]
    NotDataUrl(String),
    #[error("data URL payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
    /// The seeded scene could not be recorded as the history baseline
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Errors raised while exporting a flattened Scene
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("no directory to export into")]
    MissingSaveDirectory,
    #[error("export sink failed: {0}")]
    Sink(String),
}

/// Errors raised by the command bus
#[derive(Error, Debug)]
pub enum BusError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("malformed command: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("full-page capture is not available in this context")]
    NoPageContext,
    #[error(transparent)]
    Recording(#[from] RecordingError),
}

/// Errors raised by the recording session state machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: crate::recording::RecordingState,
        action: &'static str,
    },
}
