// SPDX-License-Identifier: GPL-3.0-only

//! Capture, stitch and annotate
//!
//! This crate captures the visible screen or a whole scrolling page, stitches
//! viewport tiles into one seam-free raster and provides an annotation editor
//! with bounded undo/redo. A D-Bus service exposes the command bus to
//! external programs.

pub mod cancel;
pub mod dbus;
pub mod editor;
pub mod error;
pub mod error_handling;
pub mod export;
pub mod history;
pub mod notifications;
pub mod page;
pub mod protocol;
pub mod recording;
pub mod render;
pub mod scene;
pub mod screenshot;
pub mod settings;
pub mod stitch;
pub mod store;
pub mod tools;

// Re-export main types for easier usage
pub use cancel::CancellationToken;
pub use editor::{Editor, EditorOp, SeedOutcome};
pub use error::{BusError, CaptureError, ExportError, HistoryError, RecordingError, StoreError};
pub use page::{PageDriver, PageMetrics};
pub use protocol::{Background, Command, Response};
pub use screenshot::{CaptureRegion, CaptureRequest, ScreenshotManager, ScreenshotProvider, ScreenshotResult};
pub use settings::CaptureSettings;
pub use stitch::pipeline::{FullPageCapture, FullPageImage};

/// The current version of the capture-studio library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
