// SPDX-License-Identifier: GPL-3.0-only

//! Message bus between the background service and page contexts
//!
//! Commands are a closed set tagged by `action`. [`Background`] owns the
//! capture provider and the shared state; anything it does not handle
//! itself is fanned out to every subscribed page context.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::editor::Editor;
use crate::error::{BusError, CaptureError, HistoryError, RecordingError};
use crate::recording::{RecordingSession, RecordingState};
use crate::scene::Color;
use crate::screenshot::{CaptureRegion, CaptureRequest, ScreenshotProvider};
use crate::stitch::pipeline::FullPageCapture;
use crate::store::{self, keys, StateStore, StateStoreExt};
use crate::tools::Tool;

/// Commands queued for page contexts before they are dropped
const FORWARD_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    CaptureVisibleTab {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        area: Option<CaptureRegion>,
    },
    StartSelection,
    StartFullPageCapture,
    StartRecording,
    StopRecording,
    OpenStudio,
    OpenRecordStudio {
        #[serde(rename = "videoUrl")]
        video_url: String,
    },
    SetDrawingTool {
        tool: Tool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<Color>,
    },
    ClearDrawingCanvas,
    SyncDrawing {
        #[serde(rename = "drawingData")]
        drawing_data: String,
        #[serde(
            rename = "currentColor",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        current_color: Option<Color>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Response {
    Ok,
    Captured {
        #[serde(rename = "dataUrl")]
        data_url: String,
    },
    /// A full-page raster was stored under `capturedImage`
    FullPage { width: u32, height: u32, steps: usize },
    Forwarded { receivers: usize },
    Error { message: String },
}

pub struct Background {
    provider: Arc<dyn ScreenshotProvider>,
    store: Arc<dyn StateStore>,
    full_page: Option<Arc<FullPageCapture>>,
    running: Mutex<Option<CancellationToken>>,
    recording: Mutex<RecordingSession>,
    sender: broadcast::Sender<Command>,
}

impl Background {
    #[must_use]
    pub fn new(provider: Arc<dyn ScreenshotProvider>, store: Arc<dyn StateStore>) -> Self {
        let (sender, _) = broadcast::channel(FORWARD_CAPACITY);
        let recording = RecordingSession::new().with_store(Arc::clone(&store));
        Self {
            provider,
            store,
            full_page: None,
            running: Mutex::new(None),
            recording: Mutex::new(recording),
            sender,
        }
    }

    /// Enable `startFullPageCapture` against a page
    #[must_use]
    pub fn with_full_page(mut self, capture: Arc<FullPageCapture>) -> Self {
        self.full_page = Some(capture);
        self
    }

    /// Receive every command forwarded to page contexts
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Command> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ScreenshotProvider> {
        &self.provider
    }

    /// A full-page capture started from the bus is still running
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Cancel the running full-page capture, if any. It stops before its
    /// next step and restores the page.
    pub fn cancel_capture(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(CancellationToken::cancel)
            .is_some()
    }

    fn with_recording<T>(&self, f: impl FnOnce(&mut RecordingSession) -> T) -> T {
        let mut session = self.recording.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut session)
    }

    /// Current recording phase and its `mm:ss` timer label
    #[must_use]
    pub fn recording_status(&self) -> (RecordingState, String) {
        self.with_recording(|session| (session.state(), session.timer_label()))
    }

    /// The host answered the share prompt opened by `startRecording`
    ///
    /// # Errors
    /// `InvalidTransition` if no prompt is pending
    pub fn recording_permission(&self, granted: bool) -> Result<RecordingState, RecordingError> {
        self.with_recording(|session| {
            if granted {
                session.permission_granted()?;
            } else {
                session.permission_denied()?;
            }
            Ok(session.state())
        })
    }

    /// One second of wall time passed on the recording controller
    pub fn tick_recording(&self) {
        self.with_recording(RecordingSession::tick);
    }

    fn forward(&self, command: Command) -> Response {
        let receivers = self.sender.send(command).unwrap_or(0);
        debug!(receivers, "forwarded command to page contexts");
        Response::Forwarded { receivers }
    }

    /// Decode a JSON command, run it and encode the response. Failures are
    /// reported as `Response::Error`.
    pub async fn dispatch_json(&self, json: &str) -> String {
        let response = match serde_json::from_str::<Command>(json) {
            Ok(command) => self
                .dispatch(command)
                .await
                .unwrap_or_else(|err| Response::Error {
                    message: user_message(&err),
                }),
            Err(err) => Response::Error {
                message: BusError::from(err).to_string(),
            },
        };
        serde_json::to_string(&response).unwrap_or_else(|err| {
            warn!(error = %err, "failed to encode bus response");
            r#"{"status":"error","message":"internal error"}"#.to_string()
        })
    }

    /// # Errors
    /// * `BusError::Capture` if a capture fails
    /// * `BusError::Store` if the shared state cannot be written
    /// * `BusError::NoPageContext` for a full-page capture without a page
    pub async fn dispatch(&self, command: Command) -> Result<Response, BusError> {
        match command {
            Command::CaptureVisibleTab { area } => {
                let request = area.map_or_else(CaptureRequest::visible, CaptureRequest::region);
                let shot = self.provider.capture(&request).await?.non_empty()?;
                Ok(Response::Captured {
                    data_url: store::encode_data_url(&shot.image_data),
                })
            }
            Command::StartFullPageCapture => self.full_page_capture().await,
            Command::SetDrawingTool { tool, color } => {
                self.store.set(keys::CURRENT_TOOL, &tool)?;
                self.store
                    .set(keys::CURRENT_COLOR, &color.unwrap_or(Color::ACCENT))?;
                Ok(self.forward(Command::SetDrawingTool { tool, color }))
            }
            Command::StartRecording => {
                self.with_recording(RecordingSession::request_start)?;
                Ok(self.forward(Command::StartRecording))
            }
            Command::StopRecording => {
                let active = self.with_recording(|session| {
                    matches!(session.state(), RecordingState::Recording | RecordingState::Paused)
                        .then(|| session.stop())
                        .transpose()
                })?;
                if active.is_none() {
                    // Nothing running here, clear a flag left behind by a crashed session
                    self.store.remove(keys::IS_RECORDING)?;
                }
                Ok(self.forward(Command::StopRecording))
            }
            Command::OpenRecordStudio { video_url } => {
                self.store.set(keys::CAPTURED_VIDEO, &video_url)?;
                self.with_recording(|session| {
                    if session.state() == RecordingState::Finished {
                        if let Err(err) = session.set_video(video_url.as_str()) {
                            warn!(error = %err, "could not attach the recording");
                        }
                    }
                });
                Ok(self.forward(Command::OpenRecordStudio { video_url }))
            }
            command @ (Command::StartSelection
            | Command::OpenStudio
            | Command::ClearDrawingCanvas
            | Command::SyncDrawing { .. }) => Ok(self.forward(command)),
        }
    }

    async fn full_page_capture(&self) -> Result<Response, BusError> {
        let capture = self.full_page.as_ref().ok_or(BusError::NoPageContext)?;

        let token = CancellationToken::new();
        {
            let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            if running.is_some() {
                return Err(CaptureError::Busy.into());
            }
            *running = Some(token.clone());
        }
        let result = capture.capture_full_page(&token).await;
        {
            let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            // Only the run that installed the token may clear it
            if running.as_ref().is_some_and(|current| current.same_as(&token)) {
                running.take();
            }
        }

        let page = result?;
        let png = page.to_png()?;
        self.store
            .set(keys::CAPTURED_IMAGE, &store::encode_data_url(&png))?;
        info!(
            width = page.image.width(),
            height = page.image.height(),
            "stored full-page capture"
        );
        self.forward(Command::OpenStudio);

        Ok(Response::FullPage {
            width: page.image.width(),
            height: page.image.height(),
            steps: page.steps.len(),
        })
    }
}

fn user_message(err: &BusError) -> String {
    match err {
        BusError::Capture(capture) => capture.user_facing(),
        other => other.to_string(),
    }
}

/// Apply a forwarded command to a page context's drawing layer. Returns
/// `true` if the editor changed.
///
/// # Errors
/// Returns `HistoryError` if a synced drawing cannot be restored; the editor
/// is unchanged in that case
pub fn apply_to_editor(editor: &mut Editor, command: &Command) -> Result<bool, HistoryError> {
    match command {
        Command::SetDrawingTool { tool, color } => {
            editor.set_tool(*tool);
            if let Some(color) = color {
                editor.set_color(*color);
            }
            Ok(true)
        }
        Command::ClearDrawingCanvas => editor.clear_annotations(),
        Command::SyncDrawing {
            drawing_data,
            current_color,
        } => {
            editor.apply_remote_snapshot(drawing_data)?;
            if let Some(color) = current_color {
                editor.set_color(*color);
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}
