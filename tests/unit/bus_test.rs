// SPDX-License-Identifier: GPL-3.0-only

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use capture_studio::page::{ElementId, FixedElement};
use capture_studio::protocol::apply_to_editor;
use capture_studio::recording::RecordingState;
use capture_studio::scene::{Color, Point};
use capture_studio::store::{self, keys, MemoryStore, StateStore, StateStoreExt};
use capture_studio::tools::Tool;
use capture_studio::{
    Background, BusError, CaptureError, CaptureRequest, CaptureSettings, Command, Editor, EditorOp,
    FullPageCapture, PageDriver, PageMetrics, Response, ScreenshotProvider, ScreenshotResult,
};
use image::{ImageFormat, Rgba, RgbaImage};
use serde_json::Value;

const VIEWPORT: (u32, u32) = (20, 30);

/// Returns a flat viewport-sized raster, or nothing when `broken`
struct FakeProvider {
    broken: bool,
    delay: Option<Duration>,
}

#[async_trait]
impl ScreenshotProvider for FakeProvider {
    async fn is_available(&self) -> bool {
        !self.broken
    }

    async fn capture(&self, _request: &CaptureRequest) -> Result<ScreenshotResult, CaptureError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.broken {
            return Err(CaptureError::Unavailable);
        }
        let image = RgbaImage::from_pixel(VIEWPORT.0, VIEWPORT.1, Rgba([200, 100, 50, 255]));
        let mut data = Vec::new();
        image.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)?;
        Ok(ScreenshotResult::from_png(data))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// A 50 px tall page with no fixed chrome
struct FlatPage;

#[async_trait]
impl PageDriver for FlatPage {
    async fn metrics(&self) -> Result<PageMetrics, CaptureError> {
        Ok(PageMetrics::uniform(
            f64::from(VIEWPORT.0),
            50.0,
            f64::from(VIEWPORT.0),
            f64::from(VIEWPORT.1),
            1.0,
        ))
    }

    async fn scroll_to(&self, _x: f64, y: f64) -> Result<f64, CaptureError> {
        Ok(y.clamp(0.0, 20.0))
    }

    async fn fixed_elements(&self) -> Result<Vec<FixedElement>, CaptureError> {
        Ok(Vec::new())
    }

    async fn set_element_hidden(&self, _id: ElementId, _hidden: bool) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn set_overlays_hidden(&self, _hidden: bool) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn set_scrollbars_hidden(&self, _hidden: bool) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn show_progress(&self, _message: &str) -> Result<(), CaptureError> {
        Ok(())
    }

    async fn remove_progress(&self) -> Result<(), CaptureError> {
        Ok(())
    }
}

fn background(broken: bool) -> (Background, Arc<MemoryStore>) {
    background_with(FakeProvider {
        broken,
        delay: None,
    })
}

fn background_with(provider: FakeProvider) -> (Background, Arc<MemoryStore>) {
    let state = Arc::new(MemoryStore::new());
    let background = Background::new(
        Arc::new(provider),
        Arc::clone(&state) as Arc<dyn StateStore>,
    );
    (background, state)
}

fn with_page(background: Background) -> Background {
    let capture = FullPageCapture::new(
        Arc::new(FlatPage),
        Arc::clone(background.provider()),
        CaptureSettings::immediate(),
    );
    background.with_full_page(Arc::new(capture))
}

async fn dispatch(background: &Background, json: &str) -> Value {
    serde_json::from_str(&background.dispatch_json(json).await).unwrap()
}

#[tokio::test]
async fn visible_tab_comes_back_as_data_url() {
    let (background, _) = background(false);

    let response = dispatch(&background, r#"{"action":"captureVisibleTab"}"#).await;

    assert_eq!(response["status"], "captured");
    let url = response["dataUrl"].as_str().unwrap();
    assert!(url.starts_with("data:image/png;base64,"));
    let png = store::decode_data_url(url).unwrap();
    let image = image::load_from_memory(&png).unwrap();
    assert_eq!((image.width(), image.height()), VIEWPORT);
}

#[tokio::test]
async fn failed_capture_reports_a_readable_error() {
    let (background, _) = background(true);

    let response = dispatch(&background, r#"{"action":"captureVisibleTab"}"#).await;

    assert_eq!(response["status"], "error");
    assert_eq!(
        response["message"],
        "The screen could not be captured. Check capture permissions."
    );
}

#[tokio::test]
async fn drawing_tool_is_persisted_with_default_colour_and_forwarded() {
    let (background, state) = background(false);
    let mut page_context = background.subscribe();

    let response = background
        .dispatch(Command::SetDrawingTool {
            tool: Tool::Arrow,
            color: None,
        })
        .await
        .unwrap();

    assert_eq!(response, Response::Forwarded { receivers: 1 });
    assert_eq!(state.get::<Tool>(keys::CURRENT_TOOL).unwrap(), Some(Tool::Arrow));
    assert_eq!(state.get_raw(keys::CURRENT_COLOR).unwrap().as_deref(), Some("\"#00d4ff\""));
    assert_eq!(
        page_context.try_recv().unwrap(),
        Command::SetDrawingTool {
            tool: Tool::Arrow,
            color: None
        }
    );
}

#[tokio::test]
async fn stop_recording_clears_the_flag() {
    let (background, state) = background(false);
    state.set(keys::IS_RECORDING, &true).unwrap();

    let response = dispatch(&background, r#"{"action":"stopRecording"}"#).await;

    assert_eq!(response["status"], "forwarded");
    assert_eq!(response["receivers"], 0);
    assert_eq!(state.get::<bool>(keys::IS_RECORDING).unwrap(), None);
}

#[tokio::test]
async fn recording_session_follows_the_bus() {
    let (background, state) = background(false);

    background.dispatch(Command::StartRecording).await.unwrap();
    assert_eq!(background.recording_status().0, RecordingState::AwaitingPermission);
    assert_eq!(
        background.recording_permission(true).unwrap(),
        RecordingState::Recording
    );
    assert_eq!(state.get::<bool>(keys::IS_RECORDING).unwrap(), Some(true));

    for _ in 0..65 {
        background.tick_recording();
    }
    assert_eq!(
        background.recording_status(),
        (RecordingState::Recording, "01:05".to_string())
    );

    let response = dispatch(&background, r#"{"action":"startRecording"}"#).await;
    assert_eq!(response["status"], "error");
    assert_eq!(response["message"], "cannot start recording while recording");

    background.dispatch(Command::StopRecording).await.unwrap();
    assert_eq!(background.recording_status().0, RecordingState::Finished);
    assert_eq!(state.get::<bool>(keys::IS_RECORDING).unwrap(), None);
}

#[tokio::test]
async fn denied_permission_returns_to_idle() {
    let (background, state) = background(false);

    background.dispatch(Command::StartRecording).await.unwrap();
    assert_eq!(background.recording_permission(false).unwrap(), RecordingState::Idle);
    assert!(background.recording_permission(true).is_err());
    assert_eq!(state.get::<bool>(keys::IS_RECORDING).unwrap(), None);
}

#[tokio::test]
async fn record_studio_keeps_the_video_url() {
    let (background, state) = background(false);
    let mut page_context = background.subscribe();

    dispatch(&background, r#"{"action":"openRecordStudio","videoUrl":"blob:take-2"}"#).await;

    assert_eq!(
        state.get::<String>(keys::CAPTURED_VIDEO).unwrap().as_deref(),
        Some("blob:take-2")
    );
    assert!(matches!(
        page_context.try_recv().unwrap(),
        Command::OpenRecordStudio { .. }
    ));
}

#[tokio::test]
async fn full_page_needs_a_page_context() {
    let (background, _) = background(false);

    let response = dispatch(&background, r#"{"action":"startFullPageCapture"}"#).await;

    assert_eq!(response["status"], "error");
    assert_eq!(
        response["message"],
        "full-page capture is not available in this context"
    );
}

#[tokio::test]
async fn full_page_capture_is_handed_to_the_studio() {
    let (background, state) = background(false);
    let background = with_page(background);
    let mut page_context = background.subscribe();

    let response = background
        .dispatch(Command::StartFullPageCapture)
        .await
        .unwrap();

    assert_eq!(
        response,
        Response::FullPage {
            width: 20,
            height: 50,
            steps: 2
        }
    );
    assert_eq!(page_context.try_recv().unwrap(), Command::OpenStudio);

    let mut editor = Editor::default();
    let outcome = editor.seed_from_store(state.as_ref()).unwrap();
    assert_eq!(
        outcome,
        capture_studio::SeedOutcome::Image {
            width: 20,
            height: 50
        }
    );
    assert!(!background.cancel_capture());
}

#[tokio::test]
async fn rejected_capture_leaves_the_running_one_cancellable() {
    let (background, _) = background_with(FakeProvider {
        broken: false,
        delay: Some(Duration::from_millis(300)),
    });
    let background = Arc::new(with_page(background));

    let first = tokio::spawn({
        let background = Arc::clone(&background);
        async move { background.dispatch(Command::StartFullPageCapture).await }
    });
    while !background.is_capturing() {
        tokio::task::yield_now().await;
    }

    let response = dispatch(&background, r#"{"action":"startFullPageCapture"}"#).await;
    assert_eq!(response["status"], "error");
    assert_eq!(response["message"], "A full-page capture is already running.");
    assert!(background.is_capturing());

    assert!(background.cancel_capture());
    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(err, BusError::Capture(CaptureError::Cancelled)), "{err:?}");
    assert!(!background.is_capturing());
    assert!(!background.cancel_capture());
}

#[tokio::test]
async fn malformed_commands_are_answered_not_dropped() {
    let (background, _) = background(false);

    for json in ["not json", r#"{"action":"selfDestruct"}"#, r#"{"tool":"arrow"}"#] {
        let response = dispatch(&background, json).await;
        assert_eq!(response["status"], "error", "{json}");
        assert!(response["message"]
            .as_str()
            .unwrap()
            .starts_with("malformed command"));
    }
}

#[test]
fn page_context_applies_forwarded_drawing_commands() {
    let mut other = Editor::default();
    other.set_tool(Tool::Rectangle);
    other
        .apply(&EditorOp::Drag {
            from: Point::new(5.0, 5.0),
            to: Point::new(40.0, 30.0),
        })
        .unwrap();

    let mut editor = Editor::default();
    let red = Color::rgb(255, 0, 0);
    let sync = Command::SyncDrawing {
        drawing_data: other.snapshot().unwrap(),
        current_color: Some(red),
    };
    assert!(apply_to_editor(&mut editor, &sync).unwrap());
    assert_eq!(editor.scene().objects, other.scene().objects);
    assert_eq!(editor.color(), red);

    let tool = Command::SetDrawingTool {
        tool: Tool::Pencil,
        color: None,
    };
    assert!(apply_to_editor(&mut editor, &tool).unwrap());
    assert_eq!(editor.tool(), Tool::Pencil);
    assert_eq!(editor.color(), red);

    assert!(apply_to_editor(&mut editor, &Command::ClearDrawingCanvas).unwrap());
    assert!(editor.scene().objects.is_empty());

    assert!(!apply_to_editor(&mut editor, &Command::OpenStudio).unwrap());

    let broken = Command::SyncDrawing {
        drawing_data: "{".to_string(),
        current_color: None,
    };
    assert!(apply_to_editor(&mut editor, &broken).is_err());
}
