// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use capture_studio::page::{ElementId, FixedElement};
use capture_studio::{
    CancellationToken, CaptureError, CaptureRequest, CaptureSettings, FullPageCapture, PageDriver,
    PageMetrics, ScreenshotProvider, ScreenshotResult,
};
use image::{ImageFormat, Rgba, RgbaImage};
use rstest::rstest;

const WIDTH: f64 = 40.0;
const VIEWPORT: f64 = 100.0;
const HEADER: ElementId = ElementId(1);
const FOOTER: ElementId = ElementId(2);
const HEADER_COLOR: Rgba<u8> = Rgba([255, 0, 0, 200]);
const FOOTER_COLOR: Rgba<u8> = Rgba([0, 0, 255, 201]);
const OVERLAY_COLOR: Rgba<u8> = Rgba([0, 255, 0, 202]);

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn px(css: f64, dpr: f64) -> u32 {
    (css * dpr).round() as u32
}

/// Every document row carries its own index so misplaced rows show up
fn document_pixel(x: u32, y: u32) -> Rgba<u8> {
    Rgba([(y % 256) as u8, (y / 256) as u8, (x % 256) as u8, 255])
}

#[derive(Debug, Default)]
struct PageState {
    scroll_y: f64,
    hidden: HashSet<ElementId>,
    overlays_hidden: bool,
    scrollbars_hidden: bool,
    progress: Option<String>,
    progress_log: Vec<String>,
    hide_calls: usize,
    captured_with_overlays: usize,
    captured_with_scrollbars: usize,
}

struct SyntheticPage {
    height: f64,
    dpr: f64,
    reported_body_height: Option<f64>,
    progress_broken: bool,
    document: RgbaImage,
    fixed: Vec<FixedElement>,
    state: Mutex<PageState>,
}

impl SyntheticPage {
    fn new(height: f64, dpr: f64) -> Self {
        let document = RgbaImage::from_fn(px(WIDTH, dpr), px(height, dpr), document_pixel);
        Self {
            height,
            dpr,
            reported_body_height: None,
            progress_broken: false,
            document,
            fixed: vec![
                FixedElement {
                    id: HEADER,
                    top: 0.0,
                    bottom: 10.0,
                },
                FixedElement {
                    id: FOOTER,
                    top: 90.0,
                    bottom: 100.0,
                },
            ],
            state: Mutex::new(PageState::default()),
        }
    }

    fn scrolled_to(self, y: f64) -> Self {
        self.state.lock().unwrap().scroll_y = y;
        self
    }

    fn max_scroll(&self) -> f64 {
        (self.height - VIEWPORT).max(0.0)
    }

    /// What the browser would paint in the viewport right now
    fn render(&self) -> RgbaImage {
        let mut state = self.state.lock().unwrap();
        if !state.overlays_hidden {
            state.captured_with_overlays += 1;
        }
        if !state.scrollbars_hidden {
            state.captured_with_scrollbars += 1;
        }

        let tile_top = px(state.scroll_y, self.dpr);
        let mut tile = RgbaImage::from_fn(self.document.width(), px(VIEWPORT, self.dpr), |x, y| {
            let row = tile_top + y;
            if row < self.document.height() {
                *self.document.get_pixel(x, row)
            } else {
                Rgba([0, 0, 0, 0])
            }
        });

        let mut paint = |top: f64, bottom: f64, color: Rgba<u8>| {
            for y in px(top, self.dpr)..px(bottom, self.dpr).min(tile.height()) {
                for x in 0..tile.width() {
                    tile.put_pixel(x, y, color);
                }
            }
        };
        for element in &self.fixed {
            if state.hidden.contains(&element.id) {
                continue;
            }
            let color = if element.id == HEADER { HEADER_COLOR } else { FOOTER_COLOR };
            paint(element.top, element.bottom, color);
        }
        if !state.overlays_hidden {
            paint(40.0, 50.0, OVERLAY_COLOR);
        }
        tile
    }

    fn assert_restored(&self, scroll_y: f64) {
        let state = self.state.lock().unwrap();
        assert_eq!(state.scroll_y, scroll_y);
        assert!(state.hidden.is_empty(), "still hidden: {:?}", state.hidden);
        assert!(!state.overlays_hidden);
        assert!(!state.scrollbars_hidden);
        assert_eq!(state.progress, None);
    }
}

#[async_trait]
impl PageDriver for SyntheticPage {
    async fn metrics(&self) -> Result<PageMetrics, CaptureError> {
        let mut metrics = PageMetrics::uniform(WIDTH, self.height, WIDTH, VIEWPORT, self.dpr);
        if let Some(body) = self.reported_body_height {
            metrics.body_height.scroll = body;
            metrics.body_height.offset = body;
            metrics.body_height.client = body;
        }
        metrics.scroll_y = self.state.lock().unwrap().scroll_y;
        Ok(metrics)
    }

    async fn scroll_to(&self, _x: f64, y: f64) -> Result<f64, CaptureError> {
        let actual = y.clamp(0.0, self.max_scroll());
        self.state.lock().unwrap().scroll_y = actual;
        Ok(actual)
    }

    async fn fixed_elements(&self) -> Result<Vec<FixedElement>, CaptureError> {
        Ok(self.fixed.clone())
    }

    async fn set_element_hidden(&self, id: ElementId, hidden: bool) -> Result<(), CaptureError> {
        let mut state = self.state.lock().unwrap();
        if hidden {
            state.hide_calls += 1;
            state.hidden.insert(id);
        } else {
            state.hidden.remove(&id);
        }
        Ok(())
    }

    async fn set_overlays_hidden(&self, hidden: bool) -> Result<(), CaptureError> {
        self.state.lock().unwrap().overlays_hidden = hidden;
        Ok(())
    }

    async fn set_scrollbars_hidden(&self, hidden: bool) -> Result<(), CaptureError> {
        self.state.lock().unwrap().scrollbars_hidden = hidden;
        Ok(())
    }

    async fn show_progress(&self, message: &str) -> Result<(), CaptureError> {
        if self.progress_broken {
            return Err(CaptureError::Page("progress overlay rejected".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.progress = Some(message.to_string());
        state.progress_log.push(message.to_string());
        Ok(())
    }

    async fn remove_progress(&self) -> Result<(), CaptureError> {
        self.state.lock().unwrap().progress = None;
        Ok(())
    }
}

/// Screenshot provider that photographs the synthetic page
struct Camera {
    page: Arc<SyntheticPage>,
    calls: AtomicUsize,
    fail_at: Option<usize>,
    delay: Option<Duration>,
    cancel_after_first: Option<CancellationToken>,
}

impl Camera {
    fn new(page: Arc<SyntheticPage>) -> Self {
        Self {
            page,
            calls: AtomicUsize::new(0),
            fail_at: None,
            delay: None,
            cancel_after_first: None,
        }
    }
}

#[async_trait]
impl ScreenshotProvider for Camera {
    async fn is_available(&self) -> bool {
        true
    }

    async fn capture(&self, _request: &CaptureRequest) -> Result<ScreenshotResult, CaptureError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_at == Some(call) {
            return Err(CaptureError::Portal("permission denied".to_string()));
        }
        if let Some(token) = &self.cancel_after_first {
            token.cancel();
        }

        let mut data = Vec::new();
        self.page
            .render()
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)?;
        Ok(ScreenshotResult::from_png(data))
    }

    fn name(&self) -> &'static str {
        "camera"
    }
}

fn settings() -> CaptureSettings {
    CaptureSettings {
        header_threshold: 20.0,
        footer_threshold: 20.0,
        step_timeout_ms: 2_000,
        ..CaptureSettings::immediate()
    }
}

fn pipeline(page: &Arc<SyntheticPage>, camera: Camera, settings: CaptureSettings) -> FullPageCapture {
    FullPageCapture::new(page.clone(), Arc::new(camera), settings)
}

#[rstest]
#[case(1.0)]
#[case(1.25)]
#[case(2.0)]
#[tokio::test]
async fn stitched_output_matches_the_document(#[case] dpr: f64) {
    let page = Arc::new(SyntheticPage::new(300.0, dpr).scrolled_to(37.0));
    let capture = pipeline(&page, Camera::new(page.clone()), settings());

    let result = capture
        .capture_full_page(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.steps, vec![0.0, 85.0, 170.0, 200.0]);
    assert_eq!(result.scale, dpr);
    assert_eq!(result.image.dimensions(), (px(WIDTH, dpr), px(300.0, dpr)));

    // Header once at the very top, footer once at the very bottom
    let header_end = px(10.0, dpr);
    let footer_start = px(200.0, dpr) + px(90.0, dpr);
    for y in 0..result.image.height() {
        let expected = if y < header_end {
            HEADER_COLOR
        } else if y >= footer_start {
            FOOTER_COLOR
        } else {
            document_pixel(0, y)
        };
        assert_eq!(*result.image.get_pixel(0, y), expected, "row {y} at dpr {dpr}");
    }

    page.assert_restored(37.0);
    let state = page.state.lock().unwrap();
    assert_eq!(state.captured_with_overlays, 0);
    assert_eq!(state.captured_with_scrollbars, 0);
    assert_eq!(state.progress_log.first().map(String::as_str), Some("Initializing Full Page Capture..."));
    assert_eq!(state.progress_log.last().map(String::as_str), Some("Capturing... 100%"));
    drop(state);
    assert!(!capture.is_running());
}

#[tokio::test]
async fn single_tile_page_keeps_all_chrome() {
    let page = Arc::new(SyntheticPage::new(80.0, 1.0));
    let capture = pipeline(&page, Camera::new(page.clone()), settings());

    let result = capture
        .capture_full_page(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.steps, vec![0.0]);
    assert_eq!(result.image.height(), 80);
    assert_eq!(*result.image.get_pixel(0, 5), HEADER_COLOR);
    assert_eq!(*result.image.get_pixel(0, 60), document_pixel(0, 60));
    assert_eq!(page.state.lock().unwrap().hide_calls, 0);
    page.assert_restored(0.0);
}

#[tokio::test]
async fn disagreeing_measurements_use_the_tallest() {
    let mut page = SyntheticPage::new(300.0, 1.0);
    page.reported_body_height = Some(120.0);
    let page = Arc::new(page);
    let capture = pipeline(&page, Camera::new(page.clone()), settings());

    let result = capture
        .capture_full_page(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.image.height(), 300);
    assert_eq!(*result.image.get_pixel(3, 150), document_pixel(3, 150));
}

#[tokio::test]
async fn provider_failure_aborts_and_restores_the_page() {
    let page = Arc::new(SyntheticPage::new(300.0, 1.0).scrolled_to(12.0));
    let camera = Camera {
        fail_at: Some(2),
        ..Camera::new(page.clone())
    };
    let capture = pipeline(&page, camera, settings());

    let err = capture
        .capture_full_page(&CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        CaptureError::FullPage { step, source } => {
            assert_eq!(step, 2);
            assert!(matches!(*source, CaptureError::Portal(_)));
        }
        other => panic!("unexpected error {other:?}"),
    }
    page.assert_restored(12.0);
    assert!(!capture.is_running());
}

#[tokio::test]
async fn cancellation_stops_before_the_next_step() {
    let token = CancellationToken::new();
    let page = Arc::new(SyntheticPage::new(300.0, 1.0).scrolled_to(50.0));
    let camera = Camera {
        cancel_after_first: Some(token.clone()),
        ..Camera::new(page.clone())
    };
    let capture = pipeline(&page, camera, settings());

    let err = capture.capture_full_page(&token).await.unwrap_err();

    assert!(matches!(err, CaptureError::Cancelled));
    page.assert_restored(50.0);
}

#[tokio::test]
async fn setup_failure_is_reported_as_a_full_page_failure() {
    let mut page = SyntheticPage::new(300.0, 1.0).scrolled_to(25.0);
    page.progress_broken = true;
    let page = Arc::new(page);
    let capture = pipeline(&page, Camera::new(page.clone()), settings());

    let err = capture
        .capture_full_page(&CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.user_facing(), "Full-page capture failed at section 1.");
    match err {
        CaptureError::FullPage { step, source } => {
            assert_eq!(step, 0);
            assert!(matches!(*source, CaptureError::Page(_)));
        }
        other => panic!("unexpected error {other:?}"),
    }
    page.assert_restored(25.0);
    assert_eq!(page.state.lock().unwrap().captured_with_overlays, 0);
}

#[tokio::test]
async fn slow_provider_times_out() {
    let page = Arc::new(SyntheticPage::new(300.0, 1.0));
    let camera = Camera {
        delay: Some(Duration::from_secs(5)),
        ..Camera::new(page.clone())
    };
    let settings = CaptureSettings {
        step_timeout_ms: 50,
        ..settings()
    };
    let capture = pipeline(&page, camera, settings);

    let err = capture
        .capture_full_page(&CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        CaptureError::FullPage { step, source } => {
            assert_eq!(step, 0);
            assert!(matches!(*source, CaptureError::Timeout("capturing the viewport")));
        }
        other => panic!("unexpected error {other:?}"),
    }
    page.assert_restored(0.0);
}

#[tokio::test]
async fn second_capture_is_rejected_while_one_runs() {
    let page = Arc::new(SyntheticPage::new(300.0, 1.0));
    let camera = Camera {
        delay: Some(Duration::from_millis(100)),
        ..Camera::new(page.clone())
    };
    let capture = Arc::new(pipeline(&page, camera, settings()));

    let first = tokio::spawn({
        let capture = Arc::clone(&capture);
        async move { capture.capture_full_page(&CancellationToken::new()).await }
    });
    while !capture.is_running() {
        tokio::task::yield_now().await;
    }

    let err = capture
        .capture_full_page(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::Busy));

    let result = first.await.unwrap().unwrap();
    assert_eq!(result.image.height(), 300);
    assert!(!capture.is_running());
}
