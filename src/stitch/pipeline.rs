// SPDX-License-Identifier: GPL-3.0-only

//! Scroll-and-shoot full-page capture
//!
//! Steps run strictly in order: the anti-seam cursor on the accumulator
//! only holds if tile N is composited before tile N+1 is requested. Every
//! page mutation is recorded on the session so cleanup can revert it on
//! success, failure and cancellation alike.

use std::collections::BTreeSet;
use std::future::Future;
use std::io::{self, Cursor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::{ImageFormat, RgbaImage};
use tracing::{debug, info, warn};

use super::{plan_scroll_steps, StitchCanvas, VisibilityFilter};
use crate::cancel::CancellationToken;
use crate::error::CaptureError;
use crate::page::{ChromeClassifier, ElementId, PageDriver, PageMetrics};
use crate::report_warning;
use crate::screenshot::{CaptureRequest, ScreenshotProvider};
use crate::settings::CaptureSettings;

/// The finished full-page raster
#[derive(Debug, Clone)]
pub struct FullPageImage {
    pub image: RgbaImage,
    /// Scroll targets that were visited, in CSS pixels
    pub steps: Vec<f64>,
    /// Device pixel ratio the raster was captured at
    pub scale: f64,
}

impl FullPageImage {
    /// Encode the raster as PNG
    ///
    /// # Errors
    /// Returns `CaptureError::Image` if encoding fails
    pub fn to_png(&self) -> Result<Vec<u8>, CaptureError> {
        let mut data = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)?;
        Ok(data)
    }
}

/// State of one capture run. Dropped once the raster is emitted and the
/// page is restored.
struct CaptureSession {
    metrics: PageMetrics,
    steps: Vec<f64>,
    canvas: StitchCanvas,
    hidden: BTreeSet<ElementId>,
    overlays_hidden: bool,
    scrollbars_hidden: bool,
    progress_shown: bool,
}

impl CaptureSession {
    fn new(metrics: PageMetrics, settings: &CaptureSettings) -> Self {
        let height = metrics.document_height();
        let width = metrics.document_width();
        let steps = plan_scroll_steps(height, metrics.viewport_height, settings.step_ratio);
        let canvas = StitchCanvas::for_document(width, height, metrics.scale());
        Self {
            metrics,
            steps,
            canvas,
            hidden: BTreeSet::new(),
            overlays_hidden: false,
            scrollbars_hidden: false,
            progress_shown: false,
        }
    }
}

/// Clears the single-flight flag when a capture ends, however it ends
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FullPageCapture {
    page: Arc<dyn PageDriver>,
    provider: Arc<dyn ScreenshotProvider>,
    classifier: Arc<dyn ChromeClassifier>,
    settings: CaptureSettings,
    in_flight: Arc<AtomicBool>,
}

impl FullPageCapture {
    #[must_use]
    pub fn new(
        page: Arc<dyn PageDriver>,
        provider: Arc<dyn ScreenshotProvider>,
        settings: CaptureSettings,
    ) -> Self {
        let classifier = Arc::new(settings.classifier());
        Self {
            page,
            provider,
            classifier,
            settings,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the header/footer heuristic
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn ChromeClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<InFlight, CaptureError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CaptureError::Busy)?;
        Ok(InFlight(Arc::clone(&self.in_flight)))
    }

    async fn bounded<T, F>(&self, what: &'static str, fut: F) -> Result<T, CaptureError>
    where
        F: Future<Output = Result<T, CaptureError>>,
    {
        tokio::time::timeout(self.settings.step_timeout(), fut)
            .await
            .map_err(|_| CaptureError::Timeout(what))?
    }

    /// Capture the whole scrollable document as one raster.
    ///
    /// The page is left exactly as it was found on every exit path: scroll
    /// position, fixed/sticky element visibility, overlays, scrollbars and
    /// the progress UI are all restored.
    ///
    /// # Errors
    /// * `Busy` if another capture is running
    /// * `Cancelled` if `cancel` was set between steps
    /// * `FullPage { step, .. }` if any step failed or timed out
    pub async fn capture_full_page(
        &self,
        cancel: &CancellationToken,
    ) -> Result<FullPageImage, CaptureError> {
        let _in_flight = self.acquire()?;

        let metrics = self
            .bounded("measuring the page", self.page.metrics())
            .await
            .map_err(|err| err.at_step(0))?;
        if metrics.is_inconsistent() {
            warn!(
                height = metrics.document_height(),
                width = metrics.document_width(),
                "document measurements disagree, using the largest"
            );
        }

        let mut session = CaptureSession::new(metrics, &self.settings);
        info!(
            steps = session.steps.len(),
            width = session.canvas.width(),
            height = session.canvas.height(),
            "starting full-page capture"
        );

        let outcome = self.run(&mut session, cancel).await;
        let cleanup = self.cleanup(&mut session).await;

        match (outcome, cleanup) {
            (Ok(()), Ok(())) => {}
            (Ok(()), Err(err)) => {
                report_warning!(
                    "Full Page Capture",
                    &format!("Capture finished but the page could not be fully restored: {err}")
                );
            }
            (Err(err), _) => return Err(err),
        }

        let CaptureSession {
            steps,
            canvas,
            metrics,
            ..
        } = session;
        Ok(FullPageImage {
            image: canvas.finish(),
            steps,
            scale: metrics.scale(),
        })
    }

    async fn run(
        &self,
        session: &mut CaptureSession,
        cancel: &CancellationToken,
    ) -> Result<(), CaptureError> {
        self.bounded(
            "showing progress",
            self.page.show_progress("Initializing Full Page Capture..."),
        )
        .await
        .map_err(|err| err.at_step(0))?;
        session.progress_shown = true;

        self.bounded("hiding scrollbars", self.page.set_scrollbars_hidden(true))
            .await
            .map_err(|err| err.at_step(0))?;
        session.scrollbars_hidden = true;

        let count = session.steps.len();
        for index in 0..count {
            if cancel.is_cancelled() {
                info!(step = index, "full-page capture cancelled");
                return Err(CaptureError::Cancelled);
            }

            self.capture_step(session, index)
                .await
                .map_err(|err| err.at_step(index))?;

            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
            let percent = (((index + 1) as f64 / count as f64) * 100.0).round() as u32;
            self.bounded(
                "updating progress",
                self.page.show_progress(&format!("Capturing... {percent}%")),
            )
            .await
            .map_err(|err| err.at_step(index))?;
        }

        Ok(())
    }

    async fn capture_step(
        &self,
        session: &mut CaptureSession,
        index: usize,
    ) -> Result<(), CaptureError> {
        let target = session.steps[index];
        let actual = self
            .bounded("scrolling", self.page.scroll_to(0.0, target))
            .await?;
        tokio::time::sleep(self.settings.scroll_settle()).await;

        let filter = VisibilityFilter::for_step(index, session.steps.len());
        self.apply_filter(session, filter).await?;
        tokio::time::sleep(self.settings.visibility_settle()).await;

        self.bounded("hiding overlays", self.page.set_overlays_hidden(true))
            .await?;
        session.overlays_hidden = true;

        let shot = self
            .bounded(
                "capturing the viewport",
                self.provider.capture(&CaptureRequest::visible()),
            )
            .await;

        // Overlays come back before the result is even inspected
        self.bounded("restoring overlays", self.page.set_overlays_hidden(false))
            .await?;
        session.overlays_hidden = false;

        let shot = shot?.non_empty()?;
        let tile = decode(shot.image_data).await?;

        let placement = session
            .canvas
            .draw_tile(&tile, actual, session.metrics.scale());
        if placement.gap > 0 {
            warn!(step = index, rows = placement.gap, "tile left a gap in the output");
        }
        debug!(
            step = index,
            target,
            actual,
            ?filter,
            src_y = placement.src_y,
            dest_y = placement.dest_y,
            rows = placement.draw_height,
            "composited tile"
        );

        self.restore_hidden(session).await
    }

    async fn apply_filter(
        &self,
        session: &mut CaptureSession,
        filter: VisibilityFilter,
    ) -> Result<(), CaptureError> {
        if filter == VisibilityFilter::None {
            return Ok(());
        }

        let elements = self
            .bounded("listing fixed elements", self.page.fixed_elements())
            .await?;
        let viewport_height = session.metrics.viewport_height;
        for element in elements {
            let placement = self.classifier.classify(&element, viewport_height);
            if filter.should_hide(placement) {
                // Recorded first so cleanup also covers a half-applied hide
                session.hidden.insert(element.id);
                self.bounded(
                    "hiding fixed elements",
                    self.page.set_element_hidden(element.id, true),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn restore_hidden(&self, session: &mut CaptureSession) -> Result<(), CaptureError> {
        while let Some(id) = session.hidden.first().copied() {
            self.bounded(
                "restoring fixed elements",
                self.page.set_element_hidden(id, false),
            )
            .await?;
            session.hidden.remove(&id);
        }
        Ok(())
    }

    /// Best-effort revert of every page mutation. Each step is attempted even
    /// if an earlier one failed; the first failure is returned.
    async fn cleanup(&self, session: &mut CaptureSession) -> Result<(), CaptureError> {
        let mut first_error = None;
        let mut note = |result: Result<(), CaptureError>| {
            if let Err(err) = result {
                warn!(error = %err, "page cleanup step failed");
                first_error.get_or_insert(err);
            }
        };

        for id in std::mem::take(&mut session.hidden) {
            note(
                self.bounded(
                    "restoring fixed elements",
                    self.page.set_element_hidden(id, false),
                )
                .await,
            );
        }
        if session.overlays_hidden {
            note(
                self.bounded("restoring overlays", self.page.set_overlays_hidden(false))
                    .await,
            );
            session.overlays_hidden = false;
        }
        if session.scrollbars_hidden {
            note(
                self.bounded("restoring scrollbars", self.page.set_scrollbars_hidden(false))
                    .await,
            );
            session.scrollbars_hidden = false;
        }
        note(
            self.bounded(
                "restoring scroll position",
                self.page
                    .scroll_to(session.metrics.scroll_x, session.metrics.scroll_y),
            )
            .await
            .map(|_| ()),
        );
        if session.progress_shown {
            note(
                self.bounded("removing progress", self.page.remove_progress())
                    .await,
            );
            session.progress_shown = false;
        }

        first_error.map_or(Ok(()), Err)
    }
}

async fn decode(image_data: Vec<u8>) -> Result<RgbaImage, CaptureError> {
    let decoded = tokio::task::spawn_blocking(move || {
        image::load_from_memory(&image_data).map(|img| img.to_rgba8())
    })
    .await
    .map_err(|err| CaptureError::Io(io::Error::other(err)))?;
    Ok(decoded?)
}
