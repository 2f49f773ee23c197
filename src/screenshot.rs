// SPDX-License-Identifier: GPL-3.0-only

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use image::{GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::error::CaptureError;
use crate::error_handling::{report_error, ErrorSeverity};

/// Sub-rectangle of the visible viewport, in CSS pixels, plus the device
/// pixel ratio needed to map it onto the captured raster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(alias = "devicePixelRatio")]
    pub scale: f64,
}

/// What the provider should capture. `region: None` means whatever is
/// currently visible.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CaptureRequest {
    pub region: Option<CaptureRegion>,
}

impl CaptureRequest {
    #[must_use]
    pub fn visible() -> Self {
        Self { region: None }
    }

    #[must_use]
    pub fn region(region: CaptureRegion) -> Self {
        Self {
            region: Some(region),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScreenshotResult {
    /// Encoded image (PNG for every built-in backend)
    pub image_data: Vec<u8>,
    /// Where the backend left the file, if it wrote one
    pub path: Option<PathBuf>,
}

impl ScreenshotResult {
    #[must_use]
    pub fn from_png(image_data: Vec<u8>) -> Self {
        Self {
            image_data,
            path: None,
        }
    }

    /// Empty results count as a failed capture.
    ///
    /// # Errors
    /// Returns [`CaptureError::Unavailable`] when no image data came back
    pub fn non_empty(self) -> Result<Self, CaptureError> {
        if self.image_data.is_empty() {
            Err(CaptureError::Unavailable)
        } else {
            Ok(self)
        }
    }
}

/// External capability that returns a raster of the current viewport
#[async_trait]
pub trait ScreenshotProvider: Send + Sync {
    async fn is_available(&self) -> bool;

    async fn capture(&self, request: &CaptureRequest) -> Result<ScreenshotResult, CaptureError>;

    fn name(&self) -> &'static str;

    /// Whether the backend crops regions itself. When it does not, the
    /// manager captures the viewport and crops afterwards.
    fn supports_region(&self) -> bool {
        false
    }
}

#[async_trait]
impl<T: ScreenshotProvider + ?Sized> ScreenshotProvider for Arc<T> {
    async fn is_available(&self) -> bool {
        (**self).is_available().await
    }

    async fn capture(&self, request: &CaptureRequest) -> Result<ScreenshotResult, CaptureError> {
        (**self).capture(request).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn supports_region(&self) -> bool {
        (**self).supports_region()
    }
}

pub mod freedesktop_portal;

/// A rectangle dragged out by the user, in CSS pixels of the viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl SelectionRect {
    /// Smallest side, in CSS pixels, that a selection must exceed to be captured
    pub const MIN_SIDE: f64 = 5.0;

    /// Normalise a drag from `start` to `end` regardless of direction
    #[must_use]
    pub fn from_drag(start: (f64, f64), end: (f64, f64)) -> Self {
        Self {
            left: start.0.min(end.0),
            top: start.1.min(end.1),
            width: (end.0 - start.0).abs(),
            height: (end.1 - start.1).abs(),
        }
    }

    #[must_use]
    pub fn is_capturable(&self) -> bool {
        self.width > Self::MIN_SIDE && self.height > Self::MIN_SIDE
    }

    #[must_use]
    pub fn to_region(&self, scale: f64) -> CaptureRegion {
        CaptureRegion {
            x: self.left,
            y: self.top,
            width: self.width,
            height: self.height,
            scale,
        }
    }
}

/// Crop an encoded viewport capture to `region` and re-encode it as PNG.
///
/// The region is scaled by its device pixel ratio and clamped to the image.
///
/// # Errors
/// Returns `CaptureError` if decoding or encoding fails, or the region lies
/// entirely outside the image
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn crop_region(image_data: &[u8], region: &CaptureRegion) -> Result<Vec<u8>, CaptureError> {
    let img = image::load_from_memory(image_data)?;
    let (img_w, img_h) = img.dimensions();

    let x = ((region.x * region.scale).round().max(0.0) as u32).min(img_w);
    let y = ((region.y * region.scale).round().max(0.0) as u32).min(img_h);
    let w = ((region.width * region.scale).round().max(0.0) as u32).min(img_w - x);
    let h = ((region.height * region.scale).round().max(0.0) as u32).min(img_h - y);
    if w == 0 || h == 0 {
        return Err(CaptureError::Unavailable);
    }

    let cropped = img.crop_imm(x, y, w, h);
    let mut data = Vec::new();
    cropped.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)?;
    Ok(data)
}

#[derive(Clone)]
pub struct ScreenshotManager {
    providers: Arc<Vec<Box<dyn ScreenshotProvider>>>,
}

impl Default for ScreenshotManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenshotManager {
    #[must_use]
    pub fn new() -> Self {
        let providers: Vec<Box<dyn ScreenshotProvider>> =
            vec![Box::new(freedesktop_portal::PortalScreengrabber::new())];
        Self::with_providers(providers)
    }

    /// Build a manager over an explicit list of backends, in order of preference
    #[must_use]
    pub fn with_providers(providers: Vec<Box<dyn ScreenshotProvider>>) -> Self {
        Self {
            providers: Arc::new(providers),
        }
    }

    pub async fn available_providers(&self) -> Vec<String> {
        let mut available = Vec::new();
        for provider in self.providers.iter() {
            if provider.is_available().await {
                available.push(provider.name().to_string());
            }
        }
        available
    }

    /// Capture the visible viewport or a region of it, trying backends in
    /// order until one succeeds.
    ///
    /// # Errors
    /// Returns the last backend error, or `NotAvailable` if no backend is usable
    pub async fn capture(&self, request: &CaptureRequest) -> Result<ScreenshotResult, CaptureError> {
        let mut last_error = None;
        for provider in self.providers.iter() {
            if !provider.is_available().await {
                continue;
            }
            match Self::capture_with(provider.as_ref(), request).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    report_error(
                        ErrorSeverity::Warning,
                        "Backend Fallback",
                        &format!(
                            "Backend {} failed: {}, trying next backend...",
                            provider.name(),
                            err
                        ),
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or(CaptureError::NotAvailable))
    }

    async fn capture_with(
        provider: &dyn ScreenshotProvider,
        request: &CaptureRequest,
    ) -> Result<ScreenshotResult, CaptureError> {
        match request.region {
            Some(region) if !provider.supports_region() => {
                let full = provider
                    .capture(&CaptureRequest::visible())
                    .await?
                    .non_empty()?;
                let cropped = crop_region(&full.image_data, &region)?;
                Ok(ScreenshotResult::from_png(cropped))
            }
            _ => provider.capture(request).await?.non_empty(),
        }
    }
}

#[async_trait]
impl ScreenshotProvider for ScreenshotManager {
    async fn is_available(&self) -> bool {
        !self.available_providers().await.is_empty()
    }

    async fn capture(&self, request: &CaptureRequest) -> Result<ScreenshotResult, CaptureError> {
        ScreenshotManager::capture(self, request).await
    }

    fn name(&self) -> &'static str {
        "Automatic"
    }

    fn supports_region(&self) -> bool {
        true
    }
}
