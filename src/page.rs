// SPDX-License-Identifier: GPL-3.0-only

//! The live document a full-page capture runs against
//!
//! [`PageDriver`] is the only way the pipeline touches the page: it scrolls,
//! measures, toggles fixed/sticky chrome and the tool's own overlays, and
//! shows progress. Everything it changes must be revertible.

use async_trait::async_trait;

use crate::error::CaptureError;

/// One measurement source's view of the document extent, in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExtentSample {
    pub scroll: f64,
    pub offset: f64,
    pub client: f64,
}

impl ExtentSample {
    fn values(&self) -> [f64; 3] {
        [self.scroll, self.offset, self.client]
    }
}

/// Measurements read from the page when a capture starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageMetrics {
    /// Heights reported by the body element
    pub body_height: ExtentSample,
    /// Heights reported by the root element
    pub root_height: ExtentSample,
    pub body_width: ExtentSample,
    pub root_width: ExtentSample,
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub device_pixel_ratio: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

/// Sources disagreeing by more than this factor are logged as inconsistent
const INCONSISTENT_RATIO: f64 = 2.0;

fn max_of(samples: &[ExtentSample]) -> f64 {
    samples
        .iter()
        .flat_map(ExtentSample::values)
        .fold(0.0, f64::max)
}

fn inconsistent(samples: &[ExtentSample]) -> bool {
    let values: Vec<f64> = samples
        .iter()
        .flat_map(ExtentSample::values)
        .filter(|v| *v > 0.0)
        .collect();
    let max = values.iter().copied().fold(0.0, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    values.len() > 1 && max > min * INCONSISTENT_RATIO
}

impl PageMetrics {
    /// Metrics for a page whose every measurement source agrees
    #[must_use]
    pub fn uniform(width: f64, height: f64, viewport_width: f64, viewport_height: f64, dpr: f64) -> Self {
        let h = ExtentSample {
            scroll: height,
            offset: height,
            client: height,
        };
        let w = ExtentSample {
            scroll: width,
            offset: width,
            client: width,
        };
        Self {
            body_height: h,
            root_height: h,
            body_width: w,
            root_width: w,
            viewport_width,
            viewport_height,
            device_pixel_ratio: dpr,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }

    /// True content height: the maximum across every source. Undermeasuring
    /// loses content, overmeasuring only adds blank rows.
    #[must_use]
    pub fn document_height(&self) -> f64 {
        max_of(&[self.body_height, self.root_height])
    }

    #[must_use]
    pub fn document_width(&self) -> f64 {
        max_of(&[self.body_width, self.root_width]).max(self.viewport_width)
    }

    /// Device pixel ratio, never below a sane minimum
    #[must_use]
    pub fn scale(&self) -> f64 {
        if self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0 {
            self.device_pixel_ratio
        } else {
            1.0
        }
    }

    /// Whether the height or width sources disagree wildly
    #[must_use]
    pub fn is_inconsistent(&self) -> bool {
        inconsistent(&[self.body_height, self.root_height])
            || inconsistent(&[self.body_width, self.root_width])
    }
}

/// Opaque handle to a fixed or sticky element on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

/// A fixed/sticky element and its bounding box relative to the viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedElement {
    pub id: ElementId,
    pub top: f64,
    pub bottom: f64,
}

/// Where a piece of page chrome sits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChromePlacement {
    pub is_header: bool,
    pub is_footer: bool,
}

/// Heuristic header/footer detection for fixed and sticky elements.
///
/// This is an approximation: an element counts as a header when its top
/// edge lies within `header_threshold` of the viewport top, and as a footer
/// when its bottom edge lies within `footer_threshold` of the viewport bottom.
pub trait ChromeClassifier: Send + Sync {
    fn classify(&self, element: &FixedElement, viewport_height: f64) -> ChromePlacement;
}

/// Distance-from-edge classifier, 150 CSS px by default
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeDistanceClassifier {
    pub header_threshold: f64,
    pub footer_threshold: f64,
}

impl Default for EdgeDistanceClassifier {
    fn default() -> Self {
        Self {
            header_threshold: 150.0,
            footer_threshold: 150.0,
        }
    }
}

impl ChromeClassifier for EdgeDistanceClassifier {
    fn classify(&self, element: &FixedElement, viewport_height: f64) -> ChromePlacement {
        ChromePlacement {
            is_header: element.top < self.header_threshold,
            is_footer: element.bottom > viewport_height - self.footer_threshold,
        }
    }
}

/// Control surface over the page being captured
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn metrics(&self) -> Result<PageMetrics, CaptureError>;

    /// Scroll to the given offset and return the vertical offset the page
    /// actually reached (browsers clamp near the bottom).
    async fn scroll_to(&self, x: f64, y: f64) -> Result<f64, CaptureError>;

    /// Fixed and sticky elements currently on the page, excluding the
    /// tool's own overlays
    async fn fixed_elements(&self) -> Result<Vec<FixedElement>, CaptureError>;

    async fn set_element_hidden(&self, id: ElementId, hidden: bool) -> Result<(), CaptureError>;

    /// Hide or restore the tool's own overlays (recording widget,
    /// selection UI, progress overlay)
    async fn set_overlays_hidden(&self, hidden: bool) -> Result<(), CaptureError>;

    async fn set_scrollbars_hidden(&self, hidden: bool) -> Result<(), CaptureError>;

    async fn show_progress(&self, message: &str) -> Result<(), CaptureError>;

    async fn remove_progress(&self) -> Result<(), CaptureError>;
}
