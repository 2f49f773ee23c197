// SPDX-License-Identifier: GPL-3.0-only

//! Stitching viewport tiles into one full-page raster
//!
//! Everything in this module is synchronous and free of page access so the
//! pixel arithmetic can be tested on synthetic tiles. The async driver lives
//! in [`pipeline`].

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::page::ChromePlacement;

pub mod pipeline;

/// Fraction of the viewport advanced per step when the configured ratio is unusable
pub const DEFAULT_STEP_RATIO: f64 = 0.85;

/// Step size in CSS pixels: a fraction of the viewport, so consecutive tiles overlap
#[must_use]
pub fn step_size(viewport_height: f64, step_ratio: f64) -> f64 {
    let ratio = if step_ratio.is_finite() && step_ratio > 0.0 && step_ratio <= 1.0 {
        step_ratio
    } else {
        DEFAULT_STEP_RATIO
    };
    (viewport_height * ratio).floor().max(1.0)
}

/// Scroll targets for a document of `document_height` seen through a
/// viewport of `viewport_height`.
///
/// The list starts at 0, is strictly increasing and always ends exactly at
/// the maximum scroll position `document_height - viewport_height`, even
/// when that does not land on a step boundary.
#[must_use]
pub fn plan_scroll_steps(document_height: f64, viewport_height: f64, step_ratio: f64) -> Vec<f64> {
    let limit = (document_height - viewport_height).max(0.0);
    let step = step_size(viewport_height, step_ratio);

    let mut steps = Vec::new();
    let mut y = 0.0;
    while y < limit {
        steps.push(y);
        y += step;
    }
    if steps.last().map_or(true, |last| *last < limit) {
        steps.push(limit);
    }
    steps
}

/// Which fixed/sticky page chrome is suppressed while a tile is captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisibilityFilter {
    /// Hide every fixed/sticky element
    All,
    /// Hide everything except header-like elements
    HeaderOnly,
    /// Hide everything except footer-like elements
    FooterOnly,
    /// Hide nothing
    None,
}

impl VisibilityFilter {
    /// Headers appear once at the top of the output, footers once at the
    /// bottom. A page that fits one tile keeps all of its chrome.
    #[must_use]
    pub fn for_step(index: usize, step_count: usize) -> Self {
        match (index, step_count) {
            (_, 0 | 1) => Self::None,
            (0, _) => Self::HeaderOnly,
            (i, n) if i + 1 == n => Self::FooterOnly,
            _ => Self::All,
        }
    }

    #[must_use]
    pub fn should_hide(self, placement: ChromePlacement) -> bool {
        match self {
            Self::All => true,
            Self::None => false,
            Self::HeaderOnly => !(placement.is_header && !placement.is_footer),
            Self::FooterOnly => !(placement.is_footer && !placement.is_header),
        }
    }
}

/// Where one tile lands on the accumulator, in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TilePlacement {
    /// Rows trimmed from the top of the tile because they were already drawn
    pub src_y: u32,
    /// First destination row
    pub dest_y: u32,
    /// Number of rows copied
    pub draw_height: u32,
    /// Rows left unwritten between the previous tile and this one
    pub gap: u32,
}

impl TilePlacement {
    /// Place a tile captured at `scroll_y` (CSS px) given the last row
    /// already written.
    ///
    /// The tile top is rounded exactly once. Source trim and destination row
    /// are both derived from the same overlap, so rounding can never open a
    /// one-row gap or draw a row twice.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn compute(
        scroll_y: f64,
        scale: f64,
        tile_height: u32,
        last_written: u32,
        canvas_height: u32,
    ) -> Self {
        let tile_top = (scroll_y * scale).round().max(0.0) as u64;
        let last_written = u64::from(last_written);
        let overlap = last_written.saturating_sub(tile_top);
        let gap = tile_top.saturating_sub(last_written);

        let src_y = overlap.min(u64::from(tile_height));
        let dest_y = (tile_top + overlap).min(u64::from(canvas_height));
        let draw_height = (u64::from(tile_height) - src_y).min(u64::from(canvas_height) - dest_y);

        Self {
            src_y: src_y as u32,
            dest_y: dest_y as u32,
            draw_height: draw_height as u32,
            gap: gap.min(u64::from(u32::MAX)) as u32,
        }
    }
}

/// Growable output raster plus the last-written-row cursor
#[derive(Debug, Clone)]
pub struct StitchCanvas {
    image: RgbaImage,
    last_written: u32,
}

impl StitchCanvas {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width.max(1), height.max(1)),
            last_written: 0,
        }
    }

    /// Canvas sized to the document at device scale
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn for_document(width: f64, height: f64, scale: f64) -> Self {
        Self::new((width * scale).round() as u32, (height * scale).round() as u32)
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn last_written(&self) -> u32 {
        self.last_written
    }

    /// Composite a tile captured at `scroll_y` and advance the cursor
    pub fn draw_tile(&mut self, tile: &RgbaImage, scroll_y: f64, scale: f64) -> TilePlacement {
        let placement = TilePlacement::compute(
            scroll_y,
            scale,
            tile.height(),
            self.last_written,
            self.image.height(),
        );
        if placement.draw_height == 0 {
            return placement;
        }

        let width = tile.width().min(self.image.width()) as usize;
        let row_bytes = width * 4;
        let src_stride = tile.width() as usize * 4;
        let dst_stride = self.image.width() as usize * 4;
        let src = tile.as_raw();
        let dst: &mut [u8] = &mut self.image;

        for row in 0..placement.draw_height as usize {
            let src_off = (placement.src_y as usize + row) * src_stride;
            let dst_off = (placement.dest_y as usize + row) * dst_stride;
            dst[dst_off..dst_off + row_bytes].copy_from_slice(&src[src_off..src_off + row_bytes]);
        }

        self.last_written = placement.dest_y + placement.draw_height;
        placement
    }

    #[must_use]
    pub fn finish(self) -> RgbaImage {
        self.image
    }
}
