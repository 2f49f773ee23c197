// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::editor::Editor;
use crate::error::ExportError;
use crate::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    Pdf,
    Clipboard,
}

/// Destination for a flattened, PNG-encoded scene. PDF documents and the
/// system clipboard are provided by the embedding application.
pub trait ExportSink: Send + Sync {
    fn format(&self) -> ExportFormat;

    /// Deliver `png`. Returns the written path for file-backed sinks.
    ///
    /// # Errors
    /// Returns `ExportError` if the destination rejects the data
    fn write(&self, png: &[u8], file_stem: &str) -> Result<Option<PathBuf>, ExportError>;
}

/// Writes PNG files into a directory, never overwriting an existing file
#[derive(Debug, Clone)]
pub struct PngFileSink {
    directory: Option<PathBuf>,
}

impl PngFileSink {
    #[must_use]
    pub fn new(directory: Option<PathBuf>) -> Self {
        Self { directory }
    }

    fn free_path(directory: &Path, file_stem: &str) -> PathBuf {
        let mut path = directory.join(format!("{file_stem}.png"));
        let mut n = 1;
        while path.exists() {
            path = directory.join(format!("{file_stem}_{n}.png"));
            n += 1;
        }
        path
    }
}

impl ExportSink for PngFileSink {
    fn format(&self) -> ExportFormat {
        ExportFormat::Png
    }

    fn write(&self, png: &[u8], file_stem: &str) -> Result<Option<PathBuf>, ExportError> {
        let directory = self
            .directory
            .as_deref()
            .ok_or(ExportError::MissingSaveDirectory)?;
        fs::create_dir_all(directory)?;
        let path = Self::free_path(directory, file_stem);
        fs::write(&path, png)?;
        Ok(Some(path))
    }
}

/// `CaptureStudio_2024-05-01_13-45-10`
#[must_use]
pub fn export_file_stem(now: DateTime<Local>) -> String {
    format!("CaptureStudio_{}", now.format("%Y-%m-%d_%H-%M-%S"))
}

/// Flatten the editor's scene at `scale` and encode it as PNG
///
/// # Errors
/// Returns `ExportError::Image` if encoding fails
pub fn encode_png(editor: &Editor, scale: u32) -> Result<Vec<u8>, ExportError> {
    let raster = render::flatten_scaled(editor.scene(), editor.assets(), f64::from(scale.max(1)));
    let mut data = Vec::new();
    raster.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)?;
    Ok(data)
}

/// Flatten, encode and hand the scene to `sink`
///
/// # Errors
/// Returns `ExportError` if encoding or the sink fails
pub fn export(
    editor: &Editor,
    sink: &dyn ExportSink,
    scale: u32,
) -> Result<Option<PathBuf>, ExportError> {
    let png = encode_png(editor, scale)?;
    let path = sink.write(&png, &export_file_stem(Local::now()))?;
    info!(format = ?sink.format(), bytes = png.len(), path = ?path, "exported scene");
    Ok(path)
}
