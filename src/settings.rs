// SPDX-License-Identifier: GPL-3.0-only

use cosmic_config::{Config, ConfigGet, ConfigSet, CosmicConfigEntry};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::page::EdgeDistanceClassifier;
use crate::scene::Color;

pub const APP_ID: &str = "com.capturestudio.CaptureStudio";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Wait after each scroll so reflow and lazy content can settle
    pub scroll_settle_ms: u64,
    /// Wait after hiding fixed/sticky chrome
    pub visibility_settle_ms: u64,
    /// Upper bound for any single page or provider round-trip
    pub step_timeout_ms: u64,
    /// Fraction of the viewport advanced per scroll step
    pub step_ratio: f64,
    /// Elements whose top is closer than this to the viewport top are headers
    pub header_threshold: f64,
    /// Elements whose bottom is closer than this to the viewport bottom are footers
    pub footer_threshold: f64,
    /// Maximum number of undo snapshots kept
    pub history_capacity: usize,
    /// Offset applied per paste so repeated pastes cascade
    pub paste_offset: f64,
    pub stroke_color: Color,
    pub canvas_background: Color,
    /// Multiplier applied when exporting the flattened canvas
    pub export_scale: u32,
    pub save_directory: Option<PathBuf>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            scroll_settle_ms: 800,
            visibility_settle_ms: 100,
            step_timeout_ms: 10_000,
            step_ratio: crate::stitch::DEFAULT_STEP_RATIO,
            header_threshold: 150.0,
            footer_threshold: 150.0,
            history_capacity: 50,
            paste_offset: 20.0,
            stroke_color: Color::ACCENT,
            canvas_background: Color::CANVAS,
            export_scale: 2,
            save_directory: dirs::picture_dir(),
        }
    }
}

impl CaptureSettings {
    /// Settings with every settle delay removed, for offline stitching and tests
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            scroll_settle_ms: 0,
            visibility_settle_ms: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    #[must_use]
    pub fn visibility_settle(&self) -> Duration {
        Duration::from_millis(self.visibility_settle_ms)
    }

    #[must_use]
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms.max(1))
    }

    #[must_use]
    pub fn classifier(&self) -> EdgeDistanceClassifier {
        EdgeDistanceClassifier {
            header_threshold: self.header_threshold,
            footer_threshold: self.footer_threshold,
        }
    }
}

impl CosmicConfigEntry for CaptureSettings {
    const VERSION: u64 = 1;

    fn write_entry(&self, config: &Config) -> Result<(), cosmic_config::Error> {
        config.set("scroll_settle_ms", self.scroll_settle_ms)?;
        config.set("visibility_settle_ms", self.visibility_settle_ms)?;
        config.set("step_timeout_ms", self.step_timeout_ms)?;
        config.set("step_ratio", self.step_ratio)?;
        config.set("header_threshold", self.header_threshold)?;
        config.set("footer_threshold", self.footer_threshold)?;
        config.set("history_capacity", self.history_capacity)?;
        config.set("paste_offset", self.paste_offset)?;
        config.set("stroke_color", self.stroke_color)?;
        config.set("canvas_background", self.canvas_background)?;
        config.set("export_scale", self.export_scale)?;
        config.set("save_directory", &self.save_directory)?;
        Ok(())
    }

    fn get_entry(config: &Config) -> Result<Self, (Vec<cosmic_config::Error>, Self)> {
        let mut errors = Vec::new();
        let default = Self::default();

        let scroll_settle_ms = config.get("scroll_settle_ms")
            .unwrap_or_else(|e| { errors.push(e); default.scroll_settle_ms });

        let visibility_settle_ms = config.get("visibility_settle_ms")
            .unwrap_or_else(|e| { errors.push(e); default.visibility_settle_ms });

        let step_timeout_ms = config.get("step_timeout_ms")
            .unwrap_or_else(|e| { errors.push(e); default.step_timeout_ms });

        let step_ratio = config.get("step_ratio")
            .unwrap_or_else(|e| { errors.push(e); default.step_ratio });

        let header_threshold = config.get("header_threshold")
            .unwrap_or_else(|e| { errors.push(e); default.header_threshold });

        let footer_threshold = config.get("footer_threshold")
            .unwrap_or_else(|e| { errors.push(e); default.footer_threshold });

        let history_capacity = config.get("history_capacity")
            .unwrap_or_else(|e| { errors.push(e); default.history_capacity });

        let paste_offset = config.get("paste_offset")
            .unwrap_or_else(|e| { errors.push(e); default.paste_offset });

        let stroke_color = config.get("stroke_color")
            .unwrap_or_else(|e| { errors.push(e); default.stroke_color });

        let canvas_background = config.get("canvas_background")
            .unwrap_or_else(|e| { errors.push(e); default.canvas_background });

        let export_scale = config.get("export_scale")
            .unwrap_or_else(|e| { errors.push(e); default.export_scale });

        let save_directory = config.get("save_directory")
            .unwrap_or_else(|e| { errors.push(e); default.save_directory.clone() });

        let settings = Self {
            scroll_settle_ms,
            visibility_settle_ms,
            step_timeout_ms,
            step_ratio,
            header_threshold,
            footer_threshold,
            history_capacity,
            paste_offset,
            stroke_color,
            canvas_background,
            export_scale,
            save_directory,
        };

        if errors.is_empty() {
            Ok(settings)
        } else {
            Err((errors, settings))
        }
    }

    fn update_keys<T>(&mut self, config: &Config, _keys: &[T]) -> (Vec<cosmic_config::Error>, Vec<&'static str>)
    where
        T: AsRef<str>
    {
        // Reload everything; the entry is small
        match Self::get_entry(config) {
            Ok(new_settings) => {
                *self = new_settings;
                (vec![], vec![])
            }
            Err((errors, new_settings)) => {
                *self = new_settings;
                (errors, vec![])
            }
        }
    }
}

pub struct SettingsManager {
    pub config: Config,
    pub settings: CaptureSettings,
}

impl SettingsManager {
    #[allow(clippy::missing_errors_doc)]
    pub fn new() -> Result<Self, cosmic_config::Error> {
        let config = Config::new(APP_ID, CaptureSettings::VERSION)?;
        let settings = match CaptureSettings::get_entry(&config) {
            Ok(settings) => settings,
            Err((errors, settings)) => {
                tracing::debug!(count = errors.len(), "using defaults for unreadable settings keys");
                settings
            }
        };

        Ok(Self { config, settings })
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn save(&self) -> Result<(), cosmic_config::Error> {
        self.settings.write_entry(&self.config)
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn set_stroke_color(&mut self, color: Color) -> Result<(), cosmic_config::Error> {
        self.settings.stroke_color = color;
        self.save()
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn update_save_directory(
        &mut self,
        directory: Option<PathBuf>,
    ) -> Result<(), cosmic_config::Error> {
        self.settings.save_directory = directory;
        self.save()
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn set_capture_timing(
        &mut self,
        scroll_settle_ms: u64,
        visibility_settle_ms: u64,
    ) -> Result<(), cosmic_config::Error> {
        self.settings.scroll_settle_ms = scroll_settle_ms;
        self.settings.visibility_settle_ms = visibility_settle_ms;
        self.save()
    }
}
