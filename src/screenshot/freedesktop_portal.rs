// SPDX-License-Identifier: GPL-3.0-only

use super::{CaptureError, CaptureRequest, ScreenshotProvider, ScreenshotResult};
use ashpd::desktop::screenshot::Screenshot;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Desktop screenshot provider backed by the XDG screenshot portal.
///
/// The portal only captures the whole workspace non-interactively, so
/// region requests are cropped by [`super::ScreenshotManager`].
pub struct PortalScreengrabber {
    _private: (),
}

impl Default for PortalScreengrabber {
    fn default() -> Self {
        Self::new()
    }
}

impl PortalScreengrabber {
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }
}

#[async_trait]
impl ScreenshotProvider for PortalScreengrabber {
    async fn is_available(&self) -> bool {
        zbus::Connection::session().await.is_ok()
    }

    async fn capture(&self, _request: &CaptureRequest) -> Result<ScreenshotResult, CaptureError> {
        let response = Screenshot::request()
            .interactive(false)
            .modal(false)
            .send()
            .await
            .map_err(|e| CaptureError::Portal(e.to_string()))?
            .response()
            .map_err(|e| CaptureError::Portal(e.to_string()))?;

        let uri = response.uri();
        match uri.scheme() {
            "file" => {
                let image_data = take_file(&PathBuf::from(uri.path())).await?;
                Ok(ScreenshotResult {
                    image_data,
                    path: None,
                })
            }
            // Nothing to read back from the clipboard
            "clipboard" => Err(CaptureError::Unavailable),
            scheme => Err(CaptureError::Portal(format!("Unsupported scheme: {scheme}"))),
        }
    }

    fn name(&self) -> &'static str {
        "Freedesktop Portal"
    }
}

/// Read the file the portal wrote and remove it; the data is all we keep
async fn take_file(path: &Path) -> Result<Vec<u8>, CaptureError> {
    let data = tokio::fs::read(path).await?;
    if let Err(err) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), error = %err, "could not remove portal file");
    }
    Ok(data)
}
