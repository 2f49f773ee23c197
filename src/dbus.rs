// SPDX-License-Identifier: GPL-3.0-only

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use zbus::object_server::SignalEmitter;
use zbus::{connection, fdo, interface, Connection};

use crate::error_handling::{setup_error_channel, Report};
use crate::protocol::{Background, Command};
use crate::screenshot::ScreenshotManager;
use crate::settings::APP_ID;

/// How often reports from the error channel are re-emitted as signals
const REPORT_POLL_INTERVAL: Duration = Duration::from_millis(250);
const RECORDING_TICK: Duration = Duration::from_secs(1);

#[must_use]
pub fn object_path() -> String {
    format!("/{}", APP_ID.replace('.', "/"))
}

pub struct CaptureService {
    manager: ScreenshotManager,
    background: Arc<Background>,
}

impl CaptureService {
    #[must_use]
    pub fn new(manager: ScreenshotManager, background: Arc<Background>) -> Self {
        Self {
            manager,
            background,
        }
    }
}

#[interface(name = "com.capturestudio.CaptureStudio")]
impl CaptureService {
    /// Run one bus command
    ///
    /// # Arguments
    /// * `command` - JSON object tagged by `action`, e.g.
    ///   `{"action":"setDrawingTool","tool":"arrow","color":"#ff0000"}`
    ///
    /// # Returns
    /// JSON object tagged by `status`: `ok`, `captured` (with `dataUrl`),
    /// `fullPage`, `forwarded` or `error` (with `message`)
    ///
    /// The desktop service has no page to scroll, so `startFullPageCapture`
    /// answers with an `error` here. Full-page captures need a process that
    /// embeds a `PageDriver` and registers it with `Background::with_full_page`.
    async fn dispatch(&self, command: &str) -> fdo::Result<String> {
        Ok(self.background.dispatch_json(command).await)
    }

    /// Names of the screenshot backends usable right now
    async fn get_available_backends(&self) -> fdo::Result<Vec<String>> {
        Ok(self.manager.available_providers().await)
    }

    /// Stop the running full-page capture before its next step
    ///
    /// # Returns
    /// Whether a capture was running
    async fn cancel_capture(&self) -> fdo::Result<bool> {
        Ok(self.background.cancel_capture())
    }

    /// Answer the share prompt opened by a `startRecording` command
    ///
    /// # Returns
    /// The new recording phase, e.g. `recording` or `idle`
    async fn recording_permission(&self, granted: bool) -> fdo::Result<String> {
        self.background
            .recording_permission(granted)
            .map(|state| state.to_string())
            .map_err(|err| fdo::Error::Failed(err.to_string()))
    }

    /// Recording phase and the elapsed time as `mm:ss`
    async fn recording_status(&self) -> fdo::Result<(String, String)> {
        let (state, timer) = self.background.recording_status();
        Ok((state.to_string(), timer))
    }

    /// A command was forwarded to page contexts
    #[zbus(signal)]
    async fn command_forwarded(emitter: &SignalEmitter<'_>, command: &str) -> zbus::Result<()>;

    /// An error was reported while the service was running
    #[zbus(signal)]
    async fn error_reported(
        emitter: &SignalEmitter<'_>,
        title: &str,
        message: &str,
    ) -> zbus::Result<()>;
}

pub struct ServiceInterface {
    connection: Connection,
    background: Arc<Background>,
    reports: Receiver<Report>,
}

impl ServiceInterface {
    /// Claim the bus name and serve the interface
    #[allow(clippy::missing_errors_doc)]
    pub async fn new(manager: ScreenshotManager, background: Arc<Background>) -> zbus::Result<Self> {
        let reports = setup_error_channel();
        let service = CaptureService::new(manager, Arc::clone(&background));
        let connection = connection::Builder::session()?
            .name(APP_ID)?
            .serve_at(object_path().as_str(), service)?
            .build()
            .await?;

        Ok(Self {
            connection,
            background,
            reports,
        })
    }

    /// Relay forwarded commands and reported errors as signals until
    /// SIGINT or SIGTERM
    #[allow(clippy::missing_errors_doc)]
    pub async fn run(&self) -> zbus::Result<()> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut forwarded = self.background.subscribe();
        let mut poll = tokio::time::interval(REPORT_POLL_INTERVAL);
        let mut timer = tokio::time::interval(RECORDING_TICK);
        let path = object_path();
        let emitter = SignalEmitter::new(&self.connection, path.as_str())?;

        info!(name = APP_ID, path = %path, "D-Bus service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                    break;
                }
                _ = sigint.recv() => {
                    info!("received SIGINT, shutting down");
                    break;
                }
                command = forwarded.recv() => match command {
                    Ok(command) => self.emit_forwarded(&emitter, &command).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "page contexts fell behind the command bus");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = timer.tick() => self.background.tick_recording(),
                _ = poll.tick() => {
                    while let Ok(report) = self.reports.try_recv() {
                        if let Err(err) =
                            CaptureService::error_reported(&emitter, &report.title, &report.message).await
                        {
                            warn!(error = %err, "failed to emit error signal");
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn emit_forwarded(&self, emitter: &SignalEmitter<'_>, command: &Command) {
        let json = match serde_json::to_string(command) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to encode forwarded command");
                return;
            }
        };
        if let Err(err) = CaptureService::command_forwarded(emitter, &json).await {
            warn!(error = %err, "failed to emit forwarded command");
        }
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}
