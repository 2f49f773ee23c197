// SPDX-License-Identifier: GPL-3.0-only

//! User-facing error reporting
//!
//! Reporting adapts to how the process runs:
//! - Desktop mode: errors go to the registered channel (the D-Bus service
//!   re-emits them), warnings and info become system notifications
//! - Everything else, and any notification that fails: `tracing`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::OnceLock;

use tracing::{error, info, warn};

use crate::notifications::{notifications_available, show_system_notification, NotificationType};

static DESKTOP_MODE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// The requested operation failed
    Error,
    /// A fallback kicked in or something was only partly done
    Warning,
    Info,
}

impl From<ErrorSeverity> for NotificationType {
    fn from(severity: ErrorSeverity) -> Self {
        match severity {
            ErrorSeverity::Error => Self::Error,
            ErrorSeverity::Warning => Self::Warning,
            ErrorSeverity::Info => Self::Info,
        }
    }
}

/// A report routed to the registered error channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub severity: ErrorSeverity,
    pub title: String,
    pub message: String,
}

pub fn set_desktop_mode(enabled: bool) {
    DESKTOP_MODE.store(enabled, Ordering::Relaxed);
}

#[must_use]
pub fn is_desktop_mode() -> bool {
    DESKTOP_MODE.load(Ordering::Relaxed)
}

static ERROR_SENDER: OnceLock<Sender<Report>> = OnceLock::new();

/// Register the process-wide error channel. Only the first call wins; later
/// callers get a receiver that never yields.
pub fn setup_error_channel() -> Receiver<Report> {
    let (sender, receiver) = mpsc::channel();
    let _ = ERROR_SENDER.set(sender);
    receiver
}

fn log(severity: ErrorSeverity, title: &str, message: &str) {
    match severity {
        ErrorSeverity::Error => error!(title, "{message}"),
        ErrorSeverity::Warning => warn!(title, "{message}"),
        ErrorSeverity::Info => info!(title, "{message}"),
    }
}

pub fn report_error(severity: ErrorSeverity, title: &str, message: &str) {
    if !is_desktop_mode() {
        log(severity, title, message);
        return;
    }

    if severity == ErrorSeverity::Error {
        let report = Report {
            severity,
            title: title.to_string(),
            message: message.to_string(),
        };
        let delivered = ERROR_SENDER
            .get()
            .is_some_and(|sender| sender.send(report).is_ok());
        if !delivered {
            log(severity, title, message);
        }
        return;
    }

    notify_or_log(severity, title, message);
}

/// Send a success notification in desktop mode, log otherwise
pub fn report_success(title: &str, message: &str) {
    if is_desktop_mode() {
        notify_or_log(ErrorSeverity::Info, title, message);
    } else {
        info!(title, "{message}");
    }
}

fn notify_or_log(severity: ErrorSeverity, title: &str, message: &str) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        log(severity, title, message);
        return;
    };
    if !notifications_available() {
        log(severity, title, message);
        return;
    }

    let title = title.to_string();
    let message = message.to_string();
    runtime.spawn(async move {
        if let Err(err) = show_system_notification(severity.into(), &title, &message).await {
            warn!(error = %err, "notification failed");
            log(severity, &title, &message);
        }
    });
}

#[macro_export]
macro_rules! report_error {
    ($title:expr, $msg:expr) => {
        $crate::error_handling::report_error(
            $crate::error_handling::ErrorSeverity::Error,
            $title,
            $msg,
        )
    };
}

#[macro_export]
macro_rules! report_warning {
    ($title:expr, $msg:expr) => {
        $crate::error_handling::report_error(
            $crate::error_handling::ErrorSeverity::Warning,
            $title,
            $msg,
        )
    };
}

#[macro_export]
macro_rules! report_info {
    ($title:expr, $msg:expr) => {
        $crate::error_handling::report_error(
            $crate::error_handling::ErrorSeverity::Info,
            $title,
            $msg,
        )
    };
}
