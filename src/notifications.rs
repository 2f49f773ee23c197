// SPDX-License-Identifier: GPL-3.0-only

//! Desktop notifications over the freedesktop notification service

use std::collections::HashMap;
use std::sync::OnceLock;

use zbus::{proxy, zvariant::Value, Connection};

const APP_NAME: &str = "Capture Studio";
const EXPIRE_TIMEOUT_MS: i32 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationUrgency {
    Low = 0,
    Normal = 1,
    Critical = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    Info,
    Warning,
    Error,
    Success,
}

impl NotificationType {
    #[must_use]
    pub fn urgency(self) -> NotificationUrgency {
        match self {
            Self::Info | Self::Success => NotificationUrgency::Low,
            Self::Warning => NotificationUrgency::Normal,
            Self::Error => NotificationUrgency::Critical,
        }
    }

    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Self::Info => "dialog-information",
            Self::Success => "emblem-default",
            Self::Warning => "dialog-warning",
            Self::Error => "dialog-error",
        }
    }
}

#[allow(clippy::too_many_arguments)]
#[proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: Vec<&str>,
        hints: HashMap<&str, Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;
}

pub struct NotificationManager {
    connection: Option<Connection>,
}

impl NotificationManager {
    pub async fn new() -> Self {
        Self {
            connection: Connection::session().await.ok(),
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.connection.is_some()
    }

    /// # Errors
    /// Returns a zbus error if there is no session bus or the call fails
    pub async fn show(
        &self,
        kind: NotificationType,
        title: &str,
        message: &str,
    ) -> zbus::Result<u32> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| zbus::Error::Failure("no session bus for notifications".into()))?;
        let proxy = NotificationsProxy::new(connection).await?;

        let hints = HashMap::from([("urgency", Value::U8(kind.urgency() as u8))]);
        proxy
            .notify(
                APP_NAME,
                0,
                kind.icon(),
                title,
                message,
                vec![],
                hints,
                EXPIRE_TIMEOUT_MS,
            )
            .await
    }
}

static NOTIFICATION_MANAGER: OnceLock<NotificationManager> = OnceLock::new();

/// Connect the process-wide notification manager. Later calls are no-ops.
pub async fn init_notification_manager() {
    if NOTIFICATION_MANAGER.get().is_none() {
        let manager = NotificationManager::new().await;
        let _ = NOTIFICATION_MANAGER.set(manager);
    }
}

/// # Errors
/// Returns a zbus error if notifications are unavailable or the call fails
pub async fn show_system_notification(
    kind: NotificationType,
    title: &str,
    message: &str,
) -> zbus::Result<u32> {
    match NOTIFICATION_MANAGER.get() {
        Some(manager) => manager.show(kind, title, message).await,
        None => Err(zbus::Error::Failure(
            "notification manager not initialized".into(),
        )),
    }
}

pub fn notifications_available() -> bool {
    NOTIFICATION_MANAGER
        .get()
        .is_some_and(NotificationManager::is_available)
}
