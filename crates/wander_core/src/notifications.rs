use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationType {
    Info,
    Success,
    Warning,
    Error,
}

/// A toast-style message for the user. Never blocks the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppNotification {
    pub id: String,
    pub notification_type: NotificationType,
    pub title: Option<String>,
    pub message: String,
    pub read: bool,
    pub timestamp: DateTime<Utc>,
}

impl AppNotification {
    pub fn new(notification_type: NotificationType, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            notification_type,
            title: None,
            message: message.into(),
            read: false,
            timestamp: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// In-memory notification store, newest first, shared across tasks.
pub struct NotificationStore {
    notifications: Mutex<Vec<AppNotification>>,
    max_notifications: usize,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(max_notifications: usize) -> Self {
        Self {
            notifications: Mutex::new(Vec::new()),
            max_notifications,
        }
    }

    pub fn push(&self, notification: AppNotification) {
        let mut list = self.notifications.lock();
        list.insert(0, notification);
        list.truncate(self.max_notifications);
    }

    pub fn mark_all_read(&self) {
        for n in self.notifications.lock().iter_mut() {
            n.read = true;
        }
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.lock().iter().filter(|n| !n.read).count()
    }

    pub fn latest(&self) -> Option<AppNotification> {
        self.notifications.lock().first().cloned()
    }

    pub fn all(&self) -> Vec<AppNotification> {
        self.notifications.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.notifications.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.lock().is_empty()
    }

    pub fn clear(&self) {
        self.notifications.lock().clear();
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}
