use std::sync::Mutex;

use crate::domain::{Notification, NotificationId, NotificationSink};

/// Notifications a feed keeps unless told otherwise.
pub const DEFAULT_FEED_CAPACITY: usize = 1_000;

/// In-memory notification feed backing the admin panel's bell icon.
///
/// The feed is bounded: once it holds `capacity` notifications, publishing
/// evicts the oldest read one, or the oldest overall if everything is unread.
pub struct NotificationFeed {
    items: Mutex<Vec<Notification>>,
    capacity: usize,
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// A feed holding at most `capacity` notifications (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// All notifications, newest first.
    pub fn list(&self) -> Vec<Notification> {
        let mut items = self.lock().clone();
        items.reverse();
        items
    }

    /// Unread notifications, newest first.
    pub fn unread(&self) -> Vec<Notification> {
        self.lock()
            .iter()
            .rev()
            .filter(|n| !n.read)
            .cloned()
            .collect()
    }

    pub fn unread_count(&self) -> usize {
        self.lock().iter().filter(|n| !n.read).count()
    }

    /// Returns false if no notification has this id.
    pub fn mark_read(&self, id: NotificationId) -> bool {
        match self.lock().iter_mut().find(|n| n.id == id) {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&self) {
        for notification in self.lock().iter_mut() {
            notification.read = true;
        }
    }

    /// Drop every read notification. Returns how many were removed.
    pub fn clear_read(&self) -> usize {
        let mut items = self.lock();
        let before = items.len();
        items.retain(|n| !n.read);
        before - items.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Notification>> {
        // A poisoned feed still holds valid notifications.
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl NotificationSink for NotificationFeed {
    fn publish(&self, notification: Notification) {
        let mut items = self.lock();
        items.push(notification);
        while items.len() > self.capacity {
            let evict = items.iter().position(|n| n.read).unwrap_or(0);
            items.remove(evict);
        }
    }
}

/// Writes each notification as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn publish(&self, notification: Notification) {
        tracing::info!(
            kind = notification.kind.as_str(),
            account_id = %notification.account_id,
            "{}",
            notification.message
        );
    }
}
