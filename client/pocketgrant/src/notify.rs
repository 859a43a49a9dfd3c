//! Keyed notification registry.
//!
//! Each operation key owns at most one visible notification. Showing a new
//! message under an existing key replaces the old one; distinct keys are
//! independent.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub key: String,
    pub kind: NotificationKind,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct NotificationRegistry {
    entries: Mutex<HashMap<String, Notification>>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `message` under `key`, replacing whatever was there.
    pub fn show(&self, key: &str, kind: NotificationKind, message: impl Into<String>) {
        let message = message.into();
        match kind {
            NotificationKind::Error => warn!(key, %message, "notification"),
            _ => info!(key, ?kind, %message, "notification"),
        }
        let notification = Notification {
            key: key.to_string(),
            kind,
            message,
            updated_at: Utc::now(),
        };
        self.lock().insert(key.to_string(), notification);
    }

    pub fn dismiss(&self, key: &str) -> Option<Notification> {
        self.lock().remove(key)
    }

    pub fn get(&self, key: &str) -> Option<Notification> {
        self.lock().get(key).cloned()
    }

    /// All visible notifications, ordered by key.
    pub fn active(&self) -> Vec<Notification> {
        let mut all: Vec<Notification> = self.lock().values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Notification>> {
        // A poisoned map still holds valid notifications.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_replaces() {
        let registry = NotificationRegistry::new();
        registry.show("claim-tx", NotificationKind::Loading, "waiting for wallet");
        registry.show("claim-tx", NotificationKind::Loading, "waiting for wallet");
        registry.show("claim-tx", NotificationKind::Success, "claimed");

        let active = registry.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kind, NotificationKind::Success);
        assert_eq!(active[0].message, "claimed");
    }

    #[test]
    fn distinct_keys_do_not_clobber() {
        let registry = NotificationRegistry::new();
        registry.show("approve-tx", NotificationKind::Loading, "approving");
        registry.show("create-tx", NotificationKind::Error, "failed");

        assert_eq!(registry.active().len(), 2);
        assert_eq!(
            registry.get("approve-tx").map(|n| n.kind),
            Some(NotificationKind::Loading)
        );

        registry.dismiss("approve-tx");
        assert!(registry.get("approve-tx").is_none());
        assert_eq!(registry.active().len(), 1);
    }
}
