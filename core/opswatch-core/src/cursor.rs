//! Read cursor: the persisted boundary between seen and unseen notifications.
//!
//! The unread count is never stored. It is recomputed from the current list on
//! every change with [`unread_count`], so evicting an unread item cannot leave
//! a stale counter behind.

use chrono::{DateTime, SecondsFormat, Utc};
use opswatch_protocol::{parse_rfc3339, NotificationItem};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::kv::DurableKeyValueStore;

const CURSOR_KEY_PREFIX: &str = "notifications.read_cursor.";

pub fn cursor_key(profile: &str) -> String {
    format!("{}{}", CURSOR_KEY_PREFIX, profile)
}

pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Items created strictly after the cursor are unread.
pub fn unread_count(items: &[NotificationItem], cursor: DateTime<Utc>) -> usize {
    items.iter().filter(|item| item.created_at > cursor).count()
}

pub struct ReadCursor {
    store: Arc<dyn DurableKeyValueStore>,
    key: String,
    value: RwLock<DateTime<Utc>>,
}

impl ReadCursor {
    /// Loads the cursor for `profile`. Missing, unreadable, or corrupt values
    /// all start from epoch zero.
    pub fn load(store: Arc<dyn DurableKeyValueStore>, profile: &str) -> Self {
        let key = cursor_key(profile);
        let value = match store.get(&key) {
            Ok(Some(raw)) => match parse_rfc3339(&raw) {
                Some(value) => value,
                None => {
                    warn!(key = %key, raw = %raw, "Corrupt read cursor; treating everything as unread");
                    epoch()
                }
            },
            Ok(None) => epoch(),
            Err(err) => {
                warn!(key = %key, error = %err, "Failed to read cursor; treating everything as unread");
                epoch()
            }
        };
        debug!(key = %key, cursor = %value.to_rfc3339(), "Read cursor loaded");

        Self {
            store,
            key,
            value: RwLock::new(value),
        }
    }

    pub fn value(&self) -> DateTime<Utc> {
        *self
            .value
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Moves the cursor to `now` (never backwards) and persists it before
    /// returning. The in-memory value advances even when persisting fails;
    /// the error is handed back so the caller can report it.
    pub fn mark_all_read(&self, now: DateTime<Utc>) -> crate::Result<DateTime<Utc>> {
        let next = {
            let mut value = self
                .value
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if now > *value {
                *value = now;
            }
            *value
        };

        self.store
            .set(&self.key, &next.to_rfc3339_opts(SecondsFormat::AutoSi, false))?;
        Ok(next)
    }
}
