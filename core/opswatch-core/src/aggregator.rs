//! Bounded, deduplicated notification list.

use opswatch_protocol::NotificationItem;
use std::collections::HashSet;

/// Prepends the incoming items that are not already listed, then truncates to
/// `capacity`.
///
/// Pure: the existing list is never touched, a new list is returned. Incoming
/// items are expected newest first; their relative order is kept. An id that
/// collides with a listed item, or with an earlier incoming item, is dropped.
pub fn merge(
    existing: &[NotificationItem],
    incoming: Vec<NotificationItem>,
    capacity: usize,
) -> Vec<NotificationItem> {
    let mut seen: HashSet<String> = existing.iter().map(|item| item.id.clone()).collect();

    let fresh: Vec<NotificationItem> = incoming
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect();

    fresh
        .into_iter()
        .chain(existing.iter().cloned())
        .take(capacity)
        .collect()
}
