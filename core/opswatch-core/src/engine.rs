//! NotificationEngine: one poll cycle end to end.
//!
//! A cycle fans out to every source adapter at once, waits for all of them,
//! and folds whatever succeeded into the snapshot store and the notification
//! list. A failed source is logged and skipped; it keeps its previous snapshot
//! so a flaky link never reads as "everything went offline".
//!
//! ```text
//! adapters (parallel) → diff against snapshots → merge into list → unread count
//! ```
//!
//! The notification list is an `Arc<Vec<_>>` swapped on every write, so
//! readers always hold a complete version even while a cycle is running.
//! Cycles never overlap: a cycle that starts while another is in flight
//! returns [`CycleOutcome::Skipped`] without calling any adapter.

use chrono::{DateTime, Duration, Utc};
use opswatch_protocol::{ActivityRecord, NotificationItem, SourceTag};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, RwLock};
use std::thread;
use tracing::{debug, info, warn};

use crate::aggregator::merge;
use crate::clock::{Clock, SystemClock};
use crate::config::DEFAULT_CAPACITY;
use crate::cursor::{epoch, unread_count, ReadCursor};
use crate::diff::{diff, TransitionEvent};
use crate::error::{Result, WatchError};
use crate::kv::DurableKeyValueStore;
use crate::snapshot::SnapshotStore;
use crate::sources::{SourceAdapter, SourceBatch};

/// Published to subscribers whenever the list or the unread count changes.
#[derive(Debug, Clone)]
pub struct FeedUpdate {
    pub items: Arc<Vec<NotificationItem>>,
    pub unread: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub observed_at: Option<DateTime<Utc>>,
    /// Sources whose first successful fetch happened in this cycle.
    pub primed: Vec<SourceTag>,
    pub failed: Vec<SourceTag>,
    pub new_items: usize,
    pub unread: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle was still in flight; nothing was fetched.
    Skipped,
}

struct CycleState {
    snapshots: SnapshotStore,
    last_observed: Option<DateTime<Utc>>,
}

impl CycleState {
    /// Millisecond-truncated and strictly increasing, so every item of one
    /// cycle is newer than every item of the previous one. Always later than
    /// `cursor`, so a cycle's items are never born read.
    fn next_observation(&mut self, now: DateTime<Utc>, cursor: DateTime<Utc>) -> DateTime<Utc> {
        let mut next = truncate_millis(now);
        if let Some(last) = self.last_observed {
            if next <= last {
                next = last + Duration::milliseconds(1);
            }
        }
        if next <= cursor {
            next = truncate_millis(cursor) + Duration::milliseconds(1);
        }
        self.last_observed = Some(next);
        next
    }
}

fn truncate_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(instant.timestamp_millis()).unwrap_or(instant)
}

/// Clears the busy flag when the cycle ends, however it ends.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct NotificationEngine {
    adapters: Vec<Box<dyn SourceAdapter>>,
    clock: Arc<dyn Clock>,
    cursor: ReadCursor,
    capacity: usize,
    busy: AtomicBool,
    state: Mutex<CycleState>,
    feed: RwLock<Arc<Vec<NotificationItem>>>,
    subscribers: Mutex<Vec<mpsc::Sender<FeedUpdate>>>,
}

impl NotificationEngine {
    pub fn new(
        adapters: Vec<Box<dyn SourceAdapter>>,
        store: Arc<dyn DurableKeyValueStore>,
        profile: &str,
    ) -> Self {
        Self {
            adapters,
            clock: Arc::new(SystemClock),
            cursor: ReadCursor::load(store, profile),
            capacity: DEFAULT_CAPACITY,
            busy: AtomicBool::new(false),
            state: Mutex::new(CycleState {
                snapshots: SnapshotStore::new(),
                last_observed: None,
            }),
            feed: RwLock::new(Arc::new(Vec::new())),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sources(&self) -> Vec<SourceTag> {
        self.adapters.iter().map(|adapter| adapter.source()).collect()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn notifications(&self) -> Arc<Vec<NotificationItem>> {
        Arc::clone(
            &self
                .feed
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    pub fn unread_count(&self) -> usize {
        unread_count(&self.notifications(), self.cursor.value())
    }

    pub fn cursor(&self) -> DateTime<Utc> {
        self.cursor.value()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<FeedUpdate> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    /// First cycle after startup. Every source that answers is seeded without
    /// producing transition events.
    pub fn prime(&self) -> CycleOutcome {
        info!(sources = self.adapters.len(), "Priming notification sources");
        self.run_cycle()
    }

    pub fn run_cycle(&self) -> CycleOutcome {
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            debug!("Poll cycle still in flight; skipping trigger");
            return CycleOutcome::Skipped;
        };

        let results = self.fetch_all();

        // Stamp and publish under the feed lock so mark_all_read() cannot slip
        // between choosing the instant and merging the items.
        let mut state = self.lock_state();
        let mut feed = self
            .feed
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let cursor = self.cursor.value();
        let observed_at = state.next_observation(self.clock.now(), cursor);

        let mut report = CycleReport {
            observed_at: Some(observed_at),
            ..CycleReport::default()
        };
        let mut incoming = Vec::new();
        for (source, result) in results {
            let batch = match result {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(source = %source, error = %err, "Source fetch failed; skipping this cycle");
                    report.failed.push(source);
                    continue;
                }
            };

            if !state.snapshots.is_primed(source) {
                report.primed.push(source);
            }
            match batch {
                SourceBatch::Activity(records) => {
                    incoming.extend(fold_activity(
                        &mut state.snapshots,
                        records,
                        observed_at,
                    ));
                }
                SourceBatch::Entities(entities) => {
                    let previous = state.snapshots.get(source);
                    let outcome = diff(source, &entities, previous.as_deref(), observed_at);
                    if outcome.primed {
                        debug!(
                            source = %source,
                            entities = outcome.snapshot.len(),
                            "Source primed"
                        );
                    }
                    for event in &outcome.events {
                        info!(
                            source = %source,
                            identity = %event.identity,
                            from = %event.previous,
                            to = %event.current,
                            "State transition detected"
                        );
                    }
                    incoming.extend(
                        outcome
                            .events
                            .into_iter()
                            .map(TransitionEvent::into_notification),
                    );
                    state.snapshots.replace(source, outcome.snapshot);
                }
            }
        }

        let (items, unread, added) = self.publish_merge(&mut *feed, incoming, cursor);
        drop(feed);
        drop(state);
        report.new_items = added;
        report.unread = unread;
        debug!(
            observed_at = %observed_at.to_rfc3339(),
            new_items = added,
            failed = report.failed.len(),
            listed = items.len(),
            unread,
            "Poll cycle complete"
        );
        if added > 0 {
            self.notify(FeedUpdate { items, unread });
        }
        CycleOutcome::Completed(report)
    }

    /// Moves the read cursor to now (or to the newest listed item, whichever is
    /// later) and persists it before returning. Items already listed, and any
    /// item later merged with an earlier creation instant, count as read.
    pub fn mark_all_read(&self) -> Result<()> {
        let (items, result) = {
            let mut feed = self
                .feed
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let newest = feed.iter().map(|item| item.created_at).max();
            let target = newest.map_or(self.clock.now(), |newest| newest.max(self.clock.now()));
            let result = self.cursor.mark_all_read(target);
            let cursor = self.cursor.value();

            let updated: Vec<NotificationItem> = feed
                .iter()
                .cloned()
                .map(|mut item| {
                    item.read = item.created_at <= cursor;
                    item
                })
                .collect();
            *feed = Arc::new(updated);
            (Arc::clone(&feed), result)
        };

        match &result {
            Ok(cursor) => info!(cursor = %cursor.to_rfc3339(), "Marked all notifications read"),
            Err(err) => warn!(error = %err, "Failed to persist read cursor"),
        }
        let unread = unread_count(&items, self.cursor.value());
        self.notify(FeedUpdate { items, unread });
        result.map(|_| ())
    }

    fn fetch_all(&self) -> Vec<(SourceTag, Result<SourceBatch>)> {
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .adapters
                .iter()
                .map(|adapter| {
                    let source = adapter.source();
                    (source, scope.spawn(move || adapter.fetch()))
                })
                .collect();

            handles
                .into_iter()
                .map(|(source, handle)| {
                    let result = handle
                        .join()
                        .unwrap_or(Err(WatchError::AdapterPanicked { source_tag: source }));
                    (source, result)
                })
                .collect()
        })
    }

    fn publish_merge(
        &self,
        feed: &mut Arc<Vec<NotificationItem>>,
        incoming: Vec<NotificationItem>,
        cursor: DateTime<Utc>,
    ) -> (Arc<Vec<NotificationItem>>, usize, usize) {
        let merged: Vec<NotificationItem> = merge(feed.as_slice(), incoming, self.capacity)
            .into_iter()
            .map(|mut item| {
                item.read = item.created_at <= cursor;
                item
            })
            .collect();

        // Counted after truncation: only items that actually made the list.
        let added = {
            let existing: HashSet<&str> = feed.iter().map(|item| item.id.as_str()).collect();
            merged
                .iter()
                .filter(|item| !existing.contains(item.id.as_str()))
                .count()
        };
        let unread = unread_count(&merged, cursor);
        *feed = Arc::new(merged);
        (Arc::clone(feed), unread, added)
    }

    fn notify(&self, update: FeedUpdate) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|tx| tx.send(update.clone()).is_ok());
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CycleState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Turns activity feed rows that were not in the previous fetch into
/// notifications, then records the current row ids.
///
/// Rows seen on the priming fetch keep their upstream creation time (or epoch
/// zero), so a restart does not resurrect items already marked read. Rows that
/// show up later are stamped with the observation instant.
fn fold_activity(
    snapshots: &mut SnapshotStore,
    records: Vec<ActivityRecord>,
    observed_at: DateTime<Utc>,
) -> Vec<NotificationItem> {
    let previous = snapshots.activity_ids();
    let priming = previous.is_none();
    let current: HashSet<String> = records.iter().map(|record| record.id.clone()).collect();

    let items = records
        .into_iter()
        .filter(|record| {
            previous
                .as_ref()
                .map_or(true, |previous| !previous.contains(&record.id))
        })
        .map(|record| {
            let created_at = if priming {
                record.created_instant().unwrap_or_else(epoch)
            } else {
                observed_at
            };
            activity_notification(record, created_at)
        })
        .collect();

    snapshots.replace_activity(current);
    items
}

fn activity_notification(record: ActivityRecord, created_at: DateTime<Utc>) -> NotificationItem {
    let severity = record.severity();
    NotificationItem {
        id: format!("{}:{}", SourceTag::Activity, record.id),
        title: record.title,
        description: record.description.filter(|value| !value.trim().is_empty()),
        timestamp: record.timestamp,
        severity,
        source: SourceTag::Activity,
        created_at,
        read: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::kv::InMemoryKeyValueStore;
    use crate::snapshot::TrackedEntity;
    use opswatch_protocol::{parse_rfc3339, EntityStatus, Severity};
    use std::collections::VecDeque;

    fn at(value: &str) -> DateTime<Utc> {
        parse_rfc3339(value).expect("parse")
    }

    struct ScriptedAdapter {
        source: SourceTag,
        batches: Mutex<VecDeque<Result<SourceBatch>>>,
    }

    impl ScriptedAdapter {
        fn boxed(source: SourceTag, batches: Vec<Result<SourceBatch>>) -> Box<dyn SourceAdapter> {
            Box::new(Self {
                source,
                batches: Mutex::new(batches.into()),
            })
        }
    }

    impl SourceAdapter for ScriptedAdapter {
        fn source(&self) -> SourceTag {
            self.source
        }

        fn fetch(&self) -> Result<SourceBatch> {
            self.batches
                .lock()
                .expect("lock batches")
                .pop_front()
                .unwrap_or_else(|| Err(WatchError::Storage("script exhausted".to_string())))
        }
    }

    fn activity(id: &str, created_at: Option<&str>) -> ActivityRecord {
        ActivityRecord {
            id: id.to_string(),
            title: format!("Activity {}", id),
            description: Some(String::new()),
            timestamp: "just now".to_string(),
            status: "warning".to_string(),
            created_at: created_at.map(str::to_string),
        }
    }

    fn entities(entries: &[(&str, EntityStatus)]) -> Result<SourceBatch> {
        Ok(SourceBatch::Entities(
            entries
                .iter()
                .map(|(identity, status)| TrackedEntity::new(*identity, *status))
                .collect(),
        ))
    }

    fn engine_with(
        adapters: Vec<Box<dyn SourceAdapter>>,
        clock: Arc<ManualClock>,
    ) -> NotificationEngine {
        NotificationEngine::new(adapters, Arc::new(InMemoryKeyValueStore::new()), "default")
            .with_clock(clock)
    }

    #[test]
    fn observation_instants_strictly_increase() {
        let mut state = CycleState {
            snapshots: SnapshotStore::new(),
            last_observed: None,
        };
        let t = at("2026-01-30T12:00:00.000900Z");
        let first = state.next_observation(t, epoch());
        let second = state.next_observation(t, epoch());
        let third = state.next_observation(t - Duration::seconds(5), epoch());

        assert_eq!(first, at("2026-01-30T12:00:00Z"));
        assert_eq!(second, first + Duration::milliseconds(1));
        assert_eq!(third, second + Duration::milliseconds(1));
    }

    #[test]
    fn observation_instant_lands_after_the_read_cursor() {
        let mut state = CycleState {
            snapshots: SnapshotStore::new(),
            last_observed: None,
        };
        let cursor = at("2026-01-30T12:00:05.000400Z");

        let observed = state.next_observation(at("2026-01-30T12:00:00Z"), cursor);
        assert_eq!(observed, at("2026-01-30T12:00:05.001Z"));
        assert!(observed > cursor);

        let later = state.next_observation(at("2026-01-30T12:01:00Z"), cursor);
        assert_eq!(later, at("2026-01-30T12:01:00Z"));
    }

    #[test]
    fn new_items_counts_only_what_fits_in_the_list() {
        let clock = Arc::new(ManualClock::new(at("2026-01-30T12:00:00Z")));
        let engine = engine_with(
            vec![ScriptedAdapter::boxed(
                SourceTag::Activity,
                vec![
                    Ok(SourceBatch::Activity(Vec::new())),
                    Ok(SourceBatch::Activity(vec![
                        activity("a-3", None),
                        activity("a-2", None),
                        activity("a-1", None),
                    ])),
                ],
            )],
            Arc::clone(&clock),
        )
        .with_capacity(2);

        engine.prime();
        clock.advance(Duration::seconds(30));
        let CycleOutcome::Completed(report) = engine.run_cycle() else {
            panic!("cycle skipped");
        };
        assert_eq!(report.new_items, 2);
        assert_eq!(engine.notifications().len(), 2);
    }

    #[test]
    fn busy_guard_releases_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _guard = BusyGuard::acquire(&flag).expect("first acquire");
            assert!(BusyGuard::acquire(&flag).is_none());
        }
        assert!(BusyGuard::acquire(&flag).is_some());
    }

    #[test]
    fn priming_activity_uses_upstream_time_or_epoch() {
        let clock = Arc::new(ManualClock::new(at("2026-01-30T12:00:00Z")));
        let engine = engine_with(
            vec![ScriptedAdapter::boxed(
                SourceTag::Activity,
                vec![Ok(SourceBatch::Activity(vec![
                    activity("a-1", Some("2026-01-30T11:00:00Z")),
                    activity("a-2", None),
                ]))],
            )],
            clock,
        );

        let outcome = engine.prime();
        let CycleOutcome::Completed(report) = outcome else {
            panic!("priming cycle skipped");
        };
        assert_eq!(report.primed, vec![SourceTag::Activity]);

        let items = engine.notifications();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "activity:a-1");
        assert_eq!(items[0].created_at, at("2026-01-30T11:00:00Z"));
        assert_eq!(items[0].severity, Severity::Warning);
        assert_eq!(items[0].description, None);
        assert_eq!(items[1].created_at, epoch());
        // Cursor at epoch: the dated row is unread, the undated one is not.
        assert_eq!(engine.unread_count(), 1);
    }

    #[test]
    fn activity_rows_already_seen_are_not_repeated_after_eviction() {
        let clock = Arc::new(ManualClock::new(at("2026-01-30T12:00:00Z")));
        let engine = engine_with(
            vec![ScriptedAdapter::boxed(
                SourceTag::Activity,
                vec![
                    Ok(SourceBatch::Activity(vec![activity("a-1", None)])),
                    Ok(SourceBatch::Activity(vec![
                        activity("a-3", None),
                        activity("a-2", None),
                        activity("a-1", None),
                    ])),
                    Ok(SourceBatch::Activity(vec![
                        activity("a-3", None),
                        activity("a-2", None),
                        activity("a-1", None),
                    ])),
                ],
            )],
            Arc::clone(&clock),
        )
        .with_capacity(2);

        engine.prime();
        clock.advance(Duration::seconds(30));
        engine.run_cycle();
        let ids: Vec<_> = engine
            .notifications()
            .iter()
            .map(|item| item.id.clone())
            .collect();
        // a-1 was evicted by capacity but stays in the feed.
        assert_eq!(ids, vec!["activity:a-3", "activity:a-2"]);

        clock.advance(Duration::seconds(30));
        let CycleOutcome::Completed(report) = engine.run_cycle() else {
            panic!("cycle skipped");
        };
        assert_eq!(report.new_items, 0);
    }

    #[test]
    fn mark_all_read_covers_items_bumped_past_the_clock() {
        let clock = Arc::new(ManualClock::new(at("2026-01-30T12:00:00Z")));
        let engine = engine_with(
            vec![ScriptedAdapter::boxed(
                SourceTag::Device,
                vec![
                    entities(&[("cpe-1", EntityStatus::Online)]),
                    entities(&[("cpe-1", EntityStatus::Offline)]),
                ],
            )],
            Arc::clone(&clock),
        );

        // Clock frozen: the second cycle is stamped 1ms after "now".
        engine.prime();
        engine.run_cycle();
        assert_eq!(engine.unread_count(), 1);

        engine.mark_all_read().expect("mark read");
        assert_eq!(engine.unread_count(), 0);
        assert!(engine.notifications().iter().all(|item| item.read));
    }

    #[test]
    fn subscribers_receive_updates_with_unread_count() {
        let clock = Arc::new(ManualClock::new(at("2026-01-30T12:00:00Z")));
        let engine = engine_with(
            vec![ScriptedAdapter::boxed(
                SourceTag::Pppoe,
                vec![
                    entities(&[("alice", EntityStatus::Inactive)]),
                    entities(&[("alice", EntityStatus::Active)]),
                ],
            )],
            Arc::clone(&clock),
        );
        let updates = engine.subscribe();

        engine.prime();
        assert!(updates.try_recv().is_err());

        clock.advance(Duration::seconds(30));
        engine.run_cycle();
        let update = updates.try_recv().expect("update after transition");
        assert_eq!(update.unread, 1);
        assert_eq!(update.items[0].severity, Severity::Info);
    }

    #[test]
    fn panicking_adapter_counts_as_failed_source() {
        struct PanickingAdapter;
        impl SourceAdapter for PanickingAdapter {
            fn source(&self) -> SourceTag {
                SourceTag::Device
            }
            fn fetch(&self) -> Result<SourceBatch> {
                panic!("adapter bug");
            }
        }

        let clock = Arc::new(ManualClock::new(at("2026-01-30T12:00:00Z")));
        let engine = engine_with(
            vec![
                Box::new(PanickingAdapter) as Box<dyn SourceAdapter>,
                ScriptedAdapter::boxed(
                    SourceTag::Pppoe,
                    vec![entities(&[("alice", EntityStatus::Active)])],
                ),
            ],
            clock,
        );

        let CycleOutcome::Completed(report) = engine.prime() else {
            panic!("cycle skipped");
        };
        assert_eq!(report.failed, vec![SourceTag::Device]);
        assert_eq!(report.primed, vec![SourceTag::Pppoe]);
        assert!(!engine.is_busy());
    }
}
