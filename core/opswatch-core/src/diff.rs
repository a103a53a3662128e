//! Transition detection between consecutive snapshots of one source.
//!
//! Only status *changes* of entities present in both the previous snapshot and
//! the new fetch produce events. New entities and vanished entities are
//! silent, and the first fetch of a source (no previous snapshot) is a priming
//! pass that emits nothing.

use chrono::{DateTime, Local, Utc};
use opswatch_protocol::{EntityStatus, NotificationItem, Severity, SourceTag};
use std::collections::HashSet;

use crate::snapshot::{Snapshot, TrackedEntity};

pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvent {
    pub source: SourceTag,
    pub identity: String,
    pub previous: EntityStatus,
    pub current: EntityStatus,
    pub observed_at: DateTime<Utc>,
}

impl TransitionEvent {
    /// Deterministic in `(source, identity, current, observed_at)`, so diffing
    /// the same input twice yields ids the aggregator already holds.
    pub fn id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.source,
            self.identity,
            self.current,
            self.observed_at.timestamp_millis()
        )
    }

    pub fn severity(&self) -> Severity {
        severity_for(self.source, self.current)
    }

    pub fn into_notification(self) -> NotificationItem {
        let (title, description) = describe(self.source, &self.identity, self.current);
        NotificationItem {
            id: self.id(),
            title,
            description: Some(description),
            timestamp: self
                .observed_at
                .with_timezone(&Local)
                .format(DISPLAY_TIME_FORMAT)
                .to_string(),
            severity: self.severity(),
            source: self.source,
            created_at: self.observed_at,
            read: false,
        }
    }
}

pub fn severity_for(source: SourceTag, status: EntityStatus) -> Severity {
    match (source, status) {
        (_, EntityStatus::Online) => Severity::Success,
        (_, EntityStatus::Offline) => Severity::Error,
        (SourceTag::Pppoe, EntityStatus::Active) => Severity::Info,
        (SourceTag::Pppoe, EntityStatus::Inactive) => Severity::Warning,
        (_, EntityStatus::Active) => Severity::Success,
        (_, EntityStatus::Inactive) => Severity::Warning,
    }
}

fn describe(source: SourceTag, identity: &str, status: EntityStatus) -> (String, String) {
    match (source, status) {
        (SourceTag::Device, EntityStatus::Online) => (
            "Device online".to_string(),
            format!("{} is back online", identity),
        ),
        (SourceTag::Device, EntityStatus::Offline) => (
            "Device offline".to_string(),
            format!("{} went offline", identity),
        ),
        (SourceTag::Pppoe, EntityStatus::Active) => (
            "PPPoE session connected".to_string(),
            format!("{} connected", identity),
        ),
        (SourceTag::Pppoe, EntityStatus::Inactive) => (
            "PPPoE session disconnected".to_string(),
            format!("{} disconnected", identity),
        ),
        _ => (
            format!("{} status changed", source),
            format!("{} is now {}", identity, status),
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOutcome {
    pub events: Vec<TransitionEvent>,
    pub snapshot: Snapshot,
    /// True when this was the source's first observation.
    pub primed: bool,
}

pub fn diff(
    source: SourceTag,
    records: &[TrackedEntity],
    previous: Option<&Snapshot>,
    observed_at: DateTime<Utc>,
) -> DiffOutcome {
    let snapshot = Snapshot::from_entities(records);

    let Some(previous) = previous else {
        return DiffOutcome {
            events: Vec::new(),
            snapshot,
            primed: true,
        };
    };

    let mut seen = HashSet::new();
    let mut events = Vec::new();
    for record in records {
        if !seen.insert(record.identity.as_str()) {
            continue;
        }
        let Some(current) = snapshot.status_of(&record.identity) else {
            continue;
        };
        match previous.status_of(&record.identity) {
            Some(prior) if prior != current => events.push(TransitionEvent {
                source,
                identity: record.identity.clone(),
                previous: prior,
                current,
                observed_at,
            }),
            _ => {}
        }
    }

    DiffOutcome {
        events,
        snapshot,
        primed: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use opswatch_protocol::parse_rfc3339;

    fn at(value: &str) -> DateTime<Utc> {
        parse_rfc3339(value).expect("parse")
    }

    fn entity(identity: &str, status: EntityStatus) -> TrackedEntity {
        TrackedEntity::new(identity, status)
    }

    #[test]
    fn first_fetch_primes_without_events() {
        let records = vec![
            entity("a", EntityStatus::Offline),
            entity("b", EntityStatus::Offline),
            entity("c", EntityStatus::Online),
        ];
        let outcome = diff(
            SourceTag::Device,
            &records,
            None,
            at("2026-01-30T12:00:00Z"),
        );

        assert!(outcome.primed);
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.snapshot.len(), 3);
    }

    #[test]
    fn offline_to_online_emits_one_success_event() {
        let previous = Snapshot::from_entities(&[entity("A", EntityStatus::Offline)]);
        let observed_at = at("2026-01-30T12:00:00Z");
        let outcome = diff(
            SourceTag::Device,
            &[entity("A", EntityStatus::Online)],
            Some(&previous),
            observed_at,
        );

        assert_eq!(outcome.events.len(), 1);
        let event = &outcome.events[0];
        assert_eq!(event.previous, EntityStatus::Offline);
        assert_eq!(event.current, EntityStatus::Online);
        assert_eq!(event.severity(), Severity::Success);
        assert_eq!(outcome.snapshot.status_of("A"), Some(EntityStatus::Online));
    }

    #[test]
    fn new_entity_is_not_a_transition() {
        let previous = Snapshot::default();
        let outcome = diff(
            SourceTag::Device,
            &[entity("B", EntityStatus::Online)],
            Some(&previous),
            at("2026-01-30T12:00:00Z"),
        );

        assert!(!outcome.primed);
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.snapshot.status_of("B"), Some(EntityStatus::Online));
    }

    #[test]
    fn disappearance_is_silent_and_drops_entity() {
        let previous = Snapshot::from_entities(&[
            entity("gone", EntityStatus::Online),
            entity("stays", EntityStatus::Online),
        ]);
        let outcome = diff(
            SourceTag::Device,
            &[entity("stays", EntityStatus::Online)],
            Some(&previous),
            at("2026-01-30T12:00:00Z"),
        );

        assert!(outcome.events.is_empty());
        assert_eq!(outcome.snapshot.status_of("gone"), None);
    }

    #[test]
    fn session_severities_follow_connect_direction() {
        let previous = Snapshot::from_entities(&[
            entity("alice", EntityStatus::Inactive),
            entity("bob", EntityStatus::Active),
        ]);
        let outcome = diff(
            SourceTag::Pppoe,
            &[
                entity("alice", EntityStatus::Active),
                entity("bob", EntityStatus::Inactive),
            ],
            Some(&previous),
            at("2026-01-30T12:00:00Z"),
        );

        let severities: Vec<_> = outcome
            .events
            .iter()
            .map(|event| (event.identity.as_str(), event.severity()))
            .collect();
        assert_eq!(
            severities,
            vec![("alice", Severity::Info), ("bob", Severity::Warning)]
        );
    }

    #[test]
    fn device_offline_is_error() {
        assert_eq!(
            severity_for(SourceTag::Device, EntityStatus::Offline),
            Severity::Error
        );
    }

    #[test]
    fn event_ids_are_deterministic_and_distinct_per_observation() {
        let previous = Snapshot::from_entities(&[entity("A", EntityStatus::Offline)]);
        let records = [entity("A", EntityStatus::Online)];
        let t = at("2026-01-30T12:00:00Z");

        let first = diff(SourceTag::Device, &records, Some(&previous), t);
        let again = diff(SourceTag::Device, &records, Some(&previous), t);
        assert_eq!(first.events[0].id(), again.events[0].id());
        assert_eq!(first.events[0].id(), format!("device:A:online:{}", t.timestamp_millis()));

        let later = diff(
            SourceTag::Device,
            &records,
            Some(&previous),
            t + Duration::seconds(30),
        );
        assert_ne!(first.events[0].id(), later.events[0].id());
    }

    #[test]
    fn duplicate_identity_in_fetch_emits_at_most_once() {
        let previous = Snapshot::from_entities(&[entity("A", EntityStatus::Offline)]);
        let outcome = diff(
            SourceTag::Device,
            &[
                entity("A", EntityStatus::Online),
                entity("A", EntityStatus::Online),
            ],
            Some(&previous),
            at("2026-01-30T12:00:00Z"),
        );
        assert_eq!(outcome.events.len(), 1);
    }

    #[test]
    fn notification_carries_observation_instant() {
        let observed_at = at("2026-01-30T12:00:00Z");
        let item = TransitionEvent {
            source: SourceTag::Pppoe,
            identity: "alice".to_string(),
            previous: EntityStatus::Active,
            current: EntityStatus::Inactive,
            observed_at,
        }
        .into_notification();

        assert_eq!(item.created_at, observed_at);
        assert_eq!(item.source, SourceTag::Pppoe);
        assert_eq!(item.severity, Severity::Warning);
        assert_eq!(item.title, "PPPoE session disconnected");
        assert_eq!(item.description.as_deref(), Some("alice disconnected"));
        assert!(!item.read);
    }
}
