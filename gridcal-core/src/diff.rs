//! Diff computation between the current parse and the prior synced state.
//!
//! A pure function of two snapshots; no I/O. The output is the minimal
//! operation set: unchanged events are never re-sent, because every update
//! the remote store accepts becomes a visible change notification for
//! calendar subscribers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostic;
use crate::event::CanonicalEvent;
use crate::identity::EventIdentity;
use crate::state::PriorState;

/// One reconciliation operation for the remote event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SyncOperation {
    Create {
        identity: EventIdentity,
        event: CanonicalEvent,
    },
    Update {
        identity: EventIdentity,
        event: CanonicalEvent,
    },
    Delete {
        identity: EventIdentity,
    },
}

impl SyncOperation {
    pub fn identity(&self) -> &EventIdentity {
        match self {
            SyncOperation::Create { identity, .. }
            | SyncOperation::Update { identity, .. }
            | SyncOperation::Delete { identity } => identity,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncOperation::Create { .. } => "create",
            SyncOperation::Update { .. } => "update",
            SyncOperation::Delete { .. } => "delete",
        }
    }
}

/// Index a run's events by identity.
///
/// Identity excludes room and parity, so two events the normalizer kept
/// distinct (say odd weeks in 301 and even weeks in 305, same title) can
/// collide on one key. Colliders get a deterministic ordinal suffix in the
/// normalizer's stable event order and are reported; no event is dropped.
pub fn index_by_identity(
    events: Vec<CanonicalEvent>,
) -> (BTreeMap<EventIdentity, CanonicalEvent>, Vec<Diagnostic>) {
    let mut indexed: BTreeMap<EventIdentity, CanonicalEvent> = BTreeMap::new();
    let mut diagnostics = Vec::new();

    for event in events {
        let base = EventIdentity::of(&event);
        let mut identity = base.clone();
        let mut ordinal = 2;
        while indexed.contains_key(&identity) {
            identity = base.with_ordinal(ordinal);
            ordinal += 1;
        }
        if identity != base {
            diagnostics.push(Diagnostic::warning(
                event.source_cell(),
                format!(
                    "'{}' for group {} shares identity {} with another event; indexed as {}",
                    event.title, event.group, base, identity
                ),
            ));
        }
        indexed.insert(identity, event);
    }

    (indexed, diagnostics)
}

/// Compute the minimal operation set turning `prior` into `current`.
///
/// - present now, absent before  -> Create
/// - present in both, unequal    -> exactly one Update (never delete+create)
/// - absent now, present before  -> Delete
/// - present in both, equal      -> nothing
///
/// Output is ordered by identity, deletes last; operations for distinct
/// identities carry no ordering dependency.
pub fn compute(
    current: &BTreeMap<EventIdentity, CanonicalEvent>,
    prior: &PriorState,
) -> Vec<SyncOperation> {
    let mut operations = Vec::new();

    for (identity, event) in current {
        match prior.get(identity) {
            None => operations.push(SyncOperation::Create {
                identity: identity.clone(),
                event: event.clone(),
            }),
            Some(snapshot) if snapshot != event => operations.push(SyncOperation::Update {
                identity: identity.clone(),
                event: event.clone(),
            }),
            Some(_) => {}
        }
    }

    for identity in prior.identities() {
        if !current.contains_key(identity) {
            operations.push(SyncOperation::Delete {
                identity: identity.clone(),
            });
        }
    }

    operations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DateWindow, Provenance, Recurrence};
    use crate::fragment::{ClassKind, TimeRange, WeekParity};
    use chrono::{NaiveDate, NaiveTime, Weekday};

    fn event(title: &str, room: &str) -> CanonicalEvent {
        CanonicalEvent {
            title: title.to_string(),
            category: Some(ClassKind::Lecture),
            recurrence: Recurrence {
                weekday: Weekday::Mon,
                time: TimeRange::new(
                    NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                    NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
                ),
                parity: WeekParity::Every,
                window: DateWindow {
                    start: NaiveDate::from_ymd_opt(2026, 8, 31).unwrap(),
                    end: NaiveDate::from_ymd_opt(2026, 12, 20).unwrap(),
                },
            },
            location: Some(room.to_string()),
            instructor: None,
            group: "B23-AI-01".to_string(),
            exceptions: Vec::new(),
            co_located: false,
            provenance: Provenance::default(),
        }
    }

    fn state_of(events: Vec<CanonicalEvent>) -> PriorState {
        let mut state = PriorState::default();
        for (identity, event) in index_by_identity(events).0 {
            state.insert(identity, event);
        }
        state
    }

    #[test]
    fn test_colliding_identities_keep_both_events() {
        // Same group/weekday/time/title, but odd weeks in 301 and even weeks
        // in 305: distinct events sharing one base identity.
        let mut odd = event("Algorithms", "301");
        odd.recurrence.parity = WeekParity::Odd;
        let mut even = event("Algorithms", "305");
        even.recurrence.parity = WeekParity::Even;

        let (indexed, diagnostics) = index_by_identity(vec![odd, even]);

        assert_eq!(indexed.len(), 2);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("shares identity"));

        let rooms: Vec<_> = indexed.values().filter_map(|e| e.location.clone()).collect();
        assert!(rooms.contains(&"301".to_string()));
        assert!(rooms.contains(&"305".to_string()));
    }

    #[test]
    fn test_colliding_identities_are_stable_across_runs() {
        let mut odd = event("Algorithms", "301");
        odd.recurrence.parity = WeekParity::Odd;
        let mut even = event("Algorithms", "305");
        even.recurrence.parity = WeekParity::Even;

        let (first, _) = index_by_identity(vec![odd.clone(), even.clone()]);
        let (second, _) = index_by_identity(vec![odd, even]);

        // Same input, same keys: the re-run diffs to nothing.
        let mut prior = PriorState::default();
        for (identity, event) in first {
            prior.insert(identity, event);
        }
        assert!(compute(&second, &prior).is_empty());
    }

    #[test]
    fn test_new_identity_yields_create() {
        let current = index_by_identity(vec![event("Algorithms", "301")]).0;
        let operations = compute(&current, &PriorState::default());

        assert_eq!(operations.len(), 1);
        assert!(matches!(operations[0], SyncOperation::Create { .. }));
    }

    #[test]
    fn test_unchanged_snapshot_yields_nothing() {
        let current = index_by_identity(vec![event("Algorithms", "301")]).0;
        let prior = state_of(vec![event("Algorithms", "301")]);

        assert!(compute(&current, &prior).is_empty());
    }

    #[test]
    fn test_room_change_yields_exactly_one_update() {
        let current = index_by_identity(vec![event("Algorithms", "312")]).0;
        let prior = state_of(vec![event("Algorithms", "301")]);

        let operations = compute(&current, &prior);
        assert_eq!(operations.len(), 1);
        match &operations[0] {
            SyncOperation::Update { event, .. } => {
                assert_eq!(event.location.as_deref(), Some("312"));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_removed_identity_yields_delete() {
        let current = index_by_identity(vec![]).0;
        let prior = state_of(vec![event("Algorithms", "301")]);

        let operations = compute(&current, &prior);
        assert_eq!(operations.len(), 1);
        assert!(matches!(operations[0], SyncOperation::Delete { .. }));
    }

    #[test]
    fn test_mixed_diff_is_minimal() {
        let current = index_by_identity(vec![
            event("Algorithms", "312"), // changed room -> update
            event("Databases", "105"),  // unchanged -> nothing
            event("Compilers", "204"),  // new -> create
        ]).0;
        let prior = state_of(vec![
            event("Algorithms", "301"),
            event("Databases", "105"),
            event("Philosophy", "401"), // gone -> delete
        ]);

        let operations = compute(&current, &prior);
        assert_eq!(operations.len(), 3);
        let kinds: Vec<&str> = operations.iter().map(SyncOperation::kind).collect();
        assert_eq!(kinds.iter().filter(|k| **k == "create").count(), 1);
        assert_eq!(kinds.iter().filter(|k| **k == "update").count(), 1);
        assert_eq!(kinds.iter().filter(|k| **k == "delete").count(), 1);
    }
}
