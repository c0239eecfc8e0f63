//! Persisted prior state.
//!
//! The identity -> snapshot mapping from the last successful dispatch. Read
//! at run start, written only at commit; between those two points it is an
//! immutable input, which keeps the diff engine a pure function of two
//! values. State is partitioned per source: one file per schedule source,
//! nothing shared.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::diff::SyncOperation;
use crate::error::{GridCalError, GridCalResult};
use crate::event::CanonicalEvent;
use crate::identity::EventIdentity;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorState {
    events: BTreeMap<EventIdentity, CanonicalEvent>,
    /// Last-modified token of the source at the last commit, for
    /// change-detection short-circuiting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_token: Option<String>,
}

impl PriorState {
    /// Load the snapshot for one source. A missing file is an empty state,
    /// not an error: the first run of a source starts from nothing.
    pub fn load(path: &Path) -> GridCalResult<Self> {
        if !path.exists() {
            return Ok(PriorState::default());
        }
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| GridCalError::State(format!("corrupt state file {}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> GridCalResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| GridCalError::Serialization(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn get(&self, identity: &EventIdentity) -> Option<&CanonicalEvent> {
        self.events.get(identity)
    }

    pub fn insert(&mut self, identity: EventIdentity, event: CanonicalEvent) {
        self.events.insert(identity, event);
    }

    pub fn identities(&self) -> impl Iterator<Item = &EventIdentity> {
        self.events.keys()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Fold one *confirmed* operation into the snapshot.
    ///
    /// Commit applies only acknowledged operations, so after a partial
    /// dispatch failure the persisted state is exactly old state plus the
    /// applied subset, and the next run recomputes precisely the remainder.
    pub fn apply(&mut self, operation: &SyncOperation) {
        match operation {
            SyncOperation::Create { identity, event }
            | SyncOperation::Update { identity, event } => {
                self.events.insert(identity.clone(), event.clone());
            }
            SyncOperation::Delete { identity } => {
                self.events.remove(identity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{self, index_by_identity};
    use crate::event::{DateWindow, Provenance, Recurrence};
    use crate::fragment::{TimeRange, WeekParity};
    use chrono::{NaiveDate, NaiveTime, Weekday};

    fn event(title: &str, room: &str) -> CanonicalEvent {
        CanonicalEvent {
            title: title.to_string(),
            category: None,
            recurrence: Recurrence {
                weekday: Weekday::Wed,
                time: TimeRange::new(
                    NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
                    NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
                ),
                parity: WeekParity::Every,
                window: DateWindow {
                    start: NaiveDate::from_ymd_opt(2026, 8, 31).unwrap(),
                    end: NaiveDate::from_ymd_opt(2026, 12, 20).unwrap(),
                },
            },
            location: Some(room.to_string()),
            instructor: Some("Ivan Petrov".to_string()),
            group: "B23-SD-02".to_string(),
            exceptions: Vec::new(),
            co_located: false,
            provenance: Provenance {
                sheet: "core".to_string(),
                cells: Vec::new(),
            },
        }
    }

    #[test]
    fn test_missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = PriorState::load(&dir.path().join("none.json")).unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn test_state_roundtrips_losslessly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/core.json");

        let mut state = PriorState::default();
        let e = event("Operating Systems", "312");
        state.insert(EventIdentity::of(&e), e);
        state.source_token = Some("etag-7".to_string());
        state.save(&path).unwrap();

        let loaded = PriorState::load(&path).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_corrupt_file_is_a_state_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            PriorState::load(&path),
            Err(GridCalError::State(_))
        ));
    }

    #[test]
    fn test_applying_full_diff_reaches_current_state() {
        let mut prior = PriorState::default();
        let old = event("Algorithms", "301");
        prior.insert(EventIdentity::of(&old), old);

        let current = index_by_identity(vec![event("Algorithms", "312"), event("Compilers", "204")]).0;
        for operation in diff::compute(&current, &prior) {
            prior.apply(&operation);
        }

        // After a fully acknowledged dispatch, the next diff is empty.
        assert!(diff::compute(&current, &prior).is_empty());
    }
}
