//! Stable event identity.
//!
//! The identity key is what lets the diff engine track an event across parser
//! runs: as long as the group, weekday, time range and title content are
//! unchanged, two parses produce the same key and an attribute change becomes
//! an update-in-place instead of a delete + create.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::CanonicalEvent;

/// Stable key for one canonical event.
///
/// Derived from {group, weekday, time range, normalized title} only. Rooms,
/// instructors, notes and provenance are deliberately excluded so cosmetic
/// edits (and room renumbering) never change identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventIdentity(String);

impl EventIdentity {
    pub fn of(event: &CanonicalEvent) -> Self {
        let r = &event.recurrence;
        EventIdentity(format!(
            "{}:{}:{}:{}",
            slugify(&event.group),
            weekday_tag(r.weekday),
            r.time,
            slugify(&normalize_title(&event.title)),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a distinct key for an event whose base identity is already
    /// taken, e.g. two meetings equal up to room or parity. The ordinal is
    /// assigned in the normalizer's stable event order, so the same input
    /// yields the same keys on every run.
    pub fn with_ordinal(&self, ordinal: u32) -> EventIdentity {
        EventIdentity(format!("{}:{ordinal}", self.0))
    }
}

impl fmt::Display for EventIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn weekday_tag(weekday: chrono::Weekday) -> &'static str {
    match weekday {
        chrono::Weekday::Mon => "mon",
        chrono::Weekday::Tue => "tue",
        chrono::Weekday::Wed => "wed",
        chrono::Weekday::Thu => "thu",
        chrono::Weekday::Fri => "fri",
        chrono::Weekday::Sat => "sat",
        chrono::Weekday::Sun => "sun",
    }
}

/// Lowercase, strip punctuation, collapse whitespace.
///
/// "Mathematical  Analysis, I" and "mathematical analysis I" normalize to the
/// same string, so trivial edits in the source sheet keep the identity.
pub fn normalize_title(title: &str) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase alphanumeric slug with single-dash separators.
fn slugify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
