//! Canonical recurring-event records.
//!
//! A `CanonicalEvent` is the durable unit of the engine: the fully merged,
//! deduplicated representation of one recurring class meeting. It is
//! recomputed on every run and compared against the prior snapshot by the
//! diff engine, so equality here is field-for-field.

use std::fmt;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostic;
use crate::fragment::{ClassKind, ExceptionKind, TimeRange, WeekParity};
use crate::grid::CellRef;

/// The validity window of a schedule, normally one academic term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// 1-based week number of `date`, counted from the week containing the
    /// window start. Week 1 is the odd week.
    pub fn week_number(&self, date: NaiveDate) -> u32 {
        let first_monday = self.start - Days::new(self.start.weekday().num_days_from_monday() as u64);
        let days = (date - first_monday).num_days();
        (days / 7) as u32 + 1
    }
}

/// Weekday + time range + parity + validity window: when the event occurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub weekday: Weekday,
    pub time: TimeRange,
    pub parity: WeekParity,
    pub window: DateWindow,
}

impl Recurrence {
    /// All in-window dates matching the weekday and parity, in order.
    /// Exceptions are not applied here; see [`CanonicalEvent::occurrences`].
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut date = self.window.start;
        // Advance to the first matching weekday
        while date.weekday() != self.weekday {
            date = date + Days::new(1);
            if date > self.window.end {
                return dates;
            }
        }
        while date <= self.window.end {
            if self.parity.matches_week(self.window.week_number(date)) {
                dates.push(date);
            }
            date = date + Days::new(7);
        }
        dates
    }

    /// Whether the event has an occurrence on the given date.
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        self.window.contains(date)
            && date.weekday() == self.weekday
            && self.parity.matches_week(self.window.week_number(date))
    }
}

/// One dated deviation from the recurrence: a cancelled or relocated
/// occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionDate {
    pub date: NaiveDate,
    pub kind: ExceptionKind,
}

/// Where an event came from: sheet plus the cells that contributed to it.
/// Diagnostics only; provenance never participates in identity or diffing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub sheet: String,
    pub cells: Vec<CellRef>,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let refs: Vec<String> = self.cells.iter().map(|c| c.a1()).collect();
        write!(f, "{}!{}", self.sheet, refs.join(","))
    }
}

/// The fully merged representation of one recurring class meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub title: String,
    pub category: Option<ClassKind>,
    pub recurrence: Recurrence,
    pub location: Option<String>,
    pub instructor: Option<String>,
    pub group: String,
    pub exceptions: Vec<ExceptionDate>,
    /// Set when the source explicitly marks the room as shared; suppresses
    /// the room-overlap invariant.
    #[serde(default)]
    pub co_located: bool,
    pub provenance: Provenance,
}

impl CanonicalEvent {
    /// Expanded occurrence dates: the recurrence minus cancelled exceptions.
    /// Moved occurrences still take place, so they stay in the set.
    pub fn occurrences(&self) -> Vec<NaiveDate> {
        self.recurrence
            .dates()
            .into_iter()
            .filter(|date| {
                !self.exceptions.iter().any(|ex| {
                    ex.date == *date && ex.kind == ExceptionKind::Cancelled
                })
            })
            .collect()
    }

    /// First contributing cell, for diagnostics.
    pub fn source_cell(&self) -> CellRef {
        self.provenance.cells.first().cloned().unwrap_or(CellRef {
            sheet: self.provenance.sheet.clone(),
            row: 0,
            col: 0,
        })
    }

    /// Room in effect on a given occurrence date, honoring relocations.
    pub fn room_on(&self, date: NaiveDate) -> Option<&str> {
        for ex in &self.exceptions {
            if ex.date == date {
                if let ExceptionKind::Moved { room } = &ex.kind {
                    return Some(room);
                }
            }
        }
        self.location.as_deref()
    }
}

impl fmt::Display for CanonicalEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} | {}", self.group, self.title)?;
        if let Some(kind) = self.category {
            write!(f, " ({kind})")?;
        }
        write!(
            f,
            " @ {:?} {} {}",
            self.recurrence.weekday, self.recurrence.time, self.recurrence.parity
        )
    }
}

/// Check the CanonicalEvent invariants over a whole event set.
///
/// Returns the indices of events violating an invariant, together with the
/// diagnostics explaining them. Offenders are reported, never fixed.
pub fn validate(events: &[CanonicalEvent]) -> (Vec<usize>, Vec<Diagnostic>) {
    let mut invalid = Vec::new();
    let mut diagnostics = Vec::new();

    for (i, event) in events.iter().enumerate() {
        if event.occurrences().is_empty() {
            invalid.push(i);
            diagnostics.push(Diagnostic::error(
                event.source_cell(),
                format!("event '{}' has an empty occurrence set", event.title),
            ));
        }
    }

    // Room conflicts: same group, same room, overlapping time on a shared
    // occurrence date, and neither side flagged co-located.
    for i in 0..events.len() {
        for j in (i + 1)..events.len() {
            let (a, b) = (&events[i], &events[j]);
            if a.group != b.group
                || a.co_located
                || b.co_located
                || a.recurrence.weekday != b.recurrence.weekday
                || !a.recurrence.time.overlaps(&b.recurrence.time)
            {
                continue;
            }
            let b_dates = b.occurrences();
            let clash = a.occurrences().into_iter().find(|date| {
                b_dates.contains(date)
                    && a.room_on(*date).is_some()
                    && a.room_on(*date) == b.room_on(*date)
            });
            if let Some(date) = clash {
                if !invalid.contains(&i) {
                    invalid.push(i);
                }
                if !invalid.contains(&j) {
                    invalid.push(j);
                }
                diagnostics.push(Diagnostic::error(
                    a.source_cell(),
                    format!(
                        "'{}' and '{}' overlap in room {} for group {} on {}",
                        a.title,
                        b.title,
                        a.room_on(date).unwrap_or("?"),
                        a.group,
                        date
                    ),
                ));
            }
        }
    }

    (invalid, diagnostics)
}
