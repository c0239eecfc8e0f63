//! Decoded schedule fragments.
//!
//! A fragment is the unit the cell interpreter hands to the normalizer: one
//! decodable piece of schedule information from one (expanded) cell. Fragments
//! are ephemeral, scoped to a single parse pass.

use std::fmt;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::grid::CellRef;

/// A start/end pair within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        TimeRange { start, end }
    }

    /// Whether two ranges share any time of day.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// Which weeks of the term an occurrence falls on.
///
/// Week numbering starts at the week containing the term start date;
/// week 1 is odd.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekParity {
    #[default]
    Every,
    Odd,
    Even,
}

impl WeekParity {
    /// Combine two parity rules describing the same meeting.
    ///
    /// Odd + even covers the whole term, and anything combined with `Every`
    /// stays `Every`. Combining a parity with itself is the identity.
    pub fn combine(self, other: WeekParity) -> WeekParity {
        match (self, other) {
            (WeekParity::Odd, WeekParity::Even) | (WeekParity::Even, WeekParity::Odd) => {
                WeekParity::Every
            }
            (WeekParity::Every, _) | (_, WeekParity::Every) => WeekParity::Every,
            (same, _) => same,
        }
    }

    /// Whether a 1-based term week number matches this parity.
    pub fn matches_week(&self, week: u32) -> bool {
        match self {
            WeekParity::Every => true,
            WeekParity::Odd => week % 2 == 1,
            WeekParity::Even => week % 2 == 0,
        }
    }
}

impl fmt::Display for WeekParity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WeekParity::Every => write!(f, "every week"),
            WeekParity::Odd => write!(f, "odd weeks"),
            WeekParity::Even => write!(f, "even weeks"),
        }
    }
}

/// Class meeting category, decoded from the title suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    Lecture,
    Seminar,
    Lab,
}

impl ClassKind {
    /// Decode a bracketed suffix like "(lec)". `tut` is the legacy spelling
    /// still used on some sheets for seminars.
    pub fn from_marker(marker: &str) -> Option<ClassKind> {
        match marker.to_ascii_lowercase().as_str() {
            "lec" | "lecture" => Some(ClassKind::Lecture),
            "sem" | "seminar" | "tut" => Some(ClassKind::Seminar),
            "lab" => Some(ClassKind::Lab),
            _ => None,
        }
    }
}

impl fmt::Display for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClassKind::Lecture => write!(f, "lec"),
            ClassKind::Seminar => write!(f, "sem"),
            ClassKind::Lab => write!(f, "lab"),
        }
    }
}

/// One regular class meeting decoded from a body cell.
#[derive(Debug, Clone, PartialEq)]
pub struct MeetingFragment {
    pub kind: Option<ClassKind>,
    pub weekday: Weekday,
    pub time: TimeRange,
    pub parity: WeekParity,
    pub title: String,
    pub room: Option<String>,
    pub instructor: Option<String>,
    pub group: String,
    pub note: Option<String>,
    pub co_located: bool,
    pub source: CellRef,
}

/// What an exception note does to the occurrence it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    Cancelled,
    Moved { room: String },
}

/// A dated cancellation/relocation note decoded from a body cell.
///
/// The optional time and title act as filters when the note is attached to a
/// canonical event; the group always comes from the note's column.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionFragment {
    pub date: chrono::NaiveDate,
    pub kind: ExceptionKind,
    pub time: Option<TimeRange>,
    pub title: Option<String>,
    pub group: String,
    pub source: CellRef,
}

/// A cell that matched no recognized convention. Carried through so nothing
/// is silently dropped; the interpreter also records a diagnostic for it.
#[derive(Debug, Clone, PartialEq)]
pub struct UnparsedFragment {
    pub text: String,
    pub source: CellRef,
}

/// The closed set of things a body cell can decode to.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Meeting(MeetingFragment),
    Exception(ExceptionFragment),
    Unparsed(UnparsedFragment),
}

impl Fragment {
    pub fn source(&self) -> &CellRef {
        match self {
            Fragment::Meeting(m) => &m.source,
            Fragment::Exception(e) => &e.source,
            Fragment::Unparsed(u) => &u.source,
        }
    }
}
