//! Recurrence normalizer: fragments -> canonical events.
//!
//! Groups fragments describing the same logical class meeting into one
//! `CanonicalEvent`, combining week parities (odd + even = every week),
//! attaching dated exception notes, and enforcing the event invariants.
//! Pure and synchronous; all inputs are values, all failures are diagnostics.

use std::collections::BTreeMap;

use chrono::Weekday;

use crate::diagnostics::Diagnostic;
use crate::event::{CanonicalEvent, DateWindow, ExceptionDate, Provenance, Recurrence, validate};
use crate::fragment::{ClassKind, ExceptionFragment, Fragment, MeetingFragment, TimeRange};
use crate::identity::normalize_title;

/// Result of normalizing one source's fragments.
#[derive(Debug, Default)]
pub struct Normalized {
    pub events: Vec<CanonicalEvent>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Merge key: every non-parity attribute, compared exactly. Two fragments
/// colliding on weekday/time/group but differing in title, room, instructor
/// or kind stay distinct events; parity is the only thing merging combines.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct MergeKey {
    group: String,
    weekday_num: u8,
    time: TimeRange,
    title: String,
    room: Option<String>,
    instructor: Option<String>,
    kind: Option<ClassKind>,
}

impl MergeKey {
    fn of(fragment: &MeetingFragment) -> Self {
        MergeKey {
            group: fragment.group.clone(),
            weekday_num: fragment.weekday.num_days_from_monday() as u8,
            time: fragment.time,
            title: normalize_title(&fragment.title),
            room: fragment.room.clone(),
            instructor: fragment.instructor.clone(),
            kind: fragment.kind,
        }
    }
}

/// Normalize a parse pass worth of fragments into canonical events.
pub fn normalize(fragments: Vec<Fragment>, window: DateWindow) -> Normalized {
    let mut diagnostics = Vec::new();
    let mut meetings: Vec<MeetingFragment> = Vec::new();
    let mut exceptions: Vec<ExceptionFragment> = Vec::new();

    for fragment in fragments {
        match fragment {
            Fragment::Meeting(m) => meetings.push(m),
            Fragment::Exception(e) => exceptions.push(e),
            // Already diagnosed by the interpreter; nothing to normalize.
            Fragment::Unparsed(_) => {}
        }
    }

    let mut events = merge_meetings(meetings, window);
    attach_exceptions(&mut events, exceptions, window, &mut diagnostics);

    // Enforce invariants: offenders are excluded and reported, never fixed.
    let (invalid, mut validation_diagnostics) = validate(&events);
    diagnostics.append(&mut validation_diagnostics);
    let mut index = 0;
    events.retain(|_| {
        let keep = !invalid.contains(&index);
        index += 1;
        keep
    });

    Normalized {
        events,
        diagnostics,
    }
}

/// Group meeting fragments by merge key and combine their parities.
fn merge_meetings(meetings: Vec<MeetingFragment>, window: DateWindow) -> Vec<CanonicalEvent> {
    let mut merged: BTreeMap<MergeKey, CanonicalEvent> = BTreeMap::new();

    for fragment in meetings {
        let key = MergeKey::of(&fragment);
        match merged.get_mut(&key) {
            Some(event) => {
                event.recurrence.parity = event.recurrence.parity.combine(fragment.parity);
                event.co_located |= fragment.co_located;
                if !event.provenance.cells.contains(&fragment.source) {
                    event.provenance.cells.push(fragment.source);
                }
            }
            None => {
                let event = CanonicalEvent {
                    title: fragment.title,
                    category: fragment.kind,
                    recurrence: Recurrence {
                        weekday: fragment.weekday,
                        time: fragment.time,
                        parity: fragment.parity,
                        window,
                    },
                    location: fragment.room,
                    instructor: fragment.instructor,
                    group: fragment.group,
                    exceptions: Vec::new(),
                    co_located: fragment.co_located,
                    provenance: Provenance {
                        sheet: fragment.source.sheet.clone(),
                        cells: vec![fragment.source],
                    },
                };
                merged.insert(key, event);
            }
        }
    }

    let mut events: Vec<CanonicalEvent> = merged.into_values().collect();
    for event in &mut events {
        event.provenance.cells.sort();
    }
    events.sort_by(|a, b| {
        sort_key(a).cmp(&sort_key(b))
    });
    events
}

fn sort_key(event: &CanonicalEvent) -> (String, u32, TimeRange, String) {
    (
        event.group.clone(),
        weekday_num(event.recurrence.weekday),
        event.recurrence.time,
        event.title.clone(),
    )
}

fn weekday_num(weekday: Weekday) -> u32 {
    weekday.num_days_from_monday()
}

/// Attach each exception note to the nearest matching event.
///
/// A match must actually occur on the exception date (weekday, parity and
/// window all agree) and satisfy the note's optional time and title filters.
/// Unmatched or out-of-window notes are rejected with a diagnostic; a note
/// never spawns an event of its own.
fn attach_exceptions(
    events: &mut [CanonicalEvent],
    exceptions: Vec<ExceptionFragment>,
    window: DateWindow,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for exception in exceptions {
        if !window.contains(exception.date) {
            diagnostics.push(Diagnostic::warning(
                exception.source,
                format!(
                    "exception date {} is outside the validity window {}..{}",
                    exception.date, window.start, window.end
                ),
            ));
            continue;
        }

        let target = events.iter_mut().find(|event| {
            event.group == exception.group
                && event.recurrence.occurs_on(exception.date)
                && exception
                    .time
                    .is_none_or(|time| time == event.recurrence.time)
                && exception
                    .title
                    .as_ref()
                    .is_none_or(|title| normalize_title(title) == normalize_title(&event.title))
        });

        match target {
            Some(event) => {
                let dated = ExceptionDate {
                    date: exception.date,
                    kind: exception.kind,
                };
                if !event.exceptions.contains(&dated) {
                    event.exceptions.push(dated);
                    event.exceptions.sort_by_key(|ex| ex.date);
                }
            }
            None => diagnostics.push(Diagnostic::warning(
                exception.source,
                format!(
                    "no event of group {} occurs on {}; exception note not attached",
                    exception.group, exception.date
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{ExceptionKind, WeekParity};
    use crate::grid::CellRef;
    use chrono::{NaiveDate, NaiveTime};

    fn window() -> DateWindow {
        DateWindow {
            start: NaiveDate::from_ymd_opt(2026, 8, 31).unwrap(),
            end: NaiveDate::from_ymd_opt(2026, 12, 20).unwrap(),
        }
    }

    fn cell(row: usize, col: usize) -> CellRef {
        CellRef {
            sheet: "core".to_string(),
            row,
            col,
        }
    }

    fn time_range() -> TimeRange {
        TimeRange::new(
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
        )
    }

    fn meeting(title: &str, parity: WeekParity, room: &str, row: usize) -> MeetingFragment {
        MeetingFragment {
            kind: Some(ClassKind::Lecture),
            weekday: Weekday::Mon,
            time: time_range(),
            parity,
            title: title.to_string(),
            room: Some(room.to_string()),
            instructor: None,
            group: "B23-AI-01".to_string(),
            note: None,
            co_located: false,
            source: cell(row, 2),
        }
    }

    #[test]
    fn test_odd_and_even_fragments_merge_to_every_week() {
        let fragments = vec![
            Fragment::Meeting(meeting("Algorithms", WeekParity::Odd, "301", 1)),
            Fragment::Meeting(meeting("Algorithms", WeekParity::Even, "301", 2)),
        ];

        let result = normalize(fragments, window());
        assert_eq!(result.events.len(), 1);
        let event = &result.events[0];
        assert_eq!(event.recurrence.parity, WeekParity::Every);
        assert_eq!(event.provenance.cells.len(), 2);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_differing_room_prevents_merge() {
        let fragments = vec![
            Fragment::Meeting(meeting("Algorithms", WeekParity::Odd, "301", 1)),
            Fragment::Meeting(meeting("Algorithms", WeekParity::Even, "305", 2)),
        ];

        let result = normalize(fragments, window());
        assert_eq!(result.events.len(), 2);
        assert_eq!(result.events[0].recurrence.parity, WeekParity::Odd);
        assert_eq!(result.events[1].recurrence.parity, WeekParity::Even);
    }

    #[test]
    fn test_identical_fragments_deduplicate() {
        // A slot cell merged over two rows duplicates the value verbatim.
        let fragments = vec![
            Fragment::Meeting(meeting("Algorithms", WeekParity::Every, "301", 1)),
            Fragment::Meeting(meeting("Algorithms", WeekParity::Every, "301", 2)),
        ];

        let result = normalize(fragments, window());
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].recurrence.parity, WeekParity::Every);
    }

    #[test]
    fn test_exception_attaches_to_matching_event() {
        let date = NaiveDate::from_ymd_opt(2026, 9, 14).unwrap();
        let fragments = vec![
            Fragment::Meeting(meeting("Algorithms", WeekParity::Every, "301", 1)),
            Fragment::Exception(ExceptionFragment {
                date,
                kind: ExceptionKind::Cancelled,
                time: None,
                title: Some("algorithms".to_string()),
                group: "B23-AI-01".to_string(),
                source: cell(5, 2),
            }),
        ];

        let result = normalize(fragments, window());
        assert_eq!(result.events.len(), 1);
        assert_eq!(
            result.events[0].exceptions,
            vec![ExceptionDate {
                date,
                kind: ExceptionKind::Cancelled
            }]
        );
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_exception_never_spawns_an_event() {
        let fragments = vec![Fragment::Exception(ExceptionFragment {
            date: NaiveDate::from_ymd_opt(2026, 9, 14).unwrap(),
            kind: ExceptionKind::Cancelled,
            time: None,
            title: None,
            group: "B23-AI-01".to_string(),
            source: cell(5, 2),
        })];

        let result = normalize(fragments, window());
        assert!(result.events.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn test_exception_on_wrong_parity_week_is_rejected() {
        // Odd-week event; Sep 7 falls in week 2.
        let fragments = vec![
            Fragment::Meeting(meeting("Algorithms", WeekParity::Odd, "301", 1)),
            Fragment::Exception(ExceptionFragment {
                date: NaiveDate::from_ymd_opt(2026, 9, 7).unwrap(),
                kind: ExceptionKind::Cancelled,
                time: None,
                title: None,
                group: "B23-AI-01".to_string(),
                source: cell(5, 2),
            }),
        ];

        let result = normalize(fragments, window());
        assert!(result.events[0].exceptions.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn test_out_of_window_exception_is_rejected() {
        let fragments = vec![
            Fragment::Meeting(meeting("Algorithms", WeekParity::Every, "301", 1)),
            Fragment::Exception(ExceptionFragment {
                date: NaiveDate::from_ymd_opt(2027, 3, 1).unwrap(),
                kind: ExceptionKind::Cancelled,
                time: None,
                title: None,
                group: "B23-AI-01".to_string(),
                source: cell(5, 2),
            }),
        ];

        let result = normalize(fragments, window());
        assert!(result.events[0].exceptions.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].message.contains("validity window"));
    }

    #[test]
    fn test_invalid_events_are_excluded_and_reported() {
        // Two different titles in the same room and slot: overlap invariant.
        let fragments = vec![
            Fragment::Meeting(meeting("Algorithms", WeekParity::Every, "301", 1)),
            Fragment::Meeting(meeting("Databases", WeekParity::Every, "301", 2)),
        ];

        let result = normalize(fragments, window());
        assert!(result.events.is_empty());
        assert!(!result.diagnostics.is_empty());
    }
}
