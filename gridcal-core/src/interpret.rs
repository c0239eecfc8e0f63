//! Cell interpreter: raw grid -> typed schedule fragments.
//!
//! Decoding is convention-driven. The grid layout is the one university staff
//! actually maintain: group labels across the header row, weekday labels down
//! the first column, time slots (optionally parity-marked) in the second, and
//! meeting or exception text in the body. Everything the interpreter does not
//! recognize becomes an `Unparsed` fragment plus a diagnostic; no cell is
//! dropped silently, and no malformed cell aborts the rest of the sheet.

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostic;
use crate::event::DateWindow;
use crate::fragment::{
    ClassKind, ExceptionFragment, ExceptionKind, Fragment, MeetingFragment, TimeRange,
    UnparsedFragment, WeekParity,
};
use crate::grid::{CellRef, SheetGrid};

/// Recognized body-cell conventions, tried in configured order.
///
/// A cell can match more than one convention ("10:00-11:30 cancelled on
/// 14/09" has a time range in it); the precedence list decides which reading
/// wins instead of hard-coding a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Convention {
    Exception,
    Meeting,
}

/// Default precedence: exception notes are more specific, try them first.
pub fn default_precedence() -> Vec<Convention> {
    vec![Convention::Exception, Convention::Meeting]
}

/// Result of interpreting one sheet.
#[derive(Debug, Default)]
pub struct Interpretation {
    pub fragments: Vec<Fragment>,
    pub diagnostics: Vec<Diagnostic>,
}

static TIME_SLOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d{1,2})[:.](\d{2})\s*-\s*(\d{1,2})[:.](\d{2})(?:\s*\((odd|even)\))?$")
        .unwrap()
});

static TIME_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[:.](\d{2})\s*-\s*(\d{1,2})[:.](\d{2})$").unwrap());

static EXCEPTION_NOTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(?P<time>\d{1,2}[:.]\d{2}\s*-\s*\d{1,2}[:.]\d{2})\s+)?(?:(?P<title>.+?)\s+)?(?:(?P<cancel>cancelled|no class)|moved\s+to\s+(?P<room>.+?))\s+on\s+(?P<day>\d{1,2})[/.](?P<month>\d{1,2})$",
    )
    .unwrap()
});

static GROUP_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(\s*G?\d+\s*\)\s*$").unwrap());

static KIND_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((.+?)\)").unwrap());

static CO_LOCATED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*\(co-located\)\s*").unwrap());

static ROOM_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^ROOM\s*#?\s*").unwrap());

/// Interpret one sheet into fragments plus diagnostics.
///
/// The grid is expanded first, so a merged cell contributes one fragment per
/// spanned row and column.
pub fn interpret(grid: &SheetGrid, window: DateWindow, precedence: &[Convention]) -> Interpretation {
    let mut grid = grid.clone();
    grid.expand_merged();

    let mut out = Interpretation::default();

    // Header row: group label per body column, student-count suffix stripped.
    let mut groups: Vec<Option<String>> = Vec::new();
    for col in 2..grid.cols() {
        groups.push(grid.cell(0, col).as_text().map(|s| clean_group(&s)));
    }

    let mut weekday: Option<Weekday> = None;

    for row in 1..grid.rows() {
        // Weekday label fills downward across its block.
        if let Some(label) = grid.cell(row, 0).as_text() {
            match parse_weekday(&label) {
                Some(day) => weekday = Some(day),
                None => out.diagnostics.push(Diagnostic::warning(
                    grid.cell_ref(row, 0),
                    format!("unrecognized weekday label '{label}'"),
                )),
            }
        }

        let slot = match grid.cell(row, 1).as_text() {
            Some(label) => match parse_time_slot(&label) {
                Some(slot) => Some(slot),
                None => {
                    out.diagnostics.push(Diagnostic::warning(
                        grid.cell_ref(row, 1),
                        format!("unrecognized time slot '{label}'"),
                    ));
                    None
                }
            },
            None => None,
        };

        for col in 2..grid.cols() {
            let Some(text) = grid.cell(row, col).as_text() else {
                continue;
            };
            let source = grid.cell_ref(row, col);

            let Some(group) = groups.get(col - 2).cloned().flatten() else {
                out.diagnostics.push(Diagnostic::warning(
                    source,
                    format!("cell '{text}' has no group header"),
                ));
                continue;
            };

            match interpret_cell(&text, weekday, slot, &group, &source, window, precedence) {
                Ok((fragment, warning)) => {
                    if let Some(message) = warning {
                        out.diagnostics
                            .push(Diagnostic::warning(source.clone(), message));
                    }
                    out.fragments.push(fragment);
                }
                Err(message) => {
                    out.diagnostics
                        .push(Diagnostic::warning(source.clone(), message.clone()));
                    out.fragments.push(Fragment::Unparsed(UnparsedFragment {
                        text,
                        source,
                    }));
                }
            }
        }
    }

    out
}

/// Decode a single body cell, trying each convention in precedence order.
/// A successful decode may still carry a warning about partially used input.
fn interpret_cell(
    text: &str,
    weekday: Option<Weekday>,
    slot: Option<(TimeRange, WeekParity)>,
    group: &str,
    source: &CellRef,
    window: DateWindow,
    precedence: &[Convention],
) -> Result<(Fragment, Option<String>), String> {
    for convention in precedence {
        match convention {
            Convention::Exception => {
                if let Some((fragment, warning)) =
                    decode_exception(text, group, source, window)
                {
                    return Ok((Fragment::Exception(fragment), warning));
                }
            }
            Convention::Meeting => {
                let (Some(weekday), Some((time, parity))) = (weekday, slot) else {
                    continue;
                };
                if let Some(fragment) =
                    decode_meeting(text, weekday, time, parity, group, source)
                {
                    return Ok((Fragment::Meeting(fragment), None));
                }
            }
        }
    }

    if weekday.is_none() || slot.is_none() {
        Err("cell outside any weekday/time-slot context".to_string())
    } else {
        Err(format!("cell '{text}' matches no recognized convention"))
    }
}

/// "cancelled on 14/09", "no class on 14.09", "moved to 305 on 14/09",
/// optionally prefixed with a time-range and/or title filter.
///
/// Only the first line is decoded; extra lines come back as a warning
/// message so nothing in the cell is dropped without a trace.
fn decode_exception(
    text: &str,
    group: &str,
    source: &CellRef,
    window: DateWindow,
) -> Option<(ExceptionFragment, Option<String>)> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let line = lines.next()?;
    let caps = EXCEPTION_NOTE.captures(line)?;

    let day: u32 = caps.name("day")?.as_str().parse().ok()?;
    let month: u32 = caps.name("month")?.as_str().parse().ok()?;
    let date = resolve_year(day, month, window)?;

    let kind = match caps.name("room") {
        Some(room) => ExceptionKind::Moved {
            room: ROOM_PREFIX.replace(room.as_str(), "").to_uppercase(),
        },
        None => ExceptionKind::Cancelled,
    };

    let time = caps
        .name("time")
        .and_then(|m| parse_time_range(m.as_str()));
    let title = caps.name("title").map(|m| m.as_str().trim().to_string());

    let ignored = lines.count();
    let warning = (ignored > 0).then(|| {
        format!("{ignored} line(s) after the exception note '{line}' were ignored")
    });

    Some((
        ExceptionFragment {
            date,
            kind,
            time,
            title: title.filter(|t| !t.is_empty()),
            group: group.to_string(),
            source: source.clone(),
        },
        warning,
    ))
}

/// Up to three lines: title (with optional kind/bracket content), instructor,
/// room. The original staff convention for core-course cells.
fn decode_meeting(
    text: &str,
    weekday: Weekday,
    time: TimeRange,
    parity: WeekParity,
    group: &str,
    source: &CellRef,
) -> Option<MeetingFragment> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let raw_title = lines.next()?;
    let instructor = lines.next().map(clean_instructor);
    let raw_room = lines.next();
    if lines.next().is_some() {
        return None; // more lines than the convention allows
    }

    let (title, kind) = clean_title(raw_title);
    if title.is_empty() {
        return None;
    }

    let mut co_located = false;
    let room = raw_room.map(|r| {
        let mut room = r.to_string();
        if CO_LOCATED.is_match(&room) {
            co_located = true;
            room = CO_LOCATED.replace(&room, " ").trim().to_string();
        }
        ROOM_PREFIX.replace(room.trim(), "").to_uppercase()
    });

    Some(MeetingFragment {
        kind,
        weekday,
        time,
        parity,
        title,
        room: room.filter(|r| !r.is_empty()),
        instructor,
        group: group.to_string(),
        note: None,
        co_located,
        source: source.clone(),
    })
}

/// Strip a class-kind marker and fold other bracketed text into the title.
///
/// - "Mathematical Analysis I (lec)" -> ("Mathematical Analysis I", Lecture)
/// - "Philosophy II (Intro to AI) (lec)" -> ("Philosophy II: Intro to AI", Lecture)
fn clean_title(raw: &str) -> (String, Option<ClassKind>) {
    let mut kind = None;
    let mut title = raw.to_string();

    for caps in KIND_MARKER.captures_iter(raw) {
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        match ClassKind::from_marker(inner) {
            Some(k) => {
                kind = Some(k);
                title = title.replacen(whole, "", 1);
            }
            None => {
                title = title.replacen(whole, &format!(": {}", inner.trim()), 1);
            }
        }
    }

    let title = title
        .replace(" :", ":")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (title.trim_end_matches(':').trim().to_string(), kind)
}

/// Normalize instructor lists: slashes and loose commas become ", ".
fn clean_instructor(raw: &str) -> String {
    raw.split(['/', ','])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Strip a trailing student-count suffix: "B23-AI-01 (25)" -> "B23-AI-01".
fn clean_group(raw: &str) -> String {
    GROUP_SUFFIX.replace(raw, "").trim().to_string()
}

fn parse_weekday(label: &str) -> Option<Weekday> {
    match label.trim().to_ascii_uppercase().as_str() {
        "MONDAY" => Some(Weekday::Mon),
        "TUESDAY" => Some(Weekday::Tue),
        "WEDNESDAY" => Some(Weekday::Wed),
        "THURSDAY" => Some(Weekday::Thu),
        "FRIDAY" => Some(Weekday::Fri),
        "SATURDAY" => Some(Weekday::Sat),
        "SUNDAY" => Some(Weekday::Sun),
        _ => None,
    }
}

/// "10:00-11:30", optionally "10:00-11:30 (odd)" / "(even)".
fn parse_time_slot(label: &str) -> Option<(TimeRange, WeekParity)> {
    let caps = TIME_SLOT.captures(label.trim())?;
    let time = build_range(&caps)?;
    let parity = match caps.get(5).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(p) if p == "odd" => WeekParity::Odd,
        Some(p) if p == "even" => WeekParity::Even,
        _ => WeekParity::Every,
    };
    Some((time, parity))
}

fn parse_time_range(label: &str) -> Option<TimeRange> {
    let caps = TIME_RANGE.captures(label.trim())?;
    build_range(&caps)
}

fn build_range(caps: &regex::Captures) -> Option<TimeRange> {
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let start = NaiveTime::from_hms_opt(part(1)?, part(2)?, 0)?;
    let end = NaiveTime::from_hms_opt(part(3)?, part(4)?, 0)?;
    if end <= start {
        return None;
    }
    Some(TimeRange::new(start, end))
}

/// Pick the year that puts a day/month inside the validity window; schedules
/// never span more than two calendar years. Falls back to the window's start
/// year so out-of-window dates still carry a concrete date for diagnostics.
fn resolve_year(day: u32, month: u32, window: DateWindow) -> Option<NaiveDate> {
    let mut years = vec![window.start.year()];
    if window.end.year() != window.start.year() {
        years.push(window.end.year());
    }
    let mut first = None;
    for year in years {
        // Feb 29 only exists in one of the candidate years; skip the other.
        let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
            continue;
        };
        if window.contains(date) {
            return Some(date);
        }
        first.get_or_insert(date);
    }
    first
}
