// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Appointment free-text parsing.
//!
//! Turns phrases like "viernes 10:30 am" or "10 de marzo por la tarde"
//! into a date plus optional time for the board's date column. All
//! parsing is relative to a caller-supplied local now, so the dealership
//! timezone is an input rather than ambient state.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use leadflow_core::types::Appointment;
use regex::Regex;

use crate::labels::month_number;

static EXPLICIT_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\s+de\s+(\w+)").expect("valid regex"));
static HALF_PAST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\s*y\s*media").expect("valid regex"));
static CLOCK_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{1,2})\s*:\s*(\d{2})\s*(am|pm)?").expect("valid regex"));
static HOUR_MERIDIEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{1,2})\s*(am|pm)").expect("valid regex"));

const WEEKDAYS: &[(&str, u32)] = &[
    ("lunes", 0),
    ("martes", 1),
    ("miércoles", 2),
    ("miercoles", 2),
    ("jueves", 3),
    ("viernes", 4),
    ("sábado", 5),
    ("sabado", 5),
    ("domingo", 6),
];

/// Parse appointment text relative to `local_now`.
///
/// A mentioned appointment without a recognizable day defaults to today;
/// the time is omitted when nothing in the text pins one down. Empty
/// text parses to `None`.
pub fn parse_appointment(text: &str, local_now: NaiveDateTime) -> Option<Appointment> {
    let text = text.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }

    let date = parse_date(&text, local_now).unwrap_or_else(|| local_now.date());
    let time = parse_time(&text);
    Some(Appointment { date, time })
}

fn parse_date(text: &str, local_now: NaiveDateTime) -> Option<NaiveDate> {
    let today = local_now.date();

    // "pasado mañana" must win over its "mañana" suffix.
    if text.contains("pasado mañana") {
        return Some(today + Duration::days(2));
    }
    if text.contains("mañana") && !text.contains("por la mañana") {
        return Some(today + Duration::days(1));
    }
    if text.contains("próxima semana") || text.contains("proxima semana") {
        let mut days = (7 - today.weekday().num_days_from_monday()) % 7;
        if days == 0 {
            days = 7;
        }
        return Some(today + Duration::days(days as i64));
    }

    for (name, target) in WEEKDAYS {
        if text.contains(name) {
            let mut ahead = (target + 7 - today.weekday().num_days_from_monday()) % 7;
            if ahead == 0 {
                // Same day named means next week.
                ahead = 7;
            }
            return Some(today + Duration::days(ahead as i64));
        }
    }

    if let Some(caps) = EXPLICIT_DATE.captures(text) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        if (1..=31).contains(&day) {
            let mut year = today.year();
            if month < today.month() || (month == today.month() && day < today.day()) {
                year += 1;
            }
            return NaiveDate::from_ymd_opt(year, month, day);
        }
    }

    None
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    if text.contains("medio dia") || text.contains("mediodía") || text.contains("medio día") {
        return NaiveTime::from_hms_opt(12, 0, 0);
    }

    if let Some(caps) = HALF_PAST.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        if (1..=12).contains(&hour) {
            return NaiveTime::from_hms_opt(hour, 30, 0);
        }
    }

    if let Some(caps) = CLOCK_TIME.captures(text) {
        let mut hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        match caps.get(3).map(|m| m.as_str().to_lowercase()) {
            Some(m) if m == "pm" && hour < 12 => hour += 12,
            Some(m) if m == "am" && hour == 12 => hour = 0,
            _ => {}
        }
        if hour <= 23 && minute <= 59 {
            return NaiveTime::from_hms_opt(hour, minute, 0);
        }
    }

    if let Some(caps) = HOUR_MERIDIEM.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let meridiem = caps[2].to_lowercase();
        if (1..=12).contains(&hour) {
            let mut h = hour % 12;
            if meridiem == "pm" {
                h += 12;
            }
            return NaiveTime::from_hms_opt(h, 0, 0);
        }
    }

    if text.contains("tarde") {
        return NaiveTime::from_hms_opt(15, 0, 0);
    }
    if text.contains("por la mañana") {
        return NaiveTime::from_hms_opt(10, 0, 0);
    }

    None
}
