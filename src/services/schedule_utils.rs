use chrono::{
    offset::LocalResult, DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Timelike, Utc, Weekday,
};
use chrono_tz::Tz;
use serde_json::json;

use crate::error::{AppError, AppResult};

/// Spacing between consecutive candidate start times.
pub const SLOT_STEP_MINUTES: i64 = 30;

/// A half-open `[start, end)` interval of absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtcWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl UtcWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Start instants `start, start + step, ...` whose `duration`-long
    /// interval still fits inside the window.
    pub fn slot_starts(&self, duration_minutes: i64, step_minutes: i64) -> Vec<DateTime<Utc>> {
        let duration = Duration::minutes(duration_minutes);
        let step = Duration::minutes(step_minutes);
        let mut starts = Vec::new();
        if duration_minutes <= 0 || step_minutes <= 0 {
            return starts;
        }

        let mut cursor = self.start;
        while cursor + duration <= self.end {
            starts.push(cursor);
            cursor += step;
        }
        starts
    }
}

pub fn parse_time_zone(name: &str) -> AppResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| AppError::invalid_time_zone(name))
}

/// Resolves a local wall-clock reading to UTC for one specific date.
///
/// Offsets are looked up for `date` itself, so the same clock time maps to
/// different instants either side of a DST change. An ambiguous reading
/// (clocks falling back) resolves to its earlier instant; a reading inside
/// a spring-forward gap resolves to the first instant after the gap.
pub fn local_to_utc(tz: &Tz, date: NaiveDate, time: NaiveTime) -> AppResult<DateTime<Utc>> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => resolve_gap(tz, naive),
    }
}

fn resolve_gap(tz: &Tz, naive: NaiveDateTime) -> AppResult<DateTime<Utc>> {
    // Gaps are at most a few hours; walk forward to the first valid minute.
    let mut shifted = naive;
    for _ in 0..(4 * 60) {
        shifted += Duration::minutes(1);
        if let Some(dt) = tz.from_local_datetime(&shifted).earliest() {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    Err(AppError::validation_with_details(
        "local time cannot be resolved in time zone",
        json!({"timeZone": tz.name(), "localTime": naive.to_string()}),
    ))
}

/// Working hours of one person on `date`, expressed in UTC. Returns an empty
/// window when the local end is not after the local start.
pub fn working_window_utc(
    tz: &Tz,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> AppResult<UtcWindow> {
    Ok(UtcWindow::new(
        local_to_utc(tz, date, start)?,
        local_to_utc(tz, date, end)?,
    ))
}

/// Latest start and earliest end over every window; `None` for an empty
/// input or when the windows share no time.
pub fn intersect(windows: &[UtcWindow]) -> Option<UtcWindow> {
    let start = windows.iter().map(|w| w.start).max()?;
    let end = windows.iter().map(|w| w.end).min()?;
    let common = UtcWindow::new(start, end);
    if common.is_empty() {
        None
    } else {
        Some(common)
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn local_datetime(instant: DateTime<Utc>, tz: &Tz) -> DateTime<Tz> {
    instant.with_timezone(tz)
}

pub fn local_hour(instant: DateTime<Utc>, tz: &Tz) -> u32 {
    instant.with_timezone(tz).hour()
}

pub fn local_clock(instant: DateTime<Utc>, tz: &Tz) -> NaiveTime {
    instant.with_timezone(tz).time()
}

/// Clock-time overlap of `[a_start, a_end)` and `[b_start, b_end)` within a
/// single day.
pub fn clock_ranges_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp (its UTC date is used).
pub fn parse_date(value: &str) -> AppResult<NaiveDate> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .map_err(|err| {
            AppError::validation_with_details(
                "invalid date",
                json!({"value": value, "error": err.to_string()}),
            )
        })
}

pub fn parse_datetime(value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| {
            AppError::validation_with_details(
                "invalid timestamp",
                json!({"value": value, "error": err.to_string()}),
            )
        })
}

pub fn format_utc(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
