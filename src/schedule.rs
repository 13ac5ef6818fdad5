use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::engine::is_weekend;
use crate::model::{Date, Ms, TimeOfDay};

/// Manually set lab status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabStatus {
    Open,
    #[default]
    Closed,
    Maintenance,
}

impl fmt::Display for LabStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LabStatus::Open => "open",
            LabStatus::Closed => "closed",
            LabStatus::Maintenance => "maintenance",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub active: bool,
}

impl ScheduleEntry {
    pub const fn open(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end, active: true }
    }

    pub const fn closed() -> Self {
        Self {
            start: TimeOfDay::MIDNIGHT,
            end: TimeOfDay::MIDNIGHT,
            active: false,
        }
    }

    /// `[start, end)` when the entry is active and non-empty.
    pub fn window(&self) -> Option<(TimeOfDay, TimeOfDay)> {
        (self.active && self.start < self.end).then_some((self.start, self.end))
    }
}

/// One entry per weekday, indexed from Sunday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    days: [ScheduleEntry; 7],
}

const WEEKDAY_HOURS: ScheduleEntry = ScheduleEntry::open(TimeOfDay::hm(12, 0), TimeOfDay::hm(18, 0));
const FRIDAY_HOURS: ScheduleEntry = ScheduleEntry::open(TimeOfDay::hm(8, 0), TimeOfDay::hm(14, 0));

impl Default for WeeklySchedule {
    fn default() -> Self {
        Self {
            days: [
                ScheduleEntry::closed(),
                WEEKDAY_HOURS,
                WEEKDAY_HOURS,
                WEEKDAY_HOURS,
                WEEKDAY_HOURS,
                FRIDAY_HOURS,
                ScheduleEntry::closed(),
            ],
        }
    }
}

impl WeeklySchedule {
    pub fn get(&self, day: Weekday) -> &ScheduleEntry {
        &self.days[day.num_days_from_sunday() as usize]
    }

    pub fn set(&mut self, day: Weekday, entry: ScheduleEntry) {
        self.days[day.num_days_from_sunday() as usize] = entry;
    }

    /// Entries from Sunday to Saturday.
    pub fn entries(&self) -> impl Iterator<Item = &ScheduleEntry> {
        self.days.iter()
    }
}

/// Per-date override of the weekly schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySchedule {
    pub date: Date,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub active: bool,
    pub notes: Option<String>,
}

impl DailySchedule {
    pub fn window(&self) -> Option<(TimeOfDay, TimeOfDay)> {
        (self.active && self.start < self.end).then_some((self.start, self.end))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabConfig {
    pub status: LabStatus,
    pub special_alert: String,
    pub schedule: WeeklySchedule,
    pub last_update: Ms,
}

// ── Local time ───────────────────────────────────────────────────

pub fn fixed_offset(utc_offset_minutes: i32) -> FixedOffset {
    utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

/// Wall-clock time at the lab for a unix-ms instant.
pub fn local_datetime(now: Ms, utc_offset_minutes: i32) -> NaiveDateTime {
    DateTime::<Utc>::from_timestamp_millis(now)
        .unwrap_or_default()
        .with_timezone(&fixed_offset(utc_offset_minutes))
        .naive_local()
}

pub fn local_date(now: Ms, utc_offset_minutes: i32) -> Date {
    local_datetime(now, utc_offset_minutes).date()
}

fn time_of(dt: &NaiveDateTime) -> TimeOfDay {
    use chrono::Timelike;
    // hour <= 23 and minute <= 59, so the value always fits
    TimeOfDay::hm(dt.hour() as u16, dt.minute() as u16)
}

/// Inclusive on both ends, minute resolution.
pub fn is_time_in_range(current: TimeOfDay, start: TimeOfDay, end: TimeOfDay) -> bool {
    current >= start && current <= end
}

// ── Status and operating hours ───────────────────────────────────

/// Status to display right now. `Maintenance` and `Closed` are sticky; `Open`
/// holds only inside the weekday's active hours.
pub fn real_time_status(config: &LabConfig, now: NaiveDateTime) -> LabStatus {
    match config.status {
        LabStatus::Maintenance => LabStatus::Maintenance,
        LabStatus::Closed => LabStatus::Closed,
        LabStatus::Open => {
            let entry = config.schedule.get(now.weekday());
            if entry.active && is_time_in_range(time_of(&now), entry.start, entry.end) {
                LabStatus::Open
            } else {
                LabStatus::Closed
            }
        }
    }
}

/// Hours the lab operates on `date`. A daily entry overrides the weekly one;
/// a missing or inactive entry means closed, and weekends are always closed.
pub fn operating_window(
    date: Date,
    weekly: &WeeklySchedule,
    daily: &BTreeMap<Date, DailySchedule>,
) -> Option<(TimeOfDay, TimeOfDay)> {
    if is_weekend(date) {
        return None;
    }
    match daily.get(&date) {
        Some(entry) => entry.window(),
        None => weekly.get(date.weekday()).window(),
    }
}

/// Default hours for a weekday; `None` on weekends.
pub fn default_daily_schedule(date: Date) -> Option<DailySchedule> {
    if is_weekend(date) {
        return None;
    }
    let (entry, notes) = if date.weekday() == Weekday::Fri {
        (FRIDAY_HOURS, "Friday hours")
    } else {
        (WEEKDAY_HOURS, "Standard hours")
    };
    Some(DailySchedule {
        date,
        start: entry.start,
        end: entry.end,
        active: true,
        notes: Some(notes.to_string()),
    })
}

/// Default entries for every weekday of `year`-`month` that has no entry
/// yet. Returns `None` for an invalid month.
pub fn month_defaults(
    year: i32,
    month: u32,
    existing: &BTreeMap<Date, DailySchedule>,
) -> Option<Vec<DailySchedule>> {
    let mut day = NaiveDate::from_ymd_opt(year, month, 1)?;
    let mut out = Vec::new();
    while day.month() == month {
        if !existing.contains_key(&day)
            && let Some(entry) = default_daily_schedule(day)
        {
            out.push(entry);
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    Some(out)
}
