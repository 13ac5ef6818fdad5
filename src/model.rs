use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::notify::Topic;
use crate::schedule::{DailySchedule, LabStatus, WeeklySchedule};

/// Unix milliseconds. The only timestamp type.
pub type Ms = i64;

/// Calendar date as written in records and requests (`YYYY-MM-DD`).
pub type Date = NaiveDate;

pub type ReservationId = Ulid;
pub type GroupId = Ulid;

// ── Time of day ──────────────────────────────────────────────────

/// Minutes since midnight, rendered as `HH:MM` (24h).
///
/// Slot labels and reservation start/end times are both expressed with this
/// type; a slot is named by its start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

pub const MINUTES_PER_DAY: u16 = 24 * 60;

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);

    pub const fn hm(hours: u16, minutes: u16) -> Self {
        Self(hours * 60 + minutes)
    }

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes <= MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub const fn minutes(self) -> u16 {
        self.0
    }

    pub fn checked_add_minutes(self, minutes: u16) -> Option<Self> {
        Self::from_minutes(self.0.checked_add(minutes)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimeError(pub String);

impl fmt::Display for ParseTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time of day {:?}, expected HH:MM", self.0)
    }
}

impl std::error::Error for ParseTimeError {}

impl FromStr for TimeOfDay {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeError(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(err)?;
        if h.len() != 2 || m.len() != 2 {
            return Err(err());
        }
        let hours: u16 = h.parse().map_err(|_| err())?;
        let minutes: u16 = m.parse().map_err(|_| err())?;
        if hours > 23 || minutes > 59 {
            return Err(err());
        }
        Ok(Self::hm(hours, minutes))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ParseTimeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

// ── Closed vocabularies ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Student,
    Professor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Classroom {
    #[default]
    #[serde(rename = "LabComp")]
    LabComp,
    #[serde(rename = "MP 53")]
    Mp53,
}

impl Classroom {
    pub fn as_str(self) -> &'static str {
        match self {
            Classroom::LabComp => "LabComp",
            Classroom::Mp53 => "MP 53",
        }
    }
}

impl fmt::Display for Classroom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classroom {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LabComp" => Ok(Classroom::LabComp),
            "MP 53" => Ok(Classroom::Mp53),
            other => Err(format!("unknown classroom: {other}")),
        }
    }
}

/// Reservation lifecycle.
///
/// `Pending` and `AwaitingDepartmentConfirmation` are open; `Approved` and
/// `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Approved,
    Rejected,
    AwaitingDepartmentConfirmation,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReservationStatus::Approved | ReservationStatus::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Approved => "approved",
            ReservationStatus::Rejected => "rejected",
            ReservationStatus::AwaitingDepartmentConfirmation => "awaiting_department_confirmation",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationKind {
    Single,
    Recurring,
    SpecificDates,
}

impl ReservationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReservationKind::Single => "single",
            ReservationKind::Recurring => "recurring",
            ReservationKind::SpecificDates => "specific_dates",
        }
    }
}

impl fmt::Display for ReservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Temporal shape of a request, resolved to concrete dates at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reservation_type", rename_all = "snake_case")]
pub enum DateSpec {
    Single {
        date: Date,
    },
    SpecificDates {
        dates: Vec<Date>,
    },
    /// Every `day_of_week` (0 = Sunday .. 6 = Saturday) in `[start_date, end_date]`.
    Recurring {
        day_of_week: u8,
        start_date: Date,
        end_date: Date,
    },
}

impl DateSpec {
    pub fn kind(&self) -> ReservationKind {
        match self {
            DateSpec::Single { .. } => ReservationKind::Single,
            DateSpec::SpecificDates { .. } => ReservationKind::SpecificDates,
            DateSpec::Recurring { .. } => ReservationKind::Recurring,
        }
    }
}

// ── Requests and records ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub user_email: String,
    pub user_name: String,
    pub user_type: UserType,
    pub subject: Option<String>,
    pub course: Option<String>,
    pub classroom: Option<Classroom>,
    pub when: DateSpec,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub observations: Option<String>,
    pub semester: Option<String>,
}

/// One stored booking. Records produced by this crate always carry exactly
/// one date; `dates` stays a list so filters also work over older records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_email: String,
    pub user_name: String,
    pub user_type: UserType,
    pub subject: Option<String>,
    pub course: Option<String>,
    pub classroom: Classroom,
    pub kind: ReservationKind,
    pub dates: Vec<Date>,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub time_slots: Vec<TimeOfDay>,
    pub status: ReservationStatus,
    pub created_at: Ms,
    pub updated_at: Ms,
    pub approved_by: Option<String>,
    pub approved_at: Option<Ms>,
    pub department_confirmed_by: Option<String>,
    pub department_confirmed_at: Option<Ms>,
    pub rejection_reason: Option<String>,
    pub observations: Option<String>,
    pub semester: String,
    pub is_recurring: bool,
    pub recurring_group_id: Option<GroupId>,
}

impl Reservation {
    pub fn is_on(&self, date: Date) -> bool {
        self.dates.contains(&date)
    }

    pub fn holds_slot(&self, slot: TimeOfDay) -> bool {
        self.time_slots.contains(&slot)
    }

    /// First `(date, slot)` both reservations occupy, if any. Classroom is
    /// not considered here.
    pub fn first_shared_slot(&self, other: &Reservation) -> Option<(Date, TimeOfDay)> {
        let date = self.dates.iter().copied().find(|d| other.is_on(*d))?;
        let slot = self.time_slots.iter().copied().find(|s| other.holds_slot(*s))?;
        Some((date, slot))
    }
}

/// Admin list filter. Dates are inclusive; `None` fields match anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleFilters {
    pub start_date: Date,
    pub end_date: Date,
    pub user_type: Option<UserType>,
    pub status: Option<ReservationStatus>,
    pub course: Option<String>,
    pub classroom: Option<Classroom>,
    pub semester: Option<String>,
}

impl ScheduleFilters {
    pub fn between(start_date: Date, end_date: Date) -> Self {
        Self {
            start_date,
            end_date,
            user_type: None,
            status: None,
            course: None,
            classroom: None,
            semester: None,
        }
    }
}

// ── Journal records ──────────────────────────────────────────────

/// Flat event types. This is the WAL record format.
///
/// A multi-date creation is a single `ReservationsCreated` record so the
/// whole group lands or none of it does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationsCreated {
        reservations: Vec<Reservation>,
    },
    ConfirmationRequested {
        id: ReservationId,
        at: Ms,
    },
    ReservationApproved {
        id: ReservationId,
        approved_by: String,
        at: Ms,
    },
    ReservationRejected {
        id: ReservationId,
        rejected_by: String,
        reason: String,
        at: Ms,
    },
    DepartmentConfirmed {
        id: ReservationId,
        confirmed_by: String,
        at: Ms,
    },
    LabStatusChanged {
        status: LabStatus,
        special_alert: String,
        at: Ms,
    },
    WeeklyScheduleUpdated {
        schedule: WeeklySchedule,
        at: Ms,
    },
    DailySchedulesSet {
        schedules: Vec<DailySchedule>,
        at: Ms,
    },
    DailyScheduleRemoved {
        date: Date,
        at: Ms,
    },
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::ReservationsCreated { .. }
            | Event::ConfirmationRequested { .. }
            | Event::ReservationApproved { .. }
            | Event::ReservationRejected { .. }
            | Event::DepartmentConfirmed { .. } => Topic::Reservations,
            Event::LabStatusChanged { .. }
            | Event::WeeklyScheduleUpdated { .. }
            | Event::DailySchedulesSet { .. }
            | Event::DailyScheduleRemoved { .. } => Topic::Lab,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shift {
    Morning,
    Afternoon,
    Evening,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SlotState {
    Free,
    Reserved {
        reservation_id: ReservationId,
        reserved_by: String,
        subject: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub state: SlotState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShiftView {
    pub shift: Shift,
    pub slots: Vec<SlotView>,
}

/// Calendar cell for one date and classroom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaySchedule {
    pub date: Date,
    pub weekday: Weekday,
    pub is_open: bool,
    pub shifts: Vec<ShiftView>,
    pub reservations: Vec<Reservation>,
}
