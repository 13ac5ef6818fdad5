use crate::model::{Date, ReservationId, ReservationStatus, TimeOfDay};
use crate::store::StoreError;

/// A request or command that is malformed or incomplete. Always raised before
/// anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingField(&'static str),
    NonInstitutionalEmail(String),
    MissingSubject,
    FieldTooLong(&'static str),
    MisalignedTime(TimeOfDay),
    InvalidTimeRange { start: TimeOfDay, end: TimeOfDay },
    OutsideOperatingHours { start: TimeOfDay, end: TimeOfDay },
    InvalidDayOfWeek(u8),
    RecurrenceTooLong(i64),
    TooManyDates(usize),
    NoDates,
    DateInPast(Date),
    InvalidMonth { year: i32, month: u32 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingField(field) => write!(f, "{field} is required"),
            ValidationError::NonInstitutionalEmail(email) => {
                write!(f, "email {email} is not an institutional address")
            }
            ValidationError::MissingSubject => write!(f, "subject is required for professors"),
            ValidationError::FieldTooLong(field) => write!(f, "{field} is too long"),
            ValidationError::MisalignedTime(t) => {
                write!(f, "time {t} is not on a 30-minute boundary")
            }
            ValidationError::InvalidTimeRange { start, end } => {
                write!(f, "start time {start} must be before end time {end}")
            }
            ValidationError::OutsideOperatingHours { start, end } => {
                write!(f, "{start}-{end} is outside lab hours (07:30-23:30)")
            }
            ValidationError::InvalidDayOfWeek(day) => {
                write!(f, "day of week {day} is out of range 0-6")
            }
            ValidationError::RecurrenceTooLong(days) => {
                write!(f, "recurrence spans {days} days")
            }
            ValidationError::TooManyDates(n) => write!(f, "too many dates in one request: {n}"),
            ValidationError::NoDates => write!(f, "no valid dates in request"),
            ValidationError::DateInPast(date) => write!(f, "date {date} is in the past"),
            ValidationError::InvalidMonth { year, month } => {
                write!(f, "invalid month {year}-{month:02}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug)]
pub enum EngineError {
    Validation(ValidationError),
    NotFound(ReservationId),
    InvalidTransition {
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    /// Approving `id` would double-book a slot already held by the approved
    /// reservation `with`.
    Conflict {
        id: ReservationId,
        with: ReservationId,
        date: Date,
        slot: TimeOfDay,
    },
    Storage(StoreError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(e) => write!(f, "invalid request: {e}"),
            EngineError::NotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::InvalidTransition { id, from, to } => {
                write!(f, "reservation {id} cannot move from {from} to {to}")
            }
            EngineError::Conflict { id, with, date, slot } => write!(
                f,
                "reservation {id} conflicts with approved reservation {with} on {date} at {slot}"
            ),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Validation(e) => Some(e),
            EngineError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        EngineError::Validation(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Storage(e)
    }
}
