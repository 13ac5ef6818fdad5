use chrono::{Datelike, Days, Weekday};

use crate::limits::*;
use crate::model::{Date, DateSpec};

use super::slots::weekday_from_index;
use super::ValidationError;

/// Every `weekday` in `[start, end]`, ascending. Empty when `start > end`.
pub fn recurring_dates(weekday: Weekday, start: Date, end: Date) -> Vec<Date> {
    let mut dates = Vec::new();
    if start > end {
        return dates;
    }
    let offset = (weekday.num_days_from_sunday() + 7 - start.weekday().num_days_from_sunday()) % 7;
    let mut current = match start.checked_add_days(Days::new(u64::from(offset))) {
        Some(first) => first,
        None => return dates,
    };
    while current <= end {
        dates.push(current);
        match current.checked_add_days(Days::new(7)) {
            Some(next) => current = next,
            None => break,
        }
    }
    dates
}

/// Concrete dates a request covers, ascending and without duplicates.
pub fn resolve_dates(spec: &DateSpec) -> Result<Vec<Date>, ValidationError> {
    let dates = match spec {
        DateSpec::Single { date } => vec![*date],
        DateSpec::SpecificDates { dates } => {
            if dates.len() > MAX_DATES_PER_REQUEST {
                return Err(ValidationError::TooManyDates(dates.len()));
            }
            let mut dates = dates.clone();
            dates.sort_unstable();
            dates.dedup();
            dates
        }
        DateSpec::Recurring {
            day_of_week,
            start_date,
            end_date,
        } => {
            let weekday =
                weekday_from_index(*day_of_week).ok_or(ValidationError::InvalidDayOfWeek(*day_of_week))?;
            let span_days = (*end_date - *start_date).num_days();
            if span_days > MAX_RECURRENCE_SPAN_DAYS {
                return Err(ValidationError::RecurrenceTooLong(span_days));
            }
            recurring_dates(weekday, *start_date, *end_date)
        }
    };
    if dates.is_empty() {
        return Err(ValidationError::NoDates);
    }
    if dates.len() > MAX_DATES_PER_REQUEST {
        return Err(ValidationError::TooManyDates(dates.len()));
    }
    Ok(dates)
}
