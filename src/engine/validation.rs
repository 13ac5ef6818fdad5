use crate::config::Settings;
use crate::limits::*;
use crate::model::*;

use super::recurrence::resolve_dates;
use super::slots::{is_slot_aligned, CLOSING, OPENING};
use super::ValidationError;

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(trimmed)
}

fn max_len(value: Option<&str>, max: usize, field: &'static str) -> Result<(), ValidationError> {
    match value {
        Some(v) if v.len() > max => Err(ValidationError::FieldTooLong(field)),
        _ => Ok(()),
    }
}

/// Actor ids are recorded verbatim but must be present.
pub(crate) fn validate_actor(actor: &str, field: &'static str) -> Result<(), ValidationError> {
    required(actor, field)?;
    max_len(Some(actor), MAX_ACTOR_ID_LEN, field)
}

pub(crate) fn validate_time_range(start: TimeOfDay, end: TimeOfDay) -> Result<(), ValidationError> {
    for t in [start, end] {
        if !is_slot_aligned(t) {
            return Err(ValidationError::MisalignedTime(t));
        }
    }
    if start >= end {
        return Err(ValidationError::InvalidTimeRange { start, end });
    }
    if start < OPENING || end > CLOSING {
        return Err(ValidationError::OutsideOperatingHours { start, end });
    }
    Ok(())
}

/// Check a request and resolve its dates. Nothing is written on failure.
pub fn validate_request(
    request: &ReservationRequest,
    settings: &Settings,
    today: Date,
) -> Result<Vec<Date>, ValidationError> {
    let email = required(&request.user_email, "userEmail")?;
    max_len(Some(email), MAX_EMAIL_LEN, "userEmail")?;
    if !settings.is_institutional_email(email) {
        return Err(ValidationError::NonInstitutionalEmail(email.to_string()));
    }
    let name = required(&request.user_name, "userName")?;
    max_len(Some(name), MAX_NAME_LEN, "userName")?;

    if request.user_type == UserType::Professor
        && request.subject.as_deref().is_none_or(|s| s.trim().is_empty())
    {
        return Err(ValidationError::MissingSubject);
    }
    max_len(request.subject.as_deref(), MAX_SUBJECT_LEN, "subject")?;
    max_len(request.course.as_deref(), MAX_COURSE_LEN, "course")?;
    max_len(request.observations.as_deref(), MAX_OBSERVATIONS_LEN, "observations")?;
    max_len(request.semester.as_deref(), MAX_SEMESTER_LEN, "semester")?;

    validate_time_range(request.start_time, request.end_time)?;

    let dates = resolve_dates(&request.when)?;
    if let Some(past) = dates.iter().find(|d| **d < today) {
        return Err(ValidationError::DateInPast(*past));
    }
    Ok(dates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> Date {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn today() -> Date {
        d(2025, 8, 25)
    }

    fn professor_request() -> ReservationRequest {
        ReservationRequest {
            user_email: "maria@docente.uefs.br".into(),
            user_name: "Maria Souza".into(),
            user_type: UserType::Professor,
            subject: Some("EXA 806 Data Structures".into()),
            course: Some("Computer Engineering".into()),
            classroom: None,
            when: DateSpec::Single { date: d(2025, 9, 1) },
            start_time: TimeOfDay::hm(13, 30),
            end_time: TimeOfDay::hm(15, 30),
            observations: None,
            semester: None,
        }
    }

    fn check(request: &ReservationRequest) -> Result<Vec<Date>, ValidationError> {
        validate_request(request, &Settings::default(), today())
    }

    #[test]
    fn valid_professor_request() {
        assert_eq!(check(&professor_request()), Ok(vec![d(2025, 9, 1)]));
    }

    #[test]
    fn professor_without_subject_rejected() {
        let mut req = professor_request();
        req.subject = None;
        assert_eq!(check(&req), Err(ValidationError::MissingSubject));
        req.subject = Some("   ".into());
        assert_eq!(check(&req), Err(ValidationError::MissingSubject));
    }

    #[test]
    fn student_needs_no_subject() {
        let mut req = professor_request();
        req.user_type = UserType::Student;
        req.user_email = "joao@aluno.uefs.br".into();
        req.subject = None;
        assert!(check(&req).is_ok());
    }

    #[test]
    fn email_rules() {
        let mut req = professor_request();
        req.user_email = "".into();
        assert_eq!(check(&req), Err(ValidationError::MissingField("userEmail")));
        req.user_email = "maria@gmail.com".into();
        assert_eq!(
            check(&req),
            Err(ValidationError::NonInstitutionalEmail("maria@gmail.com".into()))
        );
    }

    #[test]
    fn name_required() {
        let mut req = professor_request();
        req.user_name = " ".into();
        assert_eq!(check(&req), Err(ValidationError::MissingField("userName")));
    }

    #[test]
    fn time_range_rules() {
        let mut req = professor_request();
        req.end_time = req.start_time;
        assert!(matches!(check(&req), Err(ValidationError::InvalidTimeRange { .. })));

        req.start_time = TimeOfDay::hm(14, 15);
        req.end_time = TimeOfDay::hm(15, 0);
        assert_eq!(check(&req), Err(ValidationError::MisalignedTime(TimeOfDay::hm(14, 15))));

        req.start_time = TimeOfDay::hm(7, 0);
        assert!(matches!(check(&req), Err(ValidationError::OutsideOperatingHours { .. })));

        req.start_time = TimeOfDay::hm(22, 30);
        req.end_time = TimeOfDay::hm(23, 30);
        assert!(check(&req).is_ok());
    }

    #[test]
    fn past_dates_rejected_today_allowed() {
        let mut req = professor_request();
        req.when = DateSpec::Single { date: today() };
        assert!(check(&req).is_ok());
        req.when = DateSpec::SpecificDates {
            dates: vec![d(2025, 9, 1), d(2025, 8, 20)],
        };
        assert_eq!(check(&req), Err(ValidationError::DateInPast(d(2025, 8, 20))));
    }

    #[test]
    fn field_lengths_capped() {
        let mut req = professor_request();
        req.observations = Some("x".repeat(MAX_OBSERVATIONS_LEN + 1));
        assert_eq!(check(&req), Err(ValidationError::FieldTooLong("observations")));
    }

    #[test]
    fn actor_required() {
        assert_eq!(validate_actor("", "approverId"), Err(ValidationError::MissingField("approverId")));
        assert!(validate_actor("admin-1", "approverId").is_ok());
    }
}
