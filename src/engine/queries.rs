use crate::model::*;

/// Reservations on `date`, optionally restricted to one classroom.
pub fn reservations_on(
    reservations: &[Reservation],
    date: Date,
    classroom: Option<Classroom>,
) -> impl Iterator<Item = &Reservation> {
    reservations
        .iter()
        .filter(move |r| r.is_on(date) && classroom.is_none_or(|c| r.classroom == c))
}

pub fn reservations_by_date(
    reservations: &[Reservation],
    date: Date,
    classroom: Option<Classroom>,
) -> Vec<&Reservation> {
    reservations_on(reservations, date, classroom).collect()
}

/// Exact, case-sensitive match on the requester email.
pub fn reservations_by_user<'a>(reservations: &'a [Reservation], email: &str) -> Vec<&'a Reservation> {
    reservations.iter().filter(|r| r.user_email == email).collect()
}

pub fn reservations_in_group(reservations: &[Reservation], group_id: GroupId) -> Vec<&Reservation> {
    reservations
        .iter()
        .filter(|r| r.recurring_group_id == Some(group_id))
        .collect()
}

fn matches_filters(r: &Reservation, f: &ScheduleFilters) -> bool {
    let in_range = r.dates.iter().any(|d| *d >= f.start_date && *d <= f.end_date);
    in_range
        && f.user_type.is_none_or(|t| r.user_type == t)
        && f.status.is_none_or(|s| r.status == s)
        && f.course.as_ref().is_none_or(|c| r.course.as_ref() == Some(c))
        && f.classroom.is_none_or(|c| r.classroom == c)
        && f.semester.as_ref().is_none_or(|s| &r.semester == s)
}

/// A reservation is listed once if any of its dates falls in the range and
/// every present filter matches exactly.
pub fn filter_reservations<'a>(reservations: &'a [Reservation], filters: &ScheduleFilters) -> Vec<&'a Reservation> {
    reservations.iter().filter(|r| matches_filters(r, filters)).collect()
}

/// Newest pending reservations first, at most `limit`.
pub fn pending_notifications(reservations: &[Reservation], limit: usize) -> Vec<&Reservation> {
    let mut pending: Vec<&Reservation> = reservations
        .iter()
        .filter(|r| r.status == ReservationStatus::Pending)
        .collect();
    pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    pending.truncate(limit);
    pending
}

/// Most recently updated reservations that have left `Pending`.
pub fn recent_actions(reservations: &[Reservation], limit: usize) -> Vec<&Reservation> {
    let mut acted: Vec<&Reservation> = reservations
        .iter()
        .filter(|r| r.status != ReservationStatus::Pending)
        .collect();
    acted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    acted.truncate(limit);
    acted
}
