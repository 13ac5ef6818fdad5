pub const MAX_NAME_LEN: usize = 200;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_SUBJECT_LEN: usize = 200;
pub const MAX_COURSE_LEN: usize = 200;
pub const MAX_SEMESTER_LEN: usize = 16;
pub const MAX_OBSERVATIONS_LEN: usize = 2_000;
pub const MAX_REJECTION_REASON_LEN: usize = 1_000;
pub const MAX_ACTOR_ID_LEN: usize = 254;
pub const MAX_ALERT_LEN: usize = 500;
pub const MAX_NOTES_LEN: usize = 500;

/// Upper bound on records a single request may fan out into.
pub const MAX_DATES_PER_REQUEST: usize = 200;
/// A recurrence may cover at most one year (plus a leap day).
pub const MAX_RECURRENCE_SPAN_DAYS: i64 = 366;

pub const NOTIFICATION_RECENT_ACTIONS: usize = 3;
