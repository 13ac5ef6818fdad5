use std::time::Instant;

use tracing::{info, warn};
use ulid::Ulid;

use crate::config::ConflictPolicy;
use crate::limits::*;
use crate::model::*;
use crate::observability::{
    CONFLICTS_TOTAL, MUTATION_DURATION_SECONDS, RESERVATIONS_CREATED_TOTAL,
    STATUS_TRANSITIONS_TOTAL, VALIDATION_FAILURES_TOTAL, WAL_COMPACTIONS_TOTAL,
};
use crate::schedule::{month_defaults, DailySchedule, LabConfig, LabStatus, WeeklySchedule};

use super::conflict::check_no_conflict;
use super::slots::generate_time_slots;
use super::validation::{validate_actor, validate_request};
use super::{Engine, EngineError, ValidationError};

fn observe(op: &'static str, started: Instant) {
    metrics::histogram!(MUTATION_DURATION_SECONDS, "operation" => op)
        .record(started.elapsed().as_secs_f64());
}

fn invalid_transition(current: &Reservation, to: ReservationStatus) -> EngineError {
    EngineError::InvalidTransition {
        id: current.id,
        from: current.status,
        to,
    }
}

fn check_text(value: &str, max: usize, field: &'static str) -> Result<(), ValidationError> {
    if value.len() > max {
        return Err(ValidationError::FieldTooLong(field));
    }
    Ok(())
}

impl Engine {
    /// Count and log a validation failure, then lift it.
    fn refuse<T>(&self, op: &'static str, result: Result<T, ValidationError>) -> Result<T, EngineError> {
        result.map_err(|e| {
            metrics::counter!(VALIDATION_FAILURES_TOTAL, "operation" => op).increment(1);
            warn!("{op} refused: {e}");
            EngineError::Validation(e)
        })
    }

    fn current(&self, id: &ReservationId) -> Result<Reservation, EngineError> {
        self.snapshot()
            .reservation(id)
            .cloned()
            .ok_or(EngineError::NotFound(*id))
    }

    fn ensure_no_conflict(&self, candidate: &Reservation) -> Result<(), EngineError> {
        if self.settings().conflict_policy == ConflictPolicy::Allow {
            return Ok(());
        }
        check_no_conflict(self.snapshot().reservations(), candidate).inspect_err(|e| {
            metrics::counter!(CONFLICTS_TOTAL).increment(1);
            warn!("{e}");
        })
    }

    async fn commit_transition(
        &self,
        id: ReservationId,
        to: ReservationStatus,
        event: Event,
    ) -> Result<Reservation, EngineError> {
        let snapshot = self.store().commit(event).await?;
        metrics::counter!(STATUS_TRANSITIONS_TOTAL, "to" => to.as_str()).increment(1);
        info!("reservation {id} -> {to}");
        snapshot
            .reservation(&id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    // ── Creation ─────────────────────────────────────────────

    /// Submit a request. Records start awaiting department confirmation.
    pub async fn create_reservation(
        &self,
        request: ReservationRequest,
    ) -> Result<Vec<Reservation>, EngineError> {
        self.create_with_status(
            request,
            ReservationStatus::AwaitingDepartmentConfirmation,
            "create_reservation",
        )
        .await
    }

    /// Submit a request that goes straight to the admin queue as `pending`.
    pub async fn create_pending_reservation(
        &self,
        request: ReservationRequest,
    ) -> Result<Vec<Reservation>, EngineError> {
        self.create_with_status(request, ReservationStatus::Pending, "create_pending_reservation")
            .await
    }

    /// Resolve the request to one record per date and write them as one
    /// batch. Several dates share a fresh group id.
    async fn create_with_status(
        &self,
        request: ReservationRequest,
        status: ReservationStatus,
        op: &'static str,
    ) -> Result<Vec<Reservation>, EngineError> {
        let started = Instant::now();
        let dates = self.refuse(op, validate_request(&request, self.settings(), self.today()))?;

        let now = self.now();
        let time_slots = generate_time_slots(request.start_time, request.end_time);
        let kind = request.when.kind();
        let group_id = (dates.len() > 1).then(Ulid::new);
        let semester = request
            .semester
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(|| self.settings().current_semester.clone(), str::to_string);

        let _guard = self.write_lock.lock().await;
        let mut batch = self.store().batch();
        for date in dates {
            batch.add(Reservation {
                id: Ulid::new(),
                user_email: request.user_email.trim().to_string(),
                user_name: request.user_name.trim().to_string(),
                user_type: request.user_type,
                subject: request.subject.clone(),
                course: request.course.clone(),
                classroom: request.classroom.unwrap_or_default(),
                kind,
                dates: vec![date],
                start_time: request.start_time,
                end_time: request.end_time,
                time_slots: time_slots.clone(),
                status,
                created_at: now,
                updated_at: now,
                approved_by: None,
                approved_at: None,
                department_confirmed_by: None,
                department_confirmed_at: None,
                rejection_reason: None,
                observations: request.observations.clone(),
                semester: semester.clone(),
                is_recurring: group_id.is_some(),
                recurring_group_id: group_id,
            });
        }
        let written = batch.commit().await?;

        metrics::counter!(RESERVATIONS_CREATED_TOTAL, "kind" => kind.as_str())
            .increment(written.len() as u64);
        observe(op, started);
        match group_id {
            Some(group) => info!(
                "{} {kind} reservations for {} in group {group}",
                written.len(),
                request.user_email.trim()
            ),
            None => info!("{kind} reservation for {}", request.user_email.trim()),
        }
        Ok(written)
    }

    // ── Status transitions ───────────────────────────────────

    /// `pending -> awaiting_department_confirmation`. Repeating it is a no-op.
    pub async fn request_department_confirmation(
        &self,
        id: ReservationId,
    ) -> Result<Reservation, EngineError> {
        let _guard = self.write_lock.lock().await;
        let current = self.current(&id)?;
        let to = ReservationStatus::AwaitingDepartmentConfirmation;
        match current.status {
            ReservationStatus::Pending => {}
            ReservationStatus::AwaitingDepartmentConfirmation => return Ok(current),
            _ => return Err(invalid_transition(&current, to)),
        }
        let event = Event::ConfirmationRequested { id, at: self.now() };
        self.commit_transition(id, to, event).await
    }

    /// Approve a reservation. Approving an approved record changes nothing.
    pub async fn approve(
        &self,
        id: ReservationId,
        approver_id: &str,
    ) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        self.refuse("approve", validate_actor(approver_id, "approverId"))?;

        let _guard = self.write_lock.lock().await;
        let current = self.current(&id)?;
        let to = ReservationStatus::Approved;
        match current.status {
            ReservationStatus::Approved => return Ok(current),
            ReservationStatus::Rejected => return Err(invalid_transition(&current, to)),
            ReservationStatus::Pending | ReservationStatus::AwaitingDepartmentConfirmation => {}
        }
        self.ensure_no_conflict(&current)?;

        let event = Event::ReservationApproved {
            id,
            approved_by: approver_id.to_string(),
            at: self.now(),
        };
        let approved = self.commit_transition(id, to, event).await?;
        observe("approve", started);
        Ok(approved)
    }

    /// Reject with a mandatory reason. Rejecting a rejected record changes
    /// nothing; an approved one can no longer be rejected.
    pub async fn reject(
        &self,
        id: ReservationId,
        approver_id: &str,
        reason: &str,
    ) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        self.refuse("reject", validate_actor(approver_id, "approverId"))?;
        let reason = reason.trim();
        if reason.is_empty() {
            return self.refuse("reject", Err(ValidationError::MissingField("rejectionReason")));
        }
        self.refuse(
            "reject",
            check_text(reason, MAX_REJECTION_REASON_LEN, "rejectionReason"),
        )?;

        let _guard = self.write_lock.lock().await;
        let current = self.current(&id)?;
        let to = ReservationStatus::Rejected;
        match current.status {
            ReservationStatus::Rejected => return Ok(current),
            ReservationStatus::Approved => return Err(invalid_transition(&current, to)),
            ReservationStatus::Pending | ReservationStatus::AwaitingDepartmentConfirmation => {}
        }

        let event = Event::ReservationRejected {
            id,
            rejected_by: approver_id.to_string(),
            reason: reason.to_string(),
            at: self.now(),
        };
        let rejected = self.commit_transition(id, to, event).await?;
        observe("reject", started);
        Ok(rejected)
    }

    /// Department sign-off; ends in `approved` like `approve`.
    pub async fn department_confirm(
        &self,
        id: ReservationId,
        confirmer_id: &str,
    ) -> Result<Reservation, EngineError> {
        let started = Instant::now();
        self.refuse("department_confirm", validate_actor(confirmer_id, "confirmerId"))?;

        let _guard = self.write_lock.lock().await;
        let current = self.current(&id)?;
        let to = ReservationStatus::Approved;
        match current.status {
            ReservationStatus::Approved => return Ok(current),
            ReservationStatus::Rejected => return Err(invalid_transition(&current, to)),
            ReservationStatus::Pending | ReservationStatus::AwaitingDepartmentConfirmation => {}
        }
        self.ensure_no_conflict(&current)?;

        let event = Event::DepartmentConfirmed {
            id,
            confirmed_by: confirmer_id.to_string(),
            at: self.now(),
        };
        let confirmed = self.commit_transition(id, to, event).await?;
        observe("department_confirm", started);
        Ok(confirmed)
    }

    // ── Lab configuration ────────────────────────────────────

    pub async fn set_lab_status(
        &self,
        status: LabStatus,
        special_alert: &str,
    ) -> Result<LabConfig, EngineError> {
        let special_alert = special_alert.trim();
        self.refuse(
            "set_lab_status",
            check_text(special_alert, MAX_ALERT_LEN, "specialAlert"),
        )?;
        let _guard = self.write_lock.lock().await;
        let event = Event::LabStatusChanged {
            status,
            special_alert: special_alert.to_string(),
            at: self.now(),
        };
        let snapshot = self.store().commit(event).await?;
        info!("lab status set to {status}");
        Ok(snapshot.lab().clone())
    }

    pub async fn update_weekly_schedule(
        &self,
        schedule: WeeklySchedule,
    ) -> Result<LabConfig, EngineError> {
        for entry in schedule.entries().filter(|e| e.active) {
            if entry.start >= entry.end {
                return self.refuse(
                    "update_weekly_schedule",
                    Err(ValidationError::InvalidTimeRange {
                        start: entry.start,
                        end: entry.end,
                    }),
                );
            }
        }
        let _guard = self.write_lock.lock().await;
        let event = Event::WeeklyScheduleUpdated {
            schedule,
            at: self.now(),
        };
        let snapshot = self.store().commit(event).await?;
        info!("weekly schedule updated");
        Ok(snapshot.lab().clone())
    }

    /// Insert or replace the override for one date.
    pub async fn set_daily_schedule(
        &self,
        schedule: DailySchedule,
    ) -> Result<DailySchedule, EngineError> {
        if schedule.active && schedule.start >= schedule.end {
            return self.refuse(
                "set_daily_schedule",
                Err(ValidationError::InvalidTimeRange {
                    start: schedule.start,
                    end: schedule.end,
                }),
            );
        }
        if let Some(notes) = &schedule.notes {
            self.refuse("set_daily_schedule", check_text(notes, MAX_NOTES_LEN, "notes"))?;
        }
        let _guard = self.write_lock.lock().await;
        let date = schedule.date;
        let event = Event::DailySchedulesSet {
            schedules: vec![schedule.clone()],
            at: self.now(),
        };
        self.store().commit(event).await?;
        info!("daily schedule set for {date}");
        Ok(schedule)
    }

    /// Drop the override for `date`. Returns whether one existed.
    pub async fn remove_daily_schedule(&self, date: Date) -> Result<bool, EngineError> {
        let _guard = self.write_lock.lock().await;
        if !self.snapshot().daily_schedules().contains_key(&date) {
            return Ok(false);
        }
        let event = Event::DailyScheduleRemoved {
            date,
            at: self.now(),
        };
        self.store().commit(event).await?;
        info!("daily schedule removed for {date}");
        Ok(true)
    }

    /// Fill every weekday of the month that has no override with the
    /// default hours. Returns the entries created.
    pub async fn generate_month_schedules(
        &self,
        year: i32,
        month: u32,
    ) -> Result<Vec<DailySchedule>, EngineError> {
        let _guard = self.write_lock.lock().await;
        let generated = self.refuse(
            "generate_month_schedules",
            month_defaults(year, month, self.snapshot().daily_schedules())
                .ok_or(ValidationError::InvalidMonth { year, month }),
        )?;
        if generated.is_empty() {
            return Ok(generated);
        }
        let event = Event::DailySchedulesSet {
            schedules: generated.clone(),
            at: self.now(),
        };
        self.store().commit(event).await?;
        info!("generated {} daily schedules for {year}-{month:02}", generated.len());
        Ok(generated)
    }

    // ── Maintenance ──────────────────────────────────────────

    /// Rewrite the journal as the minimal history of the current state.
    pub async fn compact(&self) -> Result<(), EngineError> {
        self.store().compact().await?;
        metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
        Ok(())
    }
}
