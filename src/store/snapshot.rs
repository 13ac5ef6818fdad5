use std::collections::BTreeMap;

use tracing::debug;

use crate::model::*;
use crate::schedule::{DailySchedule, LabConfig};

/// Reservations per record when the whole snapshot is rewritten, keeping
/// each record well under the WAL's size cap.
const COMPACT_CHUNK: usize = 1024;

/// Everything a reader sees at one point in time. Reservations are ordered
/// by creation time, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    reservations: Vec<Reservation>,
    lab: LabConfig,
    daily_schedules: BTreeMap<Date, DailySchedule>,
    version: u64,
}

impl Snapshot {
    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn reservation(&self, id: &ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == *id)
    }

    pub fn lab(&self) -> &LabConfig {
        &self.lab
    }

    pub fn daily_schedules(&self) -> &BTreeMap<Date, DailySchedule> {
        &self.daily_schedules
    }

    /// Number of events applied since the store was opened (replay included).
    pub fn version(&self) -> u64 {
        self.version
    }

    fn reservation_mut(&mut self, id: &ReservationId) -> Option<&mut Reservation> {
        let found = self.reservations.iter_mut().find(|r| r.id == *id);
        if found.is_none() {
            debug!("event for unknown reservation {id}, skipped");
        }
        found
    }

    /// Apply one committed event. Events naming an unknown reservation are
    /// ignored.
    pub fn apply(&mut self, event: &Event) {
        self.version += 1;
        match event {
            Event::ReservationsCreated { reservations } => {
                let mut next = reservations.clone();
                next.append(&mut self.reservations);
                // stable: keeps batch order among equal timestamps
                next.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                self.reservations = next;
            }
            Event::ConfirmationRequested { id, at } => {
                if let Some(r) = self.reservation_mut(id) {
                    r.status = ReservationStatus::AwaitingDepartmentConfirmation;
                    r.updated_at = *at;
                }
            }
            Event::ReservationApproved { id, approved_by, at } => {
                if let Some(r) = self.reservation_mut(id) {
                    r.status = ReservationStatus::Approved;
                    r.approved_by = Some(approved_by.clone());
                    r.approved_at = Some(*at);
                    r.updated_at = *at;
                }
            }
            Event::ReservationRejected {
                id,
                rejected_by,
                reason,
                at,
            } => {
                if let Some(r) = self.reservation_mut(id) {
                    r.status = ReservationStatus::Rejected;
                    r.approved_by = Some(rejected_by.clone());
                    r.rejection_reason = Some(reason.clone());
                    r.updated_at = *at;
                }
            }
            Event::DepartmentConfirmed { id, confirmed_by, at } => {
                if let Some(r) = self.reservation_mut(id) {
                    r.status = ReservationStatus::Approved;
                    r.department_confirmed_by = Some(confirmed_by.clone());
                    r.department_confirmed_at = Some(*at);
                    r.updated_at = *at;
                }
            }
            Event::LabStatusChanged {
                status,
                special_alert,
                at,
            } => {
                self.lab.status = *status;
                self.lab.special_alert = special_alert.clone();
                self.lab.last_update = *at;
            }
            Event::WeeklyScheduleUpdated { schedule, at } => {
                self.lab.schedule = schedule.clone();
                self.lab.last_update = *at;
            }
            Event::DailySchedulesSet { schedules, .. } => {
                for s in schedules {
                    self.daily_schedules.insert(s.date, s.clone());
                }
            }
            Event::DailyScheduleRemoved { date, .. } => {
                self.daily_schedules.remove(date);
            }
        }
    }

    /// Minimal event list that rebuilds this snapshot (apart from `version`).
    pub fn to_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        // oldest chunk first; each later chunk lands in front of the ones
        // before it, which reproduces the newest-first order exactly
        for chunk in self.reservations.chunks(COMPACT_CHUNK).rev() {
            events.push(Event::ReservationsCreated {
                reservations: chunk.to_vec(),
            });
        }
        let lab = &self.lab;
        if *lab != LabConfig::default() {
            events.push(Event::WeeklyScheduleUpdated {
                schedule: lab.schedule.clone(),
                at: lab.last_update,
            });
            events.push(Event::LabStatusChanged {
                status: lab.status,
                special_alert: lab.special_alert.clone(),
                at: lab.last_update,
            });
        }
        if !self.daily_schedules.is_empty() {
            events.push(Event::DailySchedulesSet {
                schedules: self.daily_schedules.values().cloned().collect(),
                at: lab.last_update,
            });
        }
        events
    }
}
