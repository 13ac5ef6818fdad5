use std::collections::HashSet;

use chrono::Datelike;

use crate::model::*;
use crate::schedule::operating_window;
use crate::store::Snapshot;

use super::queries::reservations_on;
use super::slots::{is_weekend, slot_end, slot_grid};

// ── Availability ──────────────────────────────────────────────────

fn approved_slots(reservations: &[Reservation], date: Date, classroom: Classroom) -> HashSet<TimeOfDay> {
    reservations_on(reservations, date, Some(classroom))
        .filter(|r| r.status == ReservationStatus::Approved)
        .flat_map(|r| r.time_slots.iter().copied())
        .collect()
}

/// Free grid slots for `classroom` on `date`, in time order.
///
/// Only approved reservations hold slots; pending, rejected and
/// awaiting-confirmation ones do not. Weekends have no slots.
pub fn available_slots(reservations: &[Reservation], date: Date, classroom: Classroom) -> Vec<TimeOfDay> {
    if is_weekend(date) {
        return Vec::new();
    }
    let reserved = approved_slots(reservations, date, classroom);
    slot_grid().into_iter().filter(|s| !reserved.contains(s)).collect()
}

/// Free slots that also fit entirely inside the lab's hours for `date`.
pub fn bookable_slots(snapshot: &Snapshot, date: Date, classroom: Classroom) -> Vec<TimeOfDay> {
    let Some((open, close)) = operating_window(date, &snapshot.lab().schedule, snapshot.daily_schedules()) else {
        return Vec::new();
    };
    available_slots(snapshot.reservations(), date, classroom)
        .into_iter()
        .filter(|s| *s >= open && slot_end(*s) <= close)
        .collect()
}

/// Calendar view of one date: every grid slot per shift, marked with the
/// approved reservation holding it.
pub fn day_schedule(snapshot: &Snapshot, date: Date, classroom: Classroom) -> DaySchedule {
    let on_date: Vec<Reservation> = reservations_on(snapshot.reservations(), date, Some(classroom))
        .cloned()
        .collect();
    let is_open =
        operating_window(date, &snapshot.lab().schedule, snapshot.daily_schedules()).is_some();

    let holder = |slot: TimeOfDay| {
        on_date
            .iter()
            .find(|r| r.status == ReservationStatus::Approved && r.holds_slot(slot))
    };

    let shifts = Shift::ALL
        .iter()
        .map(|&shift| ShiftView {
            shift,
            slots: shift
                .slots()
                .into_iter()
                .map(|start| SlotView {
                    start,
                    end: slot_end(start),
                    state: match holder(start) {
                        Some(r) if !is_weekend(date) => SlotState::Reserved {
                            reservation_id: r.id,
                            reserved_by: r.user_name.clone(),
                            subject: r.subject.clone(),
                        },
                        _ => SlotState::Free,
                    },
                })
                .collect(),
        })
        .collect();

    DaySchedule {
        date,
        weekday: date.weekday(),
        is_open,
        shifts,
        reservations: on_date,
    }
}
