use chrono::{Datelike, Weekday};

use crate::model::{Date, Shift, TimeOfDay};

/// Every slot is half an hour, named by its start time.
pub const SLOT_MINUTES: u16 = 30;

/// First slot start of the day.
pub const OPENING: TimeOfDay = TimeOfDay::hm(7, 30);
/// End of the last slot of the day.
pub const CLOSING: TimeOfDay = TimeOfDay::hm(23, 30);

const SLOTS_PER_SHIFT: u16 = 10;

impl Shift {
    pub const ALL: [Shift; 3] = [Shift::Morning, Shift::Afternoon, Shift::Evening];

    pub fn first_slot(self) -> TimeOfDay {
        match self {
            Shift::Morning => TimeOfDay::hm(7, 30),
            Shift::Afternoon => TimeOfDay::hm(13, 30),
            Shift::Evening => TimeOfDay::hm(18, 30),
        }
    }

    /// End of the shift's last slot.
    pub fn end(self) -> TimeOfDay {
        TimeOfDay::hm(0, self.first_slot().minutes() + SLOTS_PER_SHIFT * SLOT_MINUTES)
    }

    /// Ordered slot labels of the shift.
    pub fn slots(self) -> Vec<TimeOfDay> {
        generate_time_slots(self.first_slot(), self.end())
    }
}

/// Slot labels in `[start, end)`, stepping by 30 minutes. Empty when
/// `end <= start`.
pub fn generate_time_slots(start: TimeOfDay, end: TimeOfDay) -> Vec<TimeOfDay> {
    let mut slots = Vec::new();
    let mut current = start;
    while current < end {
        slots.push(current);
        match current.checked_add_minutes(SLOT_MINUTES) {
            Some(next) => current = next,
            None => break,
        }
    }
    slots
}

/// The full grid: morning, afternoon and evening slots in time order.
pub fn slot_grid() -> Vec<TimeOfDay> {
    Shift::ALL.iter().flat_map(|shift| shift.slots()).collect()
}

pub fn is_slot_aligned(t: TimeOfDay) -> bool {
    t.minutes() % SLOT_MINUTES == 0
}

/// End time of the slot that starts at `slot`.
pub fn slot_end(slot: TimeOfDay) -> TimeOfDay {
    slot.checked_add_minutes(SLOT_MINUTES).unwrap_or(slot)
}

pub fn is_weekend(date: Date) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// 0 = Sunday .. 6 = Saturday.
pub fn weekday_from_index(index: u8) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}
