mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod recurrence;
mod slots;
mod validation;

pub use availability::{available_slots, bookable_slots, day_schedule};
pub use error::{EngineError, ValidationError};
pub use queries::{
    filter_reservations, pending_notifications, recent_actions, reservations_by_date,
    reservations_by_user, reservations_in_group,
};
pub use recurrence::{recurring_dates, resolve_dates};
pub use slots::{
    generate_time_slots, is_slot_aligned, is_weekend, slot_end, slot_grid, weekday_from_index,
    CLOSING, OPENING, SLOT_MINUTES,
};
pub use validation::validate_request;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Settings;
use crate::model::{Date, Ms};
use crate::schedule::{local_date, local_datetime, real_time_status, LabStatus};
use crate::store::{Snapshot, Store};

/// Source of "now" in unix milliseconds.
pub type Clock = fn() -> Ms;

/// Write side of the lab: validates commands, checks transitions and
/// conflicts, and commits events to the store. Reads go through
/// `snapshot()` and the pure query functions of this module.
pub struct Engine {
    store: Arc<Store>,
    settings: Settings,
    clock: Clock,
    /// Serializes read-check-commit sequences so conflict checks see every
    /// earlier approval.
    write_lock: Mutex<()>,
}

impl Engine {
    pub fn new(store: Arc<Store>, settings: Settings) -> Self {
        Self::with_clock(store, settings, conflict::now_ms)
    }

    pub fn with_clock(store: Arc<Store>, settings: Settings, clock: Clock) -> Self {
        Self {
            store,
            settings,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.snapshot()
    }

    pub fn now(&self) -> Ms {
        (self.clock)()
    }

    /// Today's date on the lab's wall clock.
    pub fn today(&self) -> Date {
        local_date(self.now(), self.settings.utc_offset_minutes)
    }

    /// What the lab is doing right now, taking the weekly hours into account.
    pub fn lab_status_now(&self) -> LabStatus {
        let now = local_datetime(self.now(), self.settings.utc_offset_minutes);
        real_time_status(self.snapshot().lab(), now)
    }
}
