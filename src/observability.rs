use std::net::SocketAddr;

use crate::model::Event;

// ── Request metrics ─────────────────────────────────────────────

/// Counter: reservation records written. Labels: kind.
pub const RESERVATIONS_CREATED_TOTAL: &str = "labdesk_reservations_created_total";

/// Counter: status transitions committed. Labels: to.
pub const STATUS_TRANSITIONS_TOTAL: &str = "labdesk_status_transitions_total";

/// Counter: requests refused by validation. Labels: operation.
pub const VALIDATION_FAILURES_TOTAL: &str = "labdesk_validation_failures_total";

/// Counter: approvals refused because the slot is already approved for someone else.
pub const CONFLICTS_TOTAL: &str = "labdesk_conflicts_total";

/// Histogram: mutation latency in seconds. Labels: operation.
pub const MUTATION_DURATION_SECONDS: &str = "labdesk_mutation_duration_seconds";

// ── Storage metrics ─────────────────────────────────────────────

/// Gauge: reservation records in the current snapshot.
pub const RESERVATIONS_STORED: &str = "labdesk_reservations_stored";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "labdesk_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "labdesk_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "labdesk_wal_compactions_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for an event, for logs and metrics.
pub fn event_label(event: &Event) -> &'static str {
    match event {
        Event::ReservationsCreated { .. } => "reservations_created",
        Event::ConfirmationRequested { .. } => "confirmation_requested",
        Event::ReservationApproved { .. } => "reservation_approved",
        Event::ReservationRejected { .. } => "reservation_rejected",
        Event::DepartmentConfirmed { .. } => "department_confirmed",
        Event::LabStatusChanged { .. } => "lab_status_changed",
        Event::WeeklyScheduleUpdated { .. } => "weekly_schedule_updated",
        Event::DailySchedulesSet { .. } => "daily_schedules_set",
        Event::DailyScheduleRemoved { .. } => "daily_schedule_removed",
    }
}
