use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use labdesk::config::Settings;
use labdesk::engine::Engine;
use labdesk::model::Event;
use labdesk::notify::Topic;
use labdesk::store::Store;
use labdesk::{background, observability};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let settings = Settings::from_env();
    observability::init(settings.metrics_port)?;

    std::fs::create_dir_all(&settings.data_dir)?;
    let store = Arc::new(Store::open(&settings.wal_path())?);

    info!("labdesk starting");
    info!("  data_dir: {}", settings.data_dir.display());
    info!("  semester: {}", settings.current_semester);
    info!("  conflict_policy: {:?}", settings.conflict_policy);
    info!("  utc_offset_minutes: {}", settings.utc_offset_minutes);
    info!(
        "  metrics: {}",
        settings
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let compact_threshold = settings.compact_threshold;
    let engine = Arc::new(Engine::new(store.clone(), settings));
    tokio::spawn(background::run_compactor(engine.clone(), compact_threshold));
    tokio::spawn(background::run_status_ticker(engine.clone()));

    let _reservations = store.subscribe(Topic::Reservations, |snap| {
        let pending = labdesk::engine::pending_notifications(snap.reservations(), usize::MAX).len();
        info!(
            "reservations: {} stored, {pending} pending",
            snap.reservations().len()
        );
    });
    let _lab = store.subscribe(Topic::Lab, |snap| {
        let lab = snap.lab();
        info!(
            "lab: {} ({} daily overrides) {}",
            lab.status,
            snap.daily_schedules().len(),
            lab.special_alert
        );
    });
    tokio::spawn(log_events(store.listen(Topic::Reservations)));
    tokio::spawn(log_events(store.listen(Topic::Lab)));

    // Graceful shutdown on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("shutdown signal received, compacting journal");
    if let Err(e) = engine.compact().await {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("labdesk stopped");
    Ok(())
}

/// Debug-log every committed event as JSON.
async fn log_events(mut rx: tokio::sync::broadcast::Receiver<Event>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => tracing::debug!("event {}: {json}", observability::event_label(&event)),
                Err(e) => tracing::warn!("unserializable event: {e}"),
            },
            Err(RecvError::Lagged(n)) => tracing::warn!("event log lagged by {n} events"),
            Err(RecvError::Closed) => break,
        }
    }
}
