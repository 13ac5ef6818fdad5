use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::schedule::LabStatus;

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);
const STATUS_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// One compaction pass: rewrite the journal once it has grown past
/// `threshold` appends. Returns whether it compacted.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.store().appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact().await {
        Ok(()) => {
            info!("compacted journal after {appends} appends");
            true
        }
        Err(e) => {
            warn!("journal compaction failed: {e}");
            false
        }
    }
}

/// Background task that keeps the WAL from growing without bound.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&engine, threshold).await;
    }
}

/// Background task that logs whenever the lab's effective status flips,
/// e.g. when opening hours begin or end.
pub async fn run_status_ticker(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(STATUS_TICK_INTERVAL);
    let mut last: Option<LabStatus> = None;
    loop {
        interval.tick().await;
        let status = engine.lab_status_now();
        if last != Some(status) {
            info!("lab is now {status}");
            last = Some(status);
        } else {
            debug!("lab still {status}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::model::*;
    use crate::store::{MemoryJournal, Store};
    use chrono::NaiveDate;

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let journal = Arc::new(MemoryJournal::new());
        let store = Arc::new(Store::from_history(journal.clone(), &[]));
        let engine = Engine::with_clock(store, Settings::default(), || 1_756_134_000_000);

        let date = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        let created = engine
            .create_pending_reservation(ReservationRequest {
                user_email: "ana@aluno.uefs.br".into(),
                user_name: "Ana".into(),
                user_type: UserType::Student,
                subject: None,
                course: None,
                classroom: None,
                when: DateSpec::Single { date },
                start_time: TimeOfDay::hm(18, 30),
                end_time: TimeOfDay::hm(19, 30),
                observations: None,
                semester: None,
            })
            .await
            .unwrap();
        engine.approve(created[0].id, "admin").await.unwrap();
        assert_eq!(journal.events().len(), 2);

        assert!(!compact_if_needed(&engine, 3).await);
        assert!(compact_if_needed(&engine, 2).await);
        assert_eq!(journal.events().len(), 1);
        assert_eq!(engine.store().appends_since_compact().await, 0);
    }
}
