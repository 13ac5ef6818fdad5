use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::mpsc;
use ulid::Ulid;

use labdesk::config::Settings;
use labdesk::engine::{available_slots, Engine, EngineError};
use labdesk::model::*;
use labdesk::notify::Topic;
use labdesk::schedule::LabStatus;
use labdesk::store::Store;

// ── Test infrastructure ──────────────────────────────────────

/// 2025-08-25 15:00 UTC.
fn fixed_now() -> Ms {
    1_756_134_000_000
}

fn test_wal_path() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("labdesk_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("labdesk.wal")
}

fn open_engine(path: &Path) -> Engine {
    let store = Arc::new(Store::open(path).unwrap());
    Engine::with_clock(store, Settings::default(), fixed_now)
}

fn d(day: u32) -> Date {
    NaiveDate::from_ymd_opt(2025, 9, day).unwrap()
}

fn request(dates: Vec<Date>) -> ReservationRequest {
    ReservationRequest {
        user_email: "carlos@docente.uefs.br".into(),
        user_name: "Carlos Lima".into(),
        user_type: UserType::Professor,
        subject: Some("TEC 499 Networks Lab".into()),
        course: Some("Computer Engineering".into()),
        classroom: Some(Classroom::LabComp),
        when: DateSpec::SpecificDates { dates },
        start_time: TimeOfDay::hm(14, 0),
        end_time: TimeOfDay::hm(16, 0),
        observations: Some("needs Wireshark".into()),
        semester: None,
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn reopen_restores_state() {
    let path = test_wal_path();
    let (group, approved_id) = {
        let engine = open_engine(&path);
        let group = engine.create_reservation(request(vec![d(2), d(9), d(16)])).await.unwrap();
        engine.department_confirm(group[0].id, "dexa@uefs.br").await.unwrap();
        engine.set_lab_status(LabStatus::Open, "").await.unwrap();
        engine.generate_month_schedules(2025, 9).await.unwrap();
        let approved_id = group[0].id;
        (group, approved_id)
    };

    let engine = open_engine(&path);
    let snap = engine.snapshot();
    assert_eq!(snap.reservations().len(), 3);
    for r in &group {
        assert!(snap.reservation(&r.id).is_some());
    }
    assert_eq!(
        snap.reservation(&approved_id).unwrap().status,
        ReservationStatus::Approved
    );
    assert_eq!(snap.lab().status, LabStatus::Open);
    assert_eq!(snap.daily_schedules().len(), 22);

    let free = available_slots(snap.reservations(), d(2), Classroom::LabComp);
    assert_eq!(free.len(), 26);
}

#[tokio::test]
async fn compaction_survives_reopen() {
    let path = test_wal_path();
    let before = {
        let engine = open_engine(&path);
        for day in [2, 3, 4] {
            let created = engine.create_pending_reservation(request(vec![d(day)])).await.unwrap();
            engine.reject(created[0].id, "admin", "room booked for exams").await.unwrap();
        }
        let size_before = std::fs::metadata(&path).unwrap().len();
        engine.compact().await.unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() < size_before);
        engine.snapshot().reservations().to_vec()
    };

    let engine = open_engine(&path);
    assert_eq!(engine.snapshot().reservations(), before.as_slice());
}

#[tokio::test]
async fn torn_group_write_replays_to_nothing() {
    let path = test_wal_path();
    {
        let engine = open_engine(&path);
        engine.create_reservation(request(vec![d(2)])).await.unwrap();
    }

    // a three-record group cut off mid-write
    let group: Vec<Reservation> = {
        let scratch = Engine::with_clock(Arc::new(Store::in_memory()), Settings::default(), fixed_now);
        scratch.create_reservation(request(vec![d(9), d(16), d(23)])).await.unwrap()
    };
    let payload = bincode::serialize(&Event::ReservationsCreated { reservations: group }).unwrap();
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
        f.write_all(&payload[..payload.len() - 10]).unwrap();
    }

    let engine = open_engine(&path);
    let snap = engine.snapshot();
    assert_eq!(snap.reservations().len(), 1);
    assert_eq!(snap.reservations()[0].dates, vec![d(2)]);
}

#[tokio::test]
async fn writes_after_a_torn_tail_survive_the_next_restart() {
    let path = test_wal_path();
    let first = {
        let engine = open_engine(&path);
        engine.create_reservation(request(vec![d(2)])).await.unwrap()[0].id
    };
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[0x2a, 0, 0, 0, 1, 2, 3]).unwrap();
    }

    let group: Vec<ReservationId> = {
        let engine = open_engine(&path);
        assert_eq!(engine.snapshot().reservations().len(), 1);
        let created = engine.create_reservation(request(vec![d(9), d(16)])).await.unwrap();
        created.iter().map(|r| r.id).collect()
    };

    let engine = open_engine(&path);
    let snap = engine.snapshot();
    assert_eq!(snap.reservations().len(), 3);
    assert!(snap.reservation(&first).is_some());
    for id in &group {
        assert!(snap.reservation(id).is_some(), "acknowledged reservation {id} lost");
    }
}

#[tokio::test]
async fn subscription_sees_engine_commits() {
    let path = test_wal_path();
    let engine = open_engine(&path);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let sub = engine.store().subscribe(Topic::Reservations, move |snap| {
        let _ = tx.send(snap.reservations().len());
    });
    assert_eq!(rx.recv().await, Some(0));

    engine.create_reservation(request(vec![d(2), d(9)])).await.unwrap();
    let seen = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
    assert_eq!(seen, Some(2));

    drop(sub);
    engine.create_reservation(request(vec![d(16)])).await.unwrap();
    let after = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(!matches!(after, Ok(Some(_))));
}

#[tokio::test]
async fn concurrent_overlapping_approvals_admit_one() {
    let path = test_wal_path();
    let engine = Arc::new(open_engine(&path));
    let a = engine.create_reservation(request(vec![d(2)])).await.unwrap()[0].id;
    let b = engine.create_reservation(request(vec![d(2)])).await.unwrap()[0].id;

    let (ra, rb) = futures::join!(engine.approve(a, "admin-1"), engine.approve(b, "admin-2"));
    let results = [ra, rb];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(r, Err(EngineError::Conflict { .. }))));

    let snap = engine.snapshot();
    let approved = snap
        .reservations()
        .iter()
        .filter(|r| r.status == ReservationStatus::Approved)
        .count();
    assert_eq!(approved, 1);
}
