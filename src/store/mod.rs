mod error;
mod journal;
mod snapshot;

pub use error::StoreError;
pub use journal::{Journal, MemoryJournal, WalJournal};
pub use snapshot::Snapshot;

use std::path::Path;
use std::sync::{Arc, RwLock, Weak};

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::model::{Event, Reservation};
use crate::notify::{NotifyHub, Topic};
use crate::observability;
use crate::wal::Wal;

/// Owns the current snapshot. Every change goes through `commit`, which
/// journals the event before readers can see it.
pub struct Store {
    shared: RwLock<Arc<Snapshot>>,
    journal: Arc<dyn Journal>,
    notify: NotifyHub,
    commit_lock: Mutex<()>,
}

impl Store {
    /// Replay the WAL at `path`, cut off any torn tail, and start its writer
    /// task. Must be called inside a tokio runtime.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let (wal, events) = Wal::recover(path)?;
        let store = Self::from_history(Arc::new(WalJournal::spawn(wal)), &events);
        info!(
            "replayed {} events from {}, {} reservations",
            events.len(),
            path.display(),
            store.snapshot().reservations().len()
        );
        Ok(store)
    }

    /// A store that forgets everything on drop.
    pub fn in_memory() -> Self {
        Self::from_history(Arc::new(MemoryJournal::new()), &[])
    }

    /// Build a store over `journal`, seeding the snapshot with `history`.
    pub fn from_history(journal: Arc<dyn Journal>, history: &[Event]) -> Self {
        let mut snapshot = Snapshot::default();
        for event in history {
            snapshot.apply(event);
        }
        metrics::gauge!(observability::RESERVATIONS_STORED).set(snapshot.reservations().len() as f64);
        Self {
            shared: RwLock::new(Arc::new(snapshot)),
            journal,
            notify: NotifyHub::new(),
            commit_lock: Mutex::new(()),
        }
    }

    /// The latest committed state.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        match self.shared.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish(&self, next: Arc<Snapshot>) {
        match self.shared.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Journal `event`, then apply it and notify listeners. On a journal
    /// failure the snapshot is untouched.
    pub async fn commit(&self, event: Event) -> Result<Arc<Snapshot>, StoreError> {
        let _guard = self.commit_lock.lock().await;
        self.journal.append(&event).await?;

        let mut next = Snapshot::clone(&self.snapshot());
        next.apply(&event);
        let next = Arc::new(next);
        self.publish(next.clone());

        metrics::gauge!(observability::RESERVATIONS_STORED).set(next.reservations().len() as f64);
        debug!("committed {} (version {})", observability::event_label(&event), next.version());
        self.notify.send(event.topic(), &event);
        Ok(next)
    }

    /// Start an all-or-nothing group of reservation records.
    pub fn batch(&self) -> WriteBatch<'_> {
        WriteBatch {
            store: self,
            reservations: Vec::new(),
        }
    }

    /// Raw event stream for `topic`.
    pub fn listen(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.notify.subscribe(topic)
    }

    /// Call `callback` now with the current snapshot, then again after every
    /// change on `topic`, until the returned handle is dropped. Must be
    /// called inside a tokio runtime.
    pub fn subscribe<F>(self: &Arc<Self>, topic: Topic, mut callback: F) -> Subscription
    where
        F: FnMut(Arc<Snapshot>) + Send + 'static,
    {
        let mut rx = self.notify.subscribe(topic);
        callback(self.snapshot());
        let store: Weak<Store> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let Some(store) = store.upgrade() else { break };
                callback(store.snapshot());
            }
        });
        Subscription { task }
    }

    /// Rewrite the journal as the minimal history of the current snapshot.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _guard = self.commit_lock.lock().await;
        let events = self.snapshot().to_events();
        let count = events.len();
        self.journal.compact(events).await?;
        info!("journal compacted to {count} events");
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        self.journal.appends_since_compact().await
    }
}

/// Reservation records written together or not at all.
pub struct WriteBatch<'a> {
    store: &'a Store,
    reservations: Vec<Reservation>,
}

impl WriteBatch<'_> {
    pub fn add(&mut self, reservation: Reservation) -> &mut Self {
        self.reservations.push(reservation);
        self
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    /// Persist every added record as one journal entry. Returns the records
    /// written; an empty batch writes nothing.
    pub async fn commit(self) -> Result<Vec<Reservation>, StoreError> {
        if self.reservations.is_empty() {
            return Ok(Vec::new());
        }
        let event = Event::ReservationsCreated {
            reservations: self.reservations.clone(),
        };
        self.store.commit(event).await?;
        Ok(self.reservations)
    }
}

/// Live subscription handle. Dropping it stops delivery.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
