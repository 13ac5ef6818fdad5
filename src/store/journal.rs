use std::io;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::model::Event;
use crate::observability;
use crate::wal::{LogFile, Wal};

use super::StoreError;

/// Durable sink for committed events. An `append` that returns `Ok` must
/// survive a restart; one that returns `Err` must leave nothing behind.
#[async_trait]
pub trait Journal: Send + Sync {
    async fn append(&self, event: &Event) -> Result<(), StoreError>;

    /// Replace the journal contents with `events`.
    async fn compact(&self, events: Vec<Event>) -> Result<(), StoreError>;

    async fn appends_since_compact(&self) -> u64 {
        0
    }
}

/// Keeps events in memory only. Used for tests and throwaway stores.
#[derive(Default)]
pub struct MemoryJournal {
    events: Mutex<Vec<Event>>,
    appends: Mutex<u64>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn append(&self, event: &Event) -> Result<(), StoreError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| StoreError::Io("memory journal poisoned".into()))?;
        events.push(event.clone());
        if let Ok(mut n) = self.appends.lock() {
            *n += 1;
        }
        Ok(())
    }

    async fn compact(&self, compacted: Vec<Event>) -> Result<(), StoreError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| StoreError::Io("memory journal poisoned".into()))?;
        *events = compacted;
        if let Ok(mut n) = self.appends.lock() {
            *n = 0;
        }
        Ok(())
    }

    async fn appends_since_compact(&self) -> u64 {
        self.appends.lock().map(|n| *n).unwrap_or(0)
    }
}

// ── Group-commit WAL journal ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Journal backed by the on-disk WAL. A background task owns the file and
/// batches concurrent appends into one fsync. Once the log is poisoned the
/// task exits and every later call fails with `StoreError::WriterGone`.
pub struct WalJournal {
    tx: mpsc::Sender<WalCommand>,
}

impl WalJournal {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn spawn<F: LogFile + 'static>(wal: Wal<F>) -> Self {
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, rx));
        Self { tx }
    }

    async fn request<T>(&self, cmd: WalCommand, rx: oneshot::Receiver<T>) -> Result<T, StoreError> {
        self.tx.send(cmd).await.map_err(|_| StoreError::WriterGone)?;
        rx.await.map_err(|_| StoreError::WriterGone)
    }
}

#[async_trait]
impl Journal for WalJournal {
    async fn append(&self, event: &Event) -> Result<(), StoreError> {
        let (response, rx) = oneshot::channel();
        let cmd = WalCommand::Append {
            event: event.clone(),
            response,
        };
        Ok(self.request(cmd, rx).await??)
    }

    async fn compact(&self, events: Vec<Event>) -> Result<(), StoreError> {
        let (response, rx) = oneshot::channel();
        Ok(self.request(WalCommand::Compact { events, response }, rx).await??)
    }

    async fn appends_since_compact(&self) -> u64 {
        let (response, rx) = oneshot::channel();
        self.request(WalCommand::AppendsSinceCompact { response }, rx)
            .await
            .unwrap_or(0)
    }
}

type Pending = (Event, oneshot::Sender<io::Result<()>>);

/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued (the batch window).
/// 3. One flush_sync for the whole batch, then answer every sender.
async fn wal_writer_loop<F: LogFile>(mut wal: Wal<F>, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
        if wal.is_poisoned() {
            tracing::error!("WAL writer stopping, the log can no longer be trusted");
            return;
        }
    }
    tracing::debug!("WAL writer stopped");
}

fn commit_batch<F: LogFile>(wal: &mut Wal<F>, batch: &mut Vec<Pending>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for {} events: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

/// All of the batch reaches the file, or none of it does.
fn flush_batch<F: LogFile>(wal: &mut Wal<F>, batch: &[Pending]) -> io::Result<()> {
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            wal.discard_staged();
            return Err(e);
        }
    }
    wal.flush_sync()
}

fn handle_non_append<F: LogFile>(wal: &mut Wal<F>, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}
