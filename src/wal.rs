use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::model::Event;

/// Largest bincode payload a record may carry. A length prefix above this
/// is treated as a corrupt tail rather than an allocation request.
pub const MAX_RECORD_LEN: u32 = 16 << 20;

/// Bytes a record adds around its payload: length prefix and CRC.
const FRAME_OVERHEAD: u64 = 8;

/// Append one `[len][bincode][crc32]` record to `buf`. Nothing is written
/// when the event does not encode or is too large.
fn encode_record(buf: &mut Vec<u8>, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_RECORD_LEN)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("record of {} bytes exceeds the WAL limit", payload.len()),
            )
        })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(())
}

/// Outcome of reading a log: every intact record, and the byte length of
/// the prefix they occupy. Anything past `valid_len` is a torn or corrupt
/// tail.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    pub valid_len: u64,
}

/// Read records until the input ends or a record fails to read, check or
/// decode.
pub fn read_records(mut reader: impl Read) -> io::Result<Replay> {
    let mut replay = Replay::default();
    loop {
        let mut len_buf = [0u8; 4];
        if !read_or_eof(&mut reader, &mut len_buf)? {
            break;
        }
        let len = u32::from_le_bytes(len_buf);
        if len > MAX_RECORD_LEN {
            warn!("WAL record {} claims {len} bytes, ignoring tail", replay.events.len());
            break;
        }

        let mut payload = vec![0u8; len as usize];
        let mut crc_buf = [0u8; 4];
        if !read_or_eof(&mut reader, &mut payload)? || !read_or_eof(&mut reader, &mut crc_buf)? {
            break;
        }
        if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
            warn!("WAL record {} fails its checksum, ignoring tail", replay.events.len());
            break;
        }
        match bincode::deserialize::<Event>(&payload) {
            Ok(event) => replay.events.push(event),
            Err(e) => {
                warn!("WAL record {} does not decode ({e}), ignoring tail", replay.events.len());
                break;
            }
        }
        replay.valid_len += FRAME_OVERHEAD + u64::from(len);
    }
    Ok(replay)
}

/// `Ok(false)` when the input ends before `buf` is full.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Storage under a `Wal`. Writes always land at the end of the file.
pub trait LogFile: Send {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
    fn size(&self) -> io::Result<u64>;
    /// Cut the file back to `len` bytes and make that durable.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    /// Atomically replace the whole file with `contents`. On error the old
    /// contents stay in place.
    fn replace(&mut self, contents: &[u8]) -> io::Result<()>;
}

/// A `LogFile` on the local filesystem, opened in append mode.
pub struct DiskFile {
    file: File,
    path: PathBuf,
}

impl DiskFile {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogFile for DiskFile {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)?;
        self.file.sync_all()
    }

    fn replace(&mut self, contents: &[u8]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(contents)?;
            tmp.sync_all()?;
        }
        // the handle follows the inode through the rename
        let reopened = OpenOptions::new().append(true).open(&tmp_path)?;
        fs::rename(&tmp_path, &self.path)?;
        self.file = reopened;
        Ok(())
    }
}

/// Append-only journal of lab events.
///
/// Each record is `[u32 len][bincode Event][u32 crc32]`, `len` counting the
/// payload only. A multi-date reservation group is one record, so it replays
/// whole or not at all.
///
/// Appends are staged in memory and reach the file in `flush_sync`. The file
/// never keeps bytes past the last successful sync: a failed flush cuts them
/// off again, and if even that fails the log is poisoned and refuses all
/// further writes.
pub struct Wal<F = DiskFile> {
    file: F,
    staged: Vec<u8>,
    staged_records: u64,
    durable_len: u64,
    appends_since_compact: u64,
    poisoned: bool,
}

impl Wal {
    /// Open the log at `path`, dropping any torn tail. Returns the log ready
    /// for appends together with the events it already holds.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let replay = Self::replay(path)?;
        let mut file = DiskFile::open(path)?;
        let len = file.size()?;
        if len > replay.valid_len {
            warn!(
                "WAL {}: cutting {} bytes of torn tail after {} events",
                path.display(),
                len - replay.valid_len,
                replay.events.len()
            );
            file.truncate(replay.valid_len)?;
        }
        Ok((Self::with_file(file)?, replay.events))
    }

    /// Open (or create) the log at `path` for appending.
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::recover(path).map(|(wal, _)| wal)
    }

    /// Read every intact record of the log at `path`. A missing file is an
    /// empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        match File::open(path) {
            Ok(file) => read_records(BufReader::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Replay::default()),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl<F: LogFile> Wal<F> {
    /// Wrap a file whose current contents are all intact records.
    pub fn with_file(file: F) -> io::Result<Self> {
        let durable_len = file.size()?;
        Ok(Self {
            file,
            staged: Vec::new(),
            staged_records: 0,
            durable_len,
            appends_since_compact: 0,
            poisoned: false,
        })
    }

    fn writable(&self) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other("WAL is poisoned after a failed rollback"));
        }
        Ok(())
    }

    /// Append one event and sync it.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Stage an event for the next `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        self.writable()?;
        encode_record(&mut self.staged, event)?;
        self.staged_records += 1;
        Ok(())
    }

    /// Forget everything staged since the last flush.
    pub fn discard_staged(&mut self) {
        self.staged.clear();
        self.staged_records = 0;
    }

    /// Write the staged records and sync. On failure the file is cut back
    /// to its last durable length and the staged records are dropped.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writable()?;
        if self.staged.is_empty() {
            return Ok(());
        }
        let written = self
            .file
            .append(&self.staged)
            .and_then(|()| self.file.sync());
        match written {
            Ok(()) => {
                self.durable_len += self.staged.len() as u64;
                self.appends_since_compact += self.staged_records;
                self.discard_staged();
                Ok(())
            }
            Err(e) => {
                self.discard_staged();
                self.roll_back();
                Err(e)
            }
        }
    }

    fn roll_back(&mut self) {
        if let Err(e) = self.file.truncate(self.durable_len) {
            error!("WAL rollback to {} bytes failed: {e}", self.durable_len);
            self.poisoned = true;
        }
    }

    /// Replace the log with exactly `events`.
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        self.writable()?;
        let mut contents = Vec::new();
        for event in events {
            encode_record(&mut contents, event)?;
        }
        self.file.replace(&contents)?;
        self.durable_len = contents.len() as u64;
        self.appends_since_compact = 0;
        Ok(())
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::engine::tests::record;
    use crate::model::{Classroom, ReservationStatus};
    use crate::schedule::LabStatus;
    use chrono::NaiveDate;
    use ulid::Ulid;

    /// In-memory `LogFile` whose sync and truncate can be made to fail.
    /// Clones share the same contents.
    #[derive(Clone, Default)]
    pub(crate) struct FlakyFile {
        state: Arc<Mutex<FlakyState>>,
    }

    #[derive(Default)]
    struct FlakyState {
        bytes: Vec<u8>,
        fail_sync: bool,
        fail_truncate: bool,
    }

    impl FlakyFile {
        pub(crate) fn bytes(&self) -> Vec<u8> {
            self.state.lock().unwrap().bytes.clone()
        }

        pub(crate) fn fail_sync(&self, fail: bool) {
            self.state.lock().unwrap().fail_sync = fail;
        }

        pub(crate) fn fail_truncate(&self, fail: bool) {
            self.state.lock().unwrap().fail_truncate = fail;
        }
    }

    impl LogFile for FlakyFile {
        fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.state.lock().unwrap().bytes.extend_from_slice(bytes);
            Ok(())
        }

        fn sync(&mut self) -> io::Result<()> {
            if self.state.lock().unwrap().fail_sync {
                return Err(io::Error::other("EIO on fsync"));
            }
            Ok(())
        }

        fn size(&self) -> io::Result<u64> {
            Ok(self.state.lock().unwrap().bytes.len() as u64)
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            let mut state = self.state.lock().unwrap();
            if state.fail_truncate {
                return Err(io::Error::other("EIO on truncate"));
            }
            state.bytes.truncate(len as usize);
            Ok(())
        }

        fn replace(&mut self, contents: &[u8]) -> io::Result<()> {
            self.state.lock().unwrap().bytes = contents.to_vec();
            Ok(())
        }
    }

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("labdesk_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn created(n: usize) -> Event {
        let date = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        Event::ReservationsCreated {
            reservations: (0..n)
                .map(|_| record(date, Classroom::LabComp, "13:30", "14:30", ReservationStatus::Pending))
                .collect(),
        }
    }

    fn status(at: i64) -> Event {
        Event::LabStatusChanged {
            status: LabStatus::Open,
            special_alert: String::new(),
            at,
        }
    }

    fn append_raw(path: &Path, bytes: &[u8]) {
        let mut f = OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(bytes).unwrap();
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let events = vec![
            created(3),
            Event::ReservationApproved {
                id: Ulid::new(),
                approved_by: "admin".into(),
                at: 1000,
            },
        ];

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, events);
        assert_eq!(replay.valid_len, fs::metadata(&path).unwrap().len());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_stops_at_truncation() {
        let path = tmp_path("truncation.wal");
        let event = created(1);
        Wal::open(&path).unwrap().append(&event).unwrap();
        let intact = fs::metadata(&path).unwrap().len();

        // partial length prefix plus a few bytes
        append_raw(&path, &[0u8; 6]);

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![event]);
        assert_eq!(replay.valid_len, intact);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn torn_group_record_is_dropped_whole() {
        let payload = bincode::serialize(&created(3)).unwrap();
        let mut bytes = (payload.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&payload[..payload.len() / 2]);

        let replay = read_records(&bytes[..]).unwrap();
        assert!(replay.events.is_empty());
        assert_eq!(replay.valid_len, 0);
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.wal");
        let replay = Wal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
        assert_eq!(replay.valid_len, 0);
    }

    #[test]
    fn corrupt_crc_ends_replay() {
        let payload = bincode::serialize(&status(1)).unwrap();
        let mut bytes = (payload.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&payload);
        bytes.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());

        assert!(read_records(&bytes[..]).unwrap().events.is_empty());
    }

    #[test]
    fn oversized_length_prefix_is_a_corrupt_tail() {
        let mut bytes = Vec::new();
        encode_record(&mut bytes, &status(1)).unwrap();
        let intact = bytes.len() as u64;
        // a flipped high bit in the next prefix
        bytes.extend_from_slice(&(MAX_RECORD_LEN + 1).to_le_bytes());
        bytes.extend_from_slice(&[7u8; 32]);

        let replay = read_records(&bytes[..]).unwrap();
        assert_eq!(replay.events, vec![status(1)]);
        assert_eq!(replay.valid_len, intact);
    }

    #[test]
    fn recover_cuts_torn_tail_so_later_appends_survive() {
        let path = tmp_path("recover_tail.wal");
        Wal::open(&path).unwrap().append(&status(1)).unwrap();
        append_raw(&path, &[9u8; 7]);

        {
            let (mut wal, events) = Wal::recover(&path).unwrap();
            assert_eq!(events, vec![status(1)]);
            wal.append(&status(2)).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap().events, vec![status(1), status(2)]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_reduces_wal() {
        let path = tmp_path("compact_reduce.wal");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&created(2)).unwrap();
            for at in 0..20 {
                wal.append(&status(at)).unwrap();
            }
        }

        let before = fs::metadata(&path).unwrap().len();
        let compacted = vec![created(2), status(19)];
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.compact(&compacted).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
        }

        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted WAL should be smaller: {after} < {before}");
        assert_eq!(Wal::replay(&path).unwrap().events, compacted);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_then_append() {
        let path = tmp_path("compact_append.wal");
        let compacted = vec![status(1)];
        let new_event = created(1);

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&compacted[0]).unwrap();
            wal.compact(&compacted).unwrap();
            wal.append(&new_event).unwrap();
        }

        assert_eq!(
            Wal::replay(&path).unwrap().events,
            vec![compacted[0].clone(), new_event]
        );
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn staged_appends_count_once_synced() {
        let file = FlakyFile::default();
        let mut wal = Wal::with_file(file.clone()).unwrap();
        let events: Vec<Event> = (0..5).map(status).collect();

        for e in &events {
            wal.append_buffered(e).unwrap();
        }
        assert_eq!(wal.appends_since_compact(), 0);
        assert!(file.bytes().is_empty());

        wal.flush_sync().unwrap();
        assert_eq!(wal.appends_since_compact(), 5);
        assert_eq!(read_records(&file.bytes()[..]).unwrap().events, events);
    }

    #[test]
    fn failed_sync_leaves_no_bytes_behind() {
        let file = FlakyFile::default();
        let mut wal = Wal::with_file(file.clone()).unwrap();
        wal.append(&status(1)).unwrap();
        let durable = file.bytes();

        file.fail_sync(true);
        wal.append_buffered(&created(3)).unwrap();
        assert!(wal.flush_sync().is_err());
        assert_eq!(file.bytes(), durable);
        assert_eq!(wal.appends_since_compact(), 1);

        file.fail_sync(false);
        wal.append(&status(2)).unwrap();
        assert_eq!(
            read_records(&file.bytes()[..]).unwrap().events,
            vec![status(1), status(2)]
        );
    }

    #[test]
    fn failed_rollback_poisons_the_log() {
        let file = FlakyFile::default();
        let mut wal = Wal::with_file(file.clone()).unwrap();
        file.fail_sync(true);
        file.fail_truncate(true);

        assert!(wal.append(&status(1)).is_err());
        assert!(wal.is_poisoned());

        file.fail_sync(false);
        file.fail_truncate(false);
        assert!(wal.append_buffered(&status(2)).is_err());
        assert!(wal.compact(&[status(3)]).is_err());
    }
}
