//! Durable journal of pending sync tasks.
//!
//! On-disk format, one frame per task:
//!
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized SyncTask)]
//! ```
//!
//! Offsets handed out by [`TaskJournal::append`] are logical: they keep
//! counting across truncations, so an acknowledgement stays valid after
//! earlier frames have been dropped from the file.
//!
//! A journal has a single owner. [`TaskJournal::open`] takes an exclusive
//! advisory lock on a sibling `.lock` file and fails with
//! [`SyncError::JournalInUse`] while another handle, in this process or
//! another, holds it.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fd_lock::RwLock;
use lingo_types::SyncTask;
use tracing::{debug, warn};

use crate::error::{poisoned, SyncError, SyncResult};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: u64 = 8;

/// Acknowledged bytes at the head of the file before it is rewritten.
pub const CHECKPOINT_BYTES: u64 = 64 * 1024;

/// Logical position of a frame in the journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JournalOffset(pub u64);

impl fmt::Display for JournalOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct JournalState {
    writer: BufWriter<File>,
    /// Logical offset of the first byte currently in the file.
    base: u64,
    /// Logical offset one past the last byte written.
    end: u64,
    /// Frames appended (or recovered) but not yet acknowledged.
    pending: BTreeSet<u64>,
}

/// Append-only, crash-recoverable journal of sync tasks.
///
/// A task is appended before it is handed to the worker and acknowledged
/// after the worker has applied it. Once nothing is pending the file is
/// emptied in place; otherwise the acknowledged prefix is cut only after it
/// grows past the checkpoint threshold, so a backlog is not rewritten on
/// every ack. Frames failing the CRC are skipped on recovery; a torn frame
/// at the tail is discarded.
pub struct TaskJournal {
    path: PathBuf,
    state: Mutex<JournalState>,
    checkpoint_bytes: u64,
    /// Held write-locked for the lifetime of the journal.
    _owner: RwLock<File>,
}

impl TaskJournal {
    /// Open (or create) the journal at `path`.
    ///
    /// Frames already in the file become pending; a torn tail left by a
    /// crash is truncated away so new frames start on a clean boundary.
    pub fn open(path: &Path) -> SyncResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let owner = lock_owner(path)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let scan = scan_frames(path)?;
        if scan.valid_len < file.metadata()?.len() {
            warn!(
                path = %path.display(),
                valid_len = scan.valid_len,
                "discarding torn journal tail"
            );
            file.set_len(scan.valid_len)?;
        }

        let pending: BTreeSet<u64> = scan.frames.iter().map(|(offset, _)| *offset).collect();
        debug!(path = %path.display(), pending = pending.len(), "opened task journal");

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(JournalState {
                writer: BufWriter::new(file),
                base: 0,
                end: scan.valid_len,
                pending,
            }),
            checkpoint_bytes: CHECKPOINT_BYTES,
            _owner: owner,
        })
    }

    /// Rewrite the file once this many acknowledged bytes precede the first
    /// pending frame. Defaults to [`CHECKPOINT_BYTES`].
    pub fn with_checkpoint_bytes(mut self, bytes: u64) -> Self {
        self.checkpoint_bytes = bytes.max(1);
        self
    }

    /// Append `task` and flush it to the file. Returns its logical offset.
    pub fn append(&self, task: &SyncTask) -> SyncResult<JournalOffset> {
        let payload =
            bincode::serialize(task).map_err(|e| SyncError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| SyncError::Serialization("task frame exceeds u32 length".into()))?;
        let crc = crc32fast::hash(&payload);

        let mut state = self.state.lock().map_err(poisoned)?;
        let offset = state.end;

        state.writer.write_all(&length.to_le_bytes())?;
        state.writer.write_all(&crc.to_le_bytes())?;
        state.writer.write_all(&payload)?;
        state.writer.flush()?;

        state.end += HEADER_SIZE + u64::from(length);
        state.pending.insert(offset);

        debug!(offset, len = length, %task, "journal append");
        Ok(JournalOffset(offset))
    }

    /// Acknowledge the frame at `offset` as applied.
    ///
    /// Empties the file when nothing is left pending, and drops a large
    /// enough acknowledged prefix otherwise. A frame that stays pending at
    /// the head holds back the prefix cut until it is acknowledged or the
    /// journal is reopened.
    pub fn ack(&self, offset: JournalOffset) -> SyncResult<()> {
        let mut state = self.state.lock().map_err(poisoned)?;
        if !state.pending.remove(&offset.0) {
            return Err(SyncError::UnknownOffset(offset.0));
        }
        match state.pending.first().copied() {
            None if state.end > state.base => self.reset(&mut state)?,
            Some(watermark) if watermark - state.base >= self.checkpoint_bytes => {
                self.truncate_through(&mut state, watermark)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Every valid, unacknowledged task, in append order.
    pub fn recover(&self) -> SyncResult<Vec<(JournalOffset, SyncTask)>> {
        let state = self.state.lock().map_err(poisoned)?;
        let scan = scan_frames(&self.path)?;
        let tasks: Vec<_> = scan
            .frames
            .into_iter()
            .map(|(physical, task)| (state.base + physical, task))
            .filter(|(offset, _)| state.pending.contains(offset))
            .map(|(offset, task)| (JournalOffset(offset), task))
            .collect();
        debug!(recovered = tasks.len(), "journal recovery complete");
        Ok(tasks)
    }

    /// Number of unacknowledged frames.
    pub fn pending(&self) -> usize {
        self.state.lock().map(|s| s.pending.len()).unwrap_or(0)
    }

    /// Path to the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop every frame by truncating the file in place.
    fn reset(&self, state: &mut JournalState) -> SyncResult<()> {
        state.writer.flush()?;
        state.writer.get_ref().set_len(0)?;
        state.base = state.end;
        debug!(base = state.base, "journal emptied");
        Ok(())
    }

    /// Rewrite the file so it starts at logical offset `through`.
    fn truncate_through(&self, state: &mut JournalState, through: u64) -> SyncResult<()> {
        state.writer.flush()?;
        let physical = through - state.base;

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(physical))?;
        let mut remaining = Vec::new();
        file.read_to_end(&mut remaining)?;
        drop(file);

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::Builder::new().prefix(".journal").tempfile_in(dir)?;
        tmp.write_all(&remaining)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| SyncError::Io(e.error))?;

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        state.writer = BufWriter::new(file);
        state.base = through;

        debug!(through, remaining = remaining.len(), "journal checkpoint");
        Ok(())
    }
}

impl fmt::Debug for TaskJournal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskJournal")
            .field("path", &self.path)
            .field("pending", &self.pending())
            .finish()
    }
}

struct FrameScan {
    /// (physical offset, task) of every frame that passed the CRC check.
    frames: Vec<(u64, SyncTask)>,
    /// Length of the prefix made of complete frames.
    valid_len: u64,
}

/// Take the owner lock next to the journal at `path`.
fn lock_owner(path: &Path) -> SyncResult<RwLock<File>> {
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    let mut owner = RwLock::new(file);
    match owner.try_write() {
        // The lock is released when the file closes with the journal.
        Ok(guard) => std::mem::forget(guard),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            return Err(SyncError::JournalInUse(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    }
    Ok(owner)
}

/// Read `path` front to back, collecting decodable frames.
fn scan_frames(path: &Path) -> SyncResult<FrameScan> {
    let mut bytes = Vec::new();
    match File::open(path) {
        Ok(mut file) => {
            file.read_to_end(&mut bytes)?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let total = bytes.len() as u64;
    let mut frames = Vec::new();
    let mut offset: u64 = 0;

    while offset + HEADER_SIZE <= total {
        let at = offset as usize;
        let length = u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let expected_crc =
            u32::from_le_bytes([bytes[at + 4], bytes[at + 5], bytes[at + 6], bytes[at + 7]]);
        let frame_end = offset + HEADER_SIZE + u64::from(length);

        if length == 0 || frame_end > total {
            warn!(offset, length, total, "torn journal frame; stopping recovery");
            break;
        }

        let payload = &bytes[(offset + HEADER_SIZE) as usize..frame_end as usize];
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            warn!(
                offset,
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch; skipping journal frame"
            );
        } else {
            match bincode::deserialize::<SyncTask>(payload) {
                Ok(task) => frames.push((offset, task)),
                Err(e) => warn!(offset, error = %e, "undecodable journal frame; skipping"),
            }
        }
        offset = frame_end;
    }

    Ok(FrameScan {
        frames,
        valid_len: offset,
    })
}
