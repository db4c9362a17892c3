//! Producer side of index synchronization.
//!
//! A [`TaskQueue`] accepts [`SyncTask`]s from the write path and never
//! waits for them to be applied. Which queue a driver gets decides when the
//! index catches up:
//!
//! - [`InlineQueue`] applies the task before `dispatch` returns; a failure
//!   is logged and left for `rebuild` instead of failing the write.
//! - [`ChannelQueue`] hands it to a [`SyncWorker`](crate::SyncWorker).
//! - [`JournaledQueue`] journals it first, so a crash cannot lose it.
//! - [`RecordingQueue`] only remembers it (for tests).

use std::path::Path;
use std::sync::{Arc, Mutex};

use lingo_types::SyncTask;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{poisoned, SyncError, SyncResult};
use crate::journal::{JournalOffset, TaskJournal};
use crate::synchronizer::Synchronizer;

/// Accepts sync tasks on behalf of the index synchronizer.
pub trait TaskQueue: Send + Sync {
    /// Enqueue `task`. Must not block on the consumer.
    fn dispatch(&self, task: SyncTask) -> SyncResult<()>;

    /// Short name for logs and diagnostics.
    fn kind(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Inline
// ---------------------------------------------------------------------------

/// Applies each task synchronously on the dispatching thread.
///
/// The blob write that produced the task is already durable, so a sync
/// failure does not fail the dispatch. The index entry stays stale until a
/// later task for the same pair or a rebuild repairs it.
#[derive(Clone, Debug)]
pub struct InlineQueue {
    synchronizer: Synchronizer,
}

impl InlineQueue {
    pub fn new(synchronizer: Synchronizer) -> Self {
        Self { synchronizer }
    }
}

impl TaskQueue for InlineQueue {
    fn dispatch(&self, task: SyncTask) -> SyncResult<()> {
        if let Err(e) = self.synchronizer.sync(&task) {
            warn!(%task, error = %e, "inline sync failed; index left stale");
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "inline"
    }
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

/// Records dispatched tasks without applying them.
#[derive(Debug, Default)]
pub struct RecordingQueue {
    tasks: Mutex<Vec<SyncTask>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every task dispatched so far.
    pub fn tasks(&self) -> Vec<SyncTask> {
        self.tasks.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// Remove and return every recorded task.
    pub fn take(&self) -> Vec<SyncTask> {
        self.tasks
            .lock()
            .map(|mut t| std::mem::take(&mut *t))
            .unwrap_or_default()
    }
}

impl TaskQueue for RecordingQueue {
    fn dispatch(&self, task: SyncTask) -> SyncResult<()> {
        self.tasks.lock().map_err(poisoned)?.push(task);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "recording"
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A task in flight between a queue and its worker.
///
/// Journaled deliveries carry the offset to acknowledge once applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub task: SyncTask,
    pub receipt: Option<JournalOffset>,
}

/// Consumer end of a [`ChannelQueue`] or [`JournaledQueue`].
#[derive(Debug)]
pub struct TaskReceiver {
    rx: mpsc::UnboundedReceiver<Delivery>,
    journal: Option<Arc<TaskJournal>>,
}

impl TaskReceiver {
    /// Wait for the next delivery. `None` once every producer is dropped
    /// and the channel is empty.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// The next delivery if one is already queued.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    /// Mark `delivery` as applied. A no-op for unjournaled deliveries.
    pub fn ack(&self, delivery: &Delivery) -> SyncResult<()> {
        match (&self.journal, delivery.receipt) {
            (Some(journal), Some(offset)) => journal.ack(offset),
            _ => Ok(()),
        }
    }
}

/// Hands tasks to a [`SyncWorker`](crate::SyncWorker) over an unbounded
/// tokio channel.
#[derive(Clone, Debug)]
pub struct ChannelQueue {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelQueue {
    /// Create a queue and the receiver its worker consumes.
    pub fn unbounded() -> (Self, TaskReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, TaskReceiver { rx, journal: None })
    }

    fn send(&self, delivery: Delivery) -> SyncResult<()> {
        self.tx.send(delivery).map_err(|_| SyncError::QueueClosed)
    }
}

impl TaskQueue for ChannelQueue {
    fn dispatch(&self, task: SyncTask) -> SyncResult<()> {
        debug!(%task, "queued sync task");
        self.send(Delivery {
            task,
            receipt: None,
        })
    }

    fn kind(&self) -> &'static str {
        "channel"
    }
}

// ---------------------------------------------------------------------------
// Journaled
// ---------------------------------------------------------------------------

/// A [`ChannelQueue`] that journals every task before sending it.
///
/// Tasks stay in the journal until the worker acknowledges them; after a
/// restart, [`JournaledQueue::recover`] re-dispatches whatever was left.
#[derive(Clone, Debug)]
pub struct JournaledQueue {
    channel: ChannelQueue,
    journal: Arc<TaskJournal>,
}

impl JournaledQueue {
    /// Open the journal at `path` and create the queue and its receiver.
    pub fn open(path: &Path) -> SyncResult<(Self, TaskReceiver)> {
        let journal = Arc::new(TaskJournal::open(path)?);
        let (channel, mut receiver) = ChannelQueue::unbounded();
        receiver.journal = Some(journal.clone());
        Ok((Self { channel, journal }, receiver))
    }

    /// Re-send every unacknowledged journaled task. Returns how many.
    pub fn recover(&self) -> SyncResult<usize> {
        let pending = self.journal.recover()?;
        let count = pending.len();
        for (offset, task) in pending {
            self.channel.send(Delivery {
                task,
                receipt: Some(offset),
            })?;
        }
        if count > 0 {
            info!(count, path = %self.journal.path().display(), "re-dispatched journaled tasks");
        }
        Ok(count)
    }

    pub fn journal(&self) -> &Arc<TaskJournal> {
        &self.journal
    }
}

impl TaskQueue for JournaledQueue {
    fn dispatch(&self, task: SyncTask) -> SyncResult<()> {
        let offset = self.journal.append(&task)?;
        self.channel.send(Delivery {
            task,
            receipt: Some(offset),
        })
    }

    fn kind(&self) -> &'static str {
        "journaled"
    }
}
