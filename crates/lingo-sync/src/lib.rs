//! Index synchronization for lingo.
//!
//! Every mutating blob operation produces one [`SyncTask`] per affected
//! (entity, language) pair. This crate is what happens to those tasks: a
//! [`TaskQueue`] carries them off the write path, a [`SyncWorker`] consumes
//! them, and the [`Synchronizer`] reconciles the language index against the
//! blob store's current truth.
//!
//! Reconciliation recomputes from storage rather than applying a delta, so
//! tasks may be delivered more than once and in any order.
//!
//! [`SyncTask`]: lingo_types::SyncTask

pub mod error;
pub mod journal;
pub mod queue;
pub mod synchronizer;
pub mod worker;

pub use error::{SyncError, SyncResult};
pub use journal::{JournalOffset, TaskJournal};
pub use queue::{
    ChannelQueue, Delivery, InlineQueue, JournaledQueue, RecordingQueue, TaskQueue, TaskReceiver,
};
pub use synchronizer::{SyncOutcome, Synchronizer};
pub use worker::{SyncWorker, WorkerStats};
