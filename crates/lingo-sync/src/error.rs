use std::io;
use std::path::PathBuf;

/// Errors produced while queueing or applying sync tasks.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Reading the blob store failed.
    #[error("store error: {0}")]
    Store(#[from] lingo_store::StoreError),

    /// Updating the language index failed.
    #[error("index error: {0}")]
    Index(#[from] lingo_index::IndexError),

    /// I/O error on the task journal.
    #[error("journal io error: {0}")]
    Io(#[from] io::Error),

    /// A journal frame could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Acknowledged an offset the journal never handed out.
    #[error("unknown journal offset {0}")]
    UnknownOffset(u64),

    /// Another handle owns the journal file.
    #[error("journal {} is in use by another process", .0.display())]
    JournalInUse(PathBuf),

    /// The consuming side of the queue has been dropped.
    #[error("task queue is closed")]
    QueueClosed,

    /// A lock was poisoned by a panicking holder.
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

/// Convenience alias used throughout the sync crate.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

pub(crate) fn poisoned<E: std::fmt::Display>(e: E) -> SyncError {
    SyncError::Poisoned(e.to_string())
}
