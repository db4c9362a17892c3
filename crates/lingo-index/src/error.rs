//! Error types for the index crate.

use lingo_types::Language;

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The stored record for a language could not be decoded.
    #[error("corrupt index record for {language}: {reason}")]
    CorruptRecord { language: Language, reason: String },

    /// A record could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] lingo_store::StoreError),

    /// A per-language lock was poisoned by a panicking writer.
    #[error("index lock poisoned: {0}")]
    Poisoned(String),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
