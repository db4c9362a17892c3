//! Language index for lingo.
//!
//! Answers "which entities of type T have any translation in language L"
//! without scanning the blob store. The index is one [`LanguageRecord`] per
//! language, stored at `meta/<language>.json`, mapping entity type to the
//! ordered-unique ids that currently have a blob in that language.
//!
//! # Key Types
//!
//! - [`LanguageRecord`] -- The in-memory entry for a single language
//! - [`LanguageIndex`] -- Persistent, per-language-locked index over a key-value store
//! - [`RebuildReport`] -- Summary of a full rebuild from the blob store
//!
//! The index is a cache of a derivable fact. It is written only by the
//! synchronizer (and by explicit rebuilds) and can always be recomputed from
//! the blob store.

pub mod error;
pub mod index;
pub mod record;

pub use error::{IndexError, IndexResult};
pub use index::{LanguageIndex, RebuildReport};
pub use record::LanguageRecord;
