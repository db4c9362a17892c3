//! Translation blob storage for lingo.
//!
//! Two layers live here. The bottom one is the [`KeyValueStore`] trait, a
//! generic `read`/`write`/`delete`/`list`/`exists` boundary over
//! `/`-separated keys, with an in-memory and a filesystem backend. On top of
//! it sits [`BlobStore`], which persists one JSON attribute map per
//! (entity type, entity id, language) triple.
//!
//! # Key Layout
//!
//! ```text
//! <normalized type>/<entity id>/<language>.json   translation blob
//! meta/<language>.json                            language index record
//! ```
//!
//! # Design Rules
//!
//! 1. At most one blob per (type, id, language); an empty blob is deleted,
//!    never written.
//! 2. Missing data is an empty result, never an error.
//! 3. The blob store keeps no index state; listing a namespace is the only
//!    way it answers "which languages / which ids".
//! 4. All I/O errors are propagated, never silently ignored.

pub mod blob;
pub mod error;
pub mod fs;
pub mod keys;
pub mod memory;
pub mod traits;

pub use blob::{compare_ids, BlobStore};
pub use error::{StoreError, StoreResult};
pub use fs::FsKeyValueStore;
pub use keys::{blob_key, entity_prefix, index_key, normalize_entity_type, type_prefix, INDEX_PREFIX};
pub use memory::InMemoryKeyValueStore;
pub use traits::KeyValueStore;
