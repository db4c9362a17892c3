//! Translation drivers for lingo.
//!
//! A [`TranslationDriver`] stores per-language attribute maps for model
//! instances. Two drivers ship built in: [`JsonTranslationDriver`], which
//! persists one JSON blob per (entity, language) and keeps a reverse
//! language index in sync, and [`ArrayTranslationDriver`], an in-memory
//! stand-in for tests. [`DriverRegistry`] resolves drivers by name from a
//! [`TranslationConfig`] and accepts third-party factories.

pub mod array;
pub mod config;
pub mod conformance;
pub mod contract;
pub mod error;
pub mod json;
pub mod registry;

pub use array::ArrayTranslationDriver;
pub use config::{IndexMode, JsonConfig, QueueConfig, QueueKind, TranslationConfig};
pub use conformance::{CheckResult, ConformanceReport};
pub use contract::{Operation, TranslationDriver};
pub use error::{DriverError, DriverResult, RegistryError, RegistryResult};
pub use json::JsonTranslationDriver;
pub use registry::{DriverFactory, DriverRegistry, BUILTIN_DRIVERS};

// Re-export key types
pub use lingo_index::RebuildReport;
pub use lingo_sync::{SyncWorker, WorkerStats};
pub use lingo_types::{AttributeMap, EntityRef, Language, SyncTask};
