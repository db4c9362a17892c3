//! Foundation types for lingo.
//!
//! This crate provides the value types shared by every other lingo crate:
//! what a translatable entity is, what a language is, what a translation
//! blob holds, and the shape of an index synchronization request.
//!
//! # Key Types
//!
//! - [`EntityRef`] — (entity type, entity id) pair identifying a translatable object
//! - [`Language`] — Validated, key-safe language tag
//! - [`AttributeMap`] — Attribute name to value map for one entity in one language
//! - [`SyncTask`] — Request to reconcile the language index for one (entity, language) pair

pub mod attributes;
pub mod entity;
pub mod error;
pub mod language;
pub mod task;

pub use attributes::AttributeMap;
pub use entity::EntityRef;
pub use error::TypeError;
pub use language::Language;
pub use task::SyncTask;
