//! The storage driver contract.

use std::collections::BTreeMap;
use std::fmt;

use lingo_types::{AttributeMap, EntityRef, Language};

use crate::error::DriverResult;

/// One operation of the [`TranslationDriver`] contract.
///
/// Drivers advertise what they implement through
/// [`TranslationDriver::operations`]; the registry refuses drivers whose
/// manifest is missing any of [`Operation::ALL`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Store,
    Get,
    GetMany,
    AvailableLanguages,
    ModelsAvailableInLanguage,
    Put,
    Patch,
    DeleteAll,
    DeleteLanguages,
    DeleteAttributes,
}

impl Operation {
    /// Every operation a complete driver implements.
    pub const ALL: [Operation; 10] = [
        Operation::Store,
        Operation::Get,
        Operation::GetMany,
        Operation::AvailableLanguages,
        Operation::ModelsAvailableInLanguage,
        Operation::Put,
        Operation::Patch,
        Operation::DeleteAll,
        Operation::DeleteLanguages,
        Operation::DeleteAttributes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Get => "get",
            Self::GetMany => "get_many",
            Self::AvailableLanguages => "available_languages",
            Self::ModelsAvailableInLanguage => "models_available_in_language",
            Self::Put => "put",
            Self::Patch => "patch",
            Self::DeleteAll => "delete_all",
            Self::DeleteLanguages => "delete_languages",
            Self::DeleteAttributes => "delete_attributes",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A translation storage backend.
///
/// Mutations return `Err` on storage failure and never panic; missing data
/// is an empty `Ok` value. Implementations that keep a reverse index must
/// bring it up to date for every (entity, language) pair a mutation
/// touches, though not necessarily before the call returns.
pub trait TranslationDriver: Send + Sync {
    /// Registry name of this driver.
    fn name(&self) -> &str;

    /// Operations this driver implements.
    fn operations(&self) -> &'static [Operation] {
        &Operation::ALL
    }

    /// Write or overwrite `entity`'s blob in `language`. An empty map
    /// removes the blob.
    fn store(&self, entity: &EntityRef, language: &Language, attributes: &AttributeMap)
        -> DriverResult<()>;

    /// `entity`'s attributes in `language`; empty if none are stored.
    fn get(&self, entity: &EntityRef, language: &Language) -> DriverResult<AttributeMap>;

    /// Batched [`Self::get`], keyed by entity id. Every input entity is
    /// present in the result.
    fn get_many(
        &self,
        entities: &[EntityRef],
        language: &Language,
    ) -> DriverResult<BTreeMap<String, AttributeMap>>;

    /// Languages in which `entity` has a non-empty blob.
    fn available_languages(&self, entity: &EntityRef) -> DriverResult<Vec<Language>>;

    /// Ids of every `entity_type` instance with a translation in `language`.
    fn models_available_in_language(
        &self,
        entity_type: &str,
        language: &Language,
    ) -> DriverResult<Vec<String>>;

    /// Full replace of `entity`'s blob in `language`.
    fn put(&self, entity: &EntityRef, language: &Language, attributes: &AttributeMap)
        -> DriverResult<()>;

    /// Merge `attributes` over `entity`'s blob in `language`.
    fn patch(&self, entity: &EntityRef, language: &Language, attributes: &AttributeMap)
        -> DriverResult<()>;

    /// Remove every blob of `entity`.
    fn delete_all(&self, entity: &EntityRef) -> DriverResult<()>;

    /// Remove `entity`'s blob in each of `languages`; missing ones are
    /// skipped.
    fn delete_languages(&self, entity: &EntityRef, languages: &[Language]) -> DriverResult<()>;

    /// Remove the named attributes in `language`, or in every language
    /// when `None`. Blobs left empty are removed.
    fn delete_attributes(
        &self,
        entity: &EntityRef,
        attributes: &[&str],
        language: Option<&Language>,
    ) -> DriverResult<()>;
}
