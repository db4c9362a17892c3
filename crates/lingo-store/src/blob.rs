//! The per-language translation blob store.
//!
//! [`BlobStore`] persists one JSON-encoded [`AttributeMap`] per
//! (entity, language) pair through any [`KeyValueStore`]. It keeps no index
//! state of its own: "which languages does this entity have" is answered by
//! listing the entity's namespace, and "which ids of this type have language
//! L" by scanning the type's namespace.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use lingo_types::{AttributeMap, EntityRef, Language};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::keys::{blob_key, entity_prefix, language_from_file_name, type_prefix, RECORD_EXTENSION};
use crate::traits::KeyValueStore;

/// Translation blob storage over a key-value backend.
#[derive(Clone)]
pub struct BlobStore {
    backend: Arc<dyn KeyValueStore>,
}

impl BlobStore {
    /// Create a blob store on top of the given backend.
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// The underlying key-value backend.
    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Write (or overwrite) the blob for `entity` in `language`.
    ///
    /// Storing an empty map deletes the blob instead: an empty blob and an
    /// absent one mean the same thing and only the latter is persisted.
    pub fn store(
        &self,
        entity: &EntityRef,
        language: &Language,
        attributes: &AttributeMap,
    ) -> StoreResult<()> {
        let key = blob_key(entity, language);
        if attributes.is_empty() {
            let existed = self.backend.delete(&key)?;
            debug!(%entity, %language, existed, "stored empty blob as delete");
            return Ok(());
        }

        let bytes = serde_json::to_vec(attributes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.backend.write(&key, &bytes)?;
        debug!(%entity, %language, attributes = attributes.len(), "stored blob");
        Ok(())
    }

    /// Full replace; identical to [`Self::store`].
    pub fn put(
        &self,
        entity: &EntityRef,
        language: &Language,
        attributes: &AttributeMap,
    ) -> StoreResult<()> {
        self.store(entity, language, attributes)
    }

    /// Merge `attributes` over the existing blob and store the result.
    ///
    /// Returns the merged map.
    pub fn patch(
        &self,
        entity: &EntityRef,
        language: &Language,
        attributes: &AttributeMap,
    ) -> StoreResult<AttributeMap> {
        let mut merged = self.get(entity, language)?;
        merged.merge(attributes);
        self.store(entity, language, &merged)?;
        Ok(merged)
    }

    /// Remove every blob of `entity`. Returns the languages that were
    /// present, discovered before deletion.
    pub fn delete_all(&self, entity: &EntityRef) -> StoreResult<Vec<Language>> {
        let languages = self.stored_languages(entity)?;
        for language in &languages {
            self.backend.delete(&blob_key(entity, language))?;
        }
        debug!(%entity, languages = languages.len(), "deleted all blobs");
        Ok(languages)
    }

    /// Remove the blob of `entity` in each of `languages`. Missing blobs are
    /// a no-op.
    pub fn delete_languages(&self, entity: &EntityRef, languages: &[Language]) -> StoreResult<()> {
        for language in languages {
            let existed = self.backend.delete(&blob_key(entity, language))?;
            debug!(%entity, %language, existed, "deleted language blob");
        }
        Ok(())
    }

    /// Remove the named attributes from `entity`'s blob in `language`, or in
    /// every present language when `language` is `None`.
    ///
    /// Blobs left empty are deleted. Returns the languages whose blob was
    /// examined (and possibly rewritten or deleted).
    pub fn delete_attributes<S: AsRef<str>>(
        &self,
        entity: &EntityRef,
        attributes: &[S],
        language: Option<&Language>,
    ) -> StoreResult<Vec<Language>> {
        let languages = match language {
            Some(language) => {
                if !self.backend.exists(&blob_key(entity, language))? {
                    return Ok(Vec::new());
                }
                vec![language.clone()]
            }
            None => self.stored_languages(entity)?,
        };

        for language in &languages {
            let remaining = self.get(entity, language)?.without(attributes);
            self.store(entity, language, &remaining)?;
        }
        Ok(languages)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// The blob for `entity` in `language`; empty if none is stored.
    pub fn get(&self, entity: &EntityRef, language: &Language) -> StoreResult<AttributeMap> {
        let key = blob_key(entity, language);
        match self.backend.read(&key)? {
            Some(bytes) => decode_blob(&key, &bytes),
            None => Ok(AttributeMap::new()),
        }
    }

    /// Batched [`Self::get`]: every input entity appears in the result,
    /// keyed by entity id, mapped to an empty map when it has no blob.
    pub fn get_many(
        &self,
        entities: &[EntityRef],
        language: &Language,
    ) -> StoreResult<BTreeMap<String, AttributeMap>> {
        let keys: Vec<String> = entities.iter().map(|e| blob_key(e, language)).collect();
        let values = self.backend.read_batch(&keys)?;

        let mut out = BTreeMap::new();
        for ((entity, key), value) in entities.iter().zip(&keys).zip(values) {
            let attributes = match value {
                Some(bytes) => decode_blob(key, &bytes)?,
                None => AttributeMap::new(),
            };
            out.insert(entity.entity_id().to_string(), attributes);
        }
        Ok(out)
    }

    /// Languages with a non-empty blob for `entity`.
    ///
    /// Blank blobs (whitespace or `{}`) are skipped since they read as empty.
    /// A malformed blob is still listed so it can be found and deleted.
    pub fn available_languages(&self, entity: &EntityRef) -> StoreResult<Vec<Language>> {
        let mut languages = Vec::new();
        for language in self.stored_languages(entity)? {
            let key = blob_key(entity, &language);
            let Some(bytes) = self.backend.read(&key)? else {
                continue;
            };
            match decode_blob(&key, &bytes) {
                Ok(attributes) if attributes.is_empty() => {
                    debug!(%key, "skipping blank blob");
                }
                _ => languages.push(language),
            }
        }
        Ok(languages)
    }

    /// Languages with any file in the namespace of `entity`, blank or not.
    fn stored_languages(&self, entity: &EntityRef) -> StoreResult<Vec<Language>> {
        let prefix = entity_prefix(entity);
        let mut languages = Vec::new();
        for key in self.backend.list(&prefix)? {
            let Some(file_name) = key.strip_prefix(&prefix) else {
                continue;
            };
            if file_name.contains('/') {
                continue;
            }
            match language_from_file_name(file_name) {
                Some(language) => languages.push(language),
                None => warn!(%key, "ignoring unrecognized file in entity namespace"),
            }
        }
        Ok(languages)
    }

    /// Instance ids with at least one blob in the namespace of `entity_type`.
    pub fn entity_ids(&self, entity_type: &str) -> StoreResult<Vec<String>> {
        let prefix = type_prefix(entity_type);
        let mut ids: Vec<String> = self
            .backend
            .list(&prefix)?
            .iter()
            .filter_map(|key| split_blob_key(&prefix, key).map(|(id, _)| id.to_string()))
            .collect();
        ids.sort_by(|a, b| compare_ids(a, b));
        ids.dedup();
        Ok(ids)
    }

    /// Scan the namespace of `entity_type` for instances with a non-empty
    /// blob in `language`.
    ///
    /// Always consistent with storage; cost is linear in the number of
    /// stored blobs of that type. Ids come back in natural order (numeric
    /// ids numerically, then the rest lexically).
    pub fn scan_language(&self, entity_type: &str, language: &Language) -> StoreResult<Vec<String>> {
        let prefix = type_prefix(entity_type);
        let file_name = format!("{language}{RECORD_EXTENSION}");

        let mut ids = Vec::new();
        for key in self.backend.list(&prefix)? {
            let Some((id, name)) = split_blob_key(&prefix, &key) else {
                continue;
            };
            if name != file_name {
                continue;
            }
            let Some(bytes) = self.backend.read(&key)? else {
                continue;
            };
            if !decode_blob(&key, &bytes)?.is_empty() {
                ids.push(id.to_string());
            }
        }
        ids.sort_by(|a, b| compare_ids(a, b));
        Ok(ids)
    }
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore").finish_non_exhaustive()
    }
}

/// Split `<prefix><id>/<file>` into `(id, file)`.
fn split_blob_key<'a>(prefix: &str, key: &'a str) -> Option<(&'a str, &'a str)> {
    let rest = key.strip_prefix(prefix)?;
    let (id, file) = rest.split_once('/')?;
    if file.contains('/') {
        return None;
    }
    Some((id, file))
}

/// Decode a stored blob. Whitespace-only content counts as an empty blob.
fn decode_blob(key: &str, bytes: &[u8]) -> StoreResult<AttributeMap> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(AttributeMap::new());
    }
    serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Natural ordering for entity ids: numeric ids first, numerically, then
/// everything else lexically.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u128>(), b.parse::<u128>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
