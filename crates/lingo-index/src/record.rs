//! The index entry for a single language.

use std::collections::BTreeMap;

use lingo_store::normalize_entity_type;
use lingo_types::EntityRef;
use serde::{Deserialize, Serialize};

/// Entity type -> ordered-unique entity ids having a blob in one language.
///
/// Types are keyed by their normalized namespace token, the same token the
/// blob store files them under, so `App\Article` and `app-article` name one
/// entry. Invariants, maintained by every mutating method:
/// - an id appears at most once per type, in order of first insertion;
/// - a type with no ids is not present.
///
/// Serialized as a plain JSON object: `{"app-article": ["1", "2"]}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageRecord {
    entities: BTreeMap<String, Vec<String>>,
}

impl LanguageRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no type has any id (the record must not be stored).
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of entity types present.
    pub fn type_count(&self) -> usize {
        self.entities.len()
    }

    /// Total number of (type, id) entries.
    pub fn entry_count(&self) -> usize {
        self.entities.values().map(Vec::len).sum()
    }

    /// Ids of `entity_type`, in insertion order. Empty if the type is absent.
    pub fn ids(&self, entity_type: &str) -> &[String] {
        self.entities
            .get(&normalize_entity_type(entity_type))
            .map_or(&[], Vec::as_slice)
    }

    /// Namespace tokens of the entity types present.
    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Returns `true` if `entity` is listed.
    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.ids(entity.entity_type())
            .iter()
            .any(|id| id == entity.entity_id())
    }

    /// Insert `entity`, creating its type if needed. Returns `true` if the
    /// record changed.
    pub fn add(&mut self, entity: &EntityRef) -> bool {
        let ids = self
            .entities
            .entry(normalize_entity_type(entity.entity_type()))
            .or_default();
        if ids.iter().any(|id| id == entity.entity_id()) {
            return false;
        }
        ids.push(entity.entity_id().to_string());
        true
    }

    /// Remove `entity`, pruning its type if it was the last id. Returns
    /// `true` if the record changed.
    pub fn remove(&mut self, entity: &EntityRef) -> bool {
        let token = normalize_entity_type(entity.entity_type());
        let Some(ids) = self.entities.get_mut(&token) else {
            return false;
        };
        let before = ids.len();
        ids.retain(|id| id != entity.entity_id());
        let changed = ids.len() != before;
        if ids.is_empty() {
            self.entities.remove(&token);
        }
        changed
    }

    /// Replace the id list of `entity_type`; an empty list removes the type.
    pub fn set_ids(&mut self, entity_type: &str, ids: Vec<String>) {
        let token = normalize_entity_type(entity_type);
        let unique = dedup(ids);
        if unique.is_empty() {
            self.entities.remove(&token);
        } else {
            self.entities.insert(token, unique);
        }
    }

    /// Restore the invariants on a record loaded from storage: types are
    /// re-keyed by namespace token (aliases merge in key order), duplicate
    /// ids are dropped (first occurrence wins) and empty types are pruned.
    pub fn normalize(&mut self) {
        let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (entity_type, ids) in std::mem::take(&mut self.entities) {
            merged
                .entry(normalize_entity_type(&entity_type))
                .or_default()
                .extend(ids);
        }
        self.entities = merged
            .into_iter()
            .map(|(token, ids)| (token, dedup(ids)))
            .filter(|(_, ids)| !ids.is_empty())
            .collect();
    }
}

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}

impl FromIterator<EntityRef> for LanguageRecord {
    fn from_iter<I: IntoIterator<Item = EntityRef>>(iter: I) -> Self {
        let mut record = Self::new();
        for entity in iter {
            record.add(&entity);
        }
        record
    }
}
