use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::keys::validate_key;
use crate::traits::KeyValueStore;

/// In-memory, `BTreeMap`-based key-value store.
///
/// Intended for tests and embedding. Values are held behind a `RwLock` and
/// cloned on read/write. The ordered map makes `list` a range scan.
pub struct InMemoryKeyValueStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryKeyValueStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Returns `true` if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every key.
    pub fn clear(&self) -> StoreResult<()> {
        self.entries.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Poisoned(e.to_string())
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        validate_key(key)?;
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.contains_key(key))
    }
}

impl std::fmt::Debug for InMemoryKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryKeyValueStore")
            .field("key_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read() {
        let store = InMemoryKeyValueStore::new();
        store.write("a/1/en.json", b"{}").unwrap();
        assert_eq!(store.read("a/1/en.json").unwrap().as_deref(), Some(&b"{}"[..]));
        assert!(store.exists("a/1/en.json").unwrap());
    }

    #[test]
    fn read_missing_is_none() {
        let store = InMemoryKeyValueStore::new();
        assert!(store.read("nope").unwrap().is_none());
        assert!(!store.exists("nope").unwrap());
    }

    #[test]
    fn delete_reports_presence() {
        let store = InMemoryKeyValueStore::new();
        store.write("k", b"v").unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }

    #[test]
    fn list_is_prefix_scoped_and_sorted() {
        let store = InMemoryKeyValueStore::new();
        for key in ["b/2/en.json", "a/1/fr.json", "a/1/en.json", "ab/1/en.json", "meta/en.json"] {
            store.write(key, b"{}").unwrap();
        }
        assert_eq!(store.list("a/").unwrap(), vec!["a/1/en.json", "a/1/fr.json"]);
        assert_eq!(store.list("").unwrap().len(), 5);
        assert!(store.list("zzz/").unwrap().is_empty());
    }

    #[test]
    fn delete_prefix_removes_namespace_only() {
        let store = InMemoryKeyValueStore::new();
        for key in ["a/1/en.json", "a/1/fr.json", "a/2/en.json"] {
            store.write(key, b"{}").unwrap();
        }
        assert_eq!(store.delete_prefix("a/1/").unwrap(), 2);
        assert_eq!(store.list("").unwrap(), vec!["a/2/en.json"]);
    }

    #[test]
    fn invalid_keys_are_rejected() {
        let store = InMemoryKeyValueStore::new();
        assert!(matches!(
            store.write("../escape", b"x"),
            Err(StoreError::InvalidKey { .. })
        ));
    }

    #[test]
    fn clear_and_len() {
        let store = InMemoryKeyValueStore::default();
        assert!(store.is_empty());
        store.write("x", b"1").unwrap();
        assert_eq!(store.len(), 1);
        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(format!("{store:?}").contains("key_count"));
    }
}
