//! Persistent language index.
//!
//! Each language's [`LanguageRecord`] lives at its own key
//! (`meta/<language>.json`) and is guarded by its own mutex, so writers of
//! different languages never contend. Every mutation is a read-modify-write
//! under that language's lock and under the backend's lock on the record key
//! ([`KeyValueStore::locked`]), which also excludes other processes sharing
//! the storage root. A record left empty is deleted rather than stored.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use lingo_store::{index_key, normalize_entity_type, BlobStore, KeyValueStore, INDEX_PREFIX};
use lingo_types::{EntityRef, Language};
use tracing::{debug, info, warn};

use crate::error::{IndexError, IndexResult};
use crate::record::LanguageRecord;

/// Summary of a [`LanguageIndex::rebuild`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Number of entity types scanned.
    pub entity_types: usize,
    /// Languages whose record was rewritten or deleted.
    pub languages: Vec<Language>,
    /// Total (type, id, language) entries found in the blob store.
    pub entries: usize,
}

/// Reverse index from (language, entity type) to entity ids.
pub struct LanguageIndex {
    backend: Arc<dyn KeyValueStore>,
    locks: Mutex<HashMap<Language, Arc<Mutex<()>>>>,
}

impl LanguageIndex {
    /// Create an index persisting through `backend`.
    ///
    /// The in-process lock table is owned by this value. Independent
    /// instances over one backend are serialized by the backend's own key
    /// lock, which the filesystem store implements with a lock file.
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
        }
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// The whole record for `language`; empty if none is stored.
    pub fn record(&self, language: &Language) -> IndexResult<LanguageRecord> {
        self.load(language)
    }

    /// Ids of `entity_type` with a blob in `language`, in first-insertion
    /// order. Empty if none.
    pub fn entities_in_language(
        &self,
        entity_type: &str,
        language: &Language,
    ) -> IndexResult<Vec<String>> {
        Ok(self.load(language)?.ids(entity_type).to_vec())
    }

    /// Languages that currently have a record.
    pub fn languages(&self) -> IndexResult<Vec<Language>> {
        let mut languages = Vec::new();
        for key in self.backend.list(INDEX_PREFIX)? {
            let Some(file_name) = key.strip_prefix(INDEX_PREFIX) else {
                continue;
            };
            match file_name
                .strip_suffix(".json")
                .and_then(|stem| Language::new(stem).ok())
            {
                Some(language) => languages.push(language),
                None => warn!(%key, "ignoring unrecognized file in index namespace"),
            }
        }
        Ok(languages)
    }

    // ---------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------

    /// Idempotently insert `entity` into `language`'s record. Returns `true`
    /// if the record changed.
    pub fn add_entity(&self, entity: &EntityRef, language: &Language) -> IndexResult<bool> {
        let changed = self.update(language, |record| record.add(entity))?;
        debug!(%entity, %language, changed, "index add");
        Ok(changed)
    }

    /// Remove `entity` from `language`'s record, pruning the type and the
    /// record itself when they become empty. Returns `true` if the record
    /// changed.
    pub fn remove_entity(&self, entity: &EntityRef, language: &Language) -> IndexResult<bool> {
        let changed = self.update(language, |record| record.remove(entity))?;
        debug!(%entity, %language, changed, "index remove");
        Ok(changed)
    }

    /// Remove `entity` from every language record that lists it.
    ///
    /// Languages are discovered from the index's own key set, so this works
    /// after the entity's blobs are already gone. Returns the languages that
    /// changed.
    pub fn remove_entity_from_all_languages(&self, entity: &EntityRef) -> IndexResult<Vec<Language>> {
        let mut changed = Vec::new();
        for language in self.languages()? {
            if self.remove_entity(entity, &language)? {
                changed.push(language);
            }
        }
        Ok(changed)
    }

    /// Replace `language`'s whole record. An empty record deletes the key.
    pub fn replace(&self, language: &Language, record: LanguageRecord) -> IndexResult<()> {
        let mut record = record;
        record.normalize();
        let types = record.type_count();
        let changed = self.update(language, |current| {
            let changed = *current != record;
            *current = record;
            changed
        })?;
        debug!(%language, types, changed, "index replace");
        Ok(())
    }

    /// Recompute the entries of `entity_types` from a full scan of `blobs`.
    ///
    /// Entries of types not named are left untouched; names that normalize
    /// to the same namespace token are one type. Never run
    /// automatically; this is the repair path for lost sync tasks.
    pub fn rebuild<S: AsRef<str>>(
        &self,
        blobs: &BlobStore,
        entity_types: &[S],
    ) -> IndexResult<RebuildReport> {
        let mut tokens: Vec<(String, &str)> = entity_types
            .iter()
            .map(|t| (normalize_entity_type(t.as_ref()), t.as_ref()))
            .collect();
        tokens.sort();
        tokens.dedup_by(|a, b| a.0 == b.0);

        // language -> type token -> ids
        let mut fresh: BTreeMap<Language, BTreeMap<String, Vec<String>>> = BTreeMap::new();
        let mut entries = 0;

        for (token, entity_type) in &tokens {
            let entity_type = *entity_type;
            for id in blobs.entity_ids(entity_type)? {
                let Ok(entity) = EntityRef::new(entity_type, id.as_str()) else {
                    warn!(entity_type, %id, "skipping unaddressable id during rebuild");
                    continue;
                };
                for language in blobs.available_languages(&entity)? {
                    if blobs.get(&entity, &language)?.is_empty() {
                        continue;
                    }
                    fresh
                        .entry(language)
                        .or_default()
                        .entry(token.clone())
                        .or_default()
                        .push(id.clone());
                    entries += 1;
                }
            }
        }

        let mut targets = self.languages()?;
        for language in fresh.keys() {
            if !targets.contains(language) {
                targets.push(language.clone());
            }
        }
        targets.sort();

        let mut rewritten = Vec::new();
        for language in targets {
            let by_type = fresh.remove(&language).unwrap_or_default();
            let changed = self.update(&language, |record| {
                let before = record.clone();
                for (token, _) in &tokens {
                    let ids = by_type.get(token).cloned().unwrap_or_default();
                    record.set_ids(token, ids);
                }
                *record != before
            })?;
            if changed {
                rewritten.push(language);
            }
        }

        let report = RebuildReport {
            entity_types: tokens.len(),
            languages: rewritten,
            entries,
        };
        info!(
            entity_types = report.entity_types,
            languages = report.languages.len(),
            entries = report.entries,
            "rebuilt language index"
        );
        Ok(report)
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    /// Run `mutate` on `language`'s record under its locks, persisting the
    /// result only if `mutate` reports a change.
    fn update<F>(&self, language: &Language, mutate: F) -> IndexResult<bool>
    where
        F: FnOnce(&mut LanguageRecord) -> bool,
    {
        let lock = self.lock_for(language)?;
        let _guard = lock.lock().map_err(poisoned)?;

        let mut mutate = Some(mutate);
        let mut outcome = Ok(false);
        self.backend.locked(&index_key(language), &mut || {
            if let Some(mutate) = mutate.take() {
                outcome = self.modify(language, mutate);
            }
            Ok(())
        })?;
        outcome
    }

    fn modify<F>(&self, language: &Language, mutate: F) -> IndexResult<bool>
    where
        F: FnOnce(&mut LanguageRecord) -> bool,
    {
        let mut record = self.load(language)?;
        if !mutate(&mut record) {
            return Ok(false);
        }
        self.save(language, &record)?;
        Ok(true)
    }

    fn lock_for(&self, language: &Language) -> IndexResult<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(poisoned)?;
        Ok(locks.entry(language.clone()).or_default().clone())
    }

    fn load(&self, language: &Language) -> IndexResult<LanguageRecord> {
        let Some(bytes) = self.backend.read(&index_key(language))? else {
            return Ok(LanguageRecord::new());
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(LanguageRecord::new());
        }
        let mut record: LanguageRecord =
            serde_json::from_slice(&bytes).map_err(|e| IndexError::CorruptRecord {
                language: language.clone(),
                reason: e.to_string(),
            })?;
        record.normalize();
        Ok(record)
    }

    fn save(&self, language: &Language, record: &LanguageRecord) -> IndexResult<()> {
        let key = index_key(language);
        if record.is_empty() {
            self.backend.delete(&key)?;
            return Ok(());
        }
        let bytes =
            serde_json::to_vec(record).map_err(|e| IndexError::Serialization(e.to_string()))?;
        self.backend.write(&key, &bytes)?;
        Ok(())
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> IndexError {
    IndexError::Poisoned(e.to_string())
}

impl std::fmt::Debug for LanguageIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lock_count = self.locks.lock().map(|l| l.len()).unwrap_or(0);
        f.debug_struct("LanguageIndex")
            .field("lock_count", &lock_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingo_store::{FsKeyValueStore, InMemoryKeyValueStore};
    use lingo_types::AttributeMap;
    use std::thread;

    fn setup() -> (Arc<InMemoryKeyValueStore>, LanguageIndex) {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        (kv.clone(), LanguageIndex::new(kv))
    }

    fn article(id: &str) -> EntityRef {
        EntityRef::new("App\\Article", id).unwrap()
    }

    fn comment(id: &str) -> EntityRef {
        EntityRef::new("App\\Comment", id).unwrap()
    }

    fn lang(tag: &str) -> Language {
        Language::new(tag).unwrap()
    }

    fn attrs(pairs: &[(&str, &str)]) -> AttributeMap {
        pairs.iter().copied().collect()
    }

    // -----------------------------------------------------------------------
    // add / remove
    // -----------------------------------------------------------------------

    #[test]
    fn add_creates_language_record() {
        let (kv, index) = setup();
        assert!(index.add_entity(&article("1"), &lang("en")).unwrap());
        assert_eq!(index.entities_in_language("App\\Article", &lang("en")).unwrap(), vec!["1"]);
        assert!(kv.exists("meta/en.json").unwrap());
    }

    #[test]
    fn duplicate_add_does_not_duplicate() {
        let (_kv, index) = setup();
        index.add_entity(&article("1"), &lang("en")).unwrap();
        assert!(!index.add_entity(&article("1"), &lang("en")).unwrap());
        assert_eq!(index.entities_in_language("App\\Article", &lang("en")).unwrap(), vec!["1"]);
    }

    #[test]
    fn missing_language_reads_empty() {
        let (_kv, index) = setup();
        assert!(index.entities_in_language("App\\Article", &lang("en")).unwrap().is_empty());
        assert!(index.record(&lang("en")).unwrap().is_empty());
    }

    #[test]
    fn removing_last_type_prunes_record() {
        let (kv, index) = setup();
        index.add_entity(&article("1"), &lang("en")).unwrap();
        index.add_entity(&comment("1"), &lang("en")).unwrap();

        index.remove_entity(&article("1"), &lang("en")).unwrap();
        let record = index.record(&lang("en")).unwrap();
        assert_eq!(record.entity_types().collect::<Vec<_>>(), vec!["app-comment"]);

        index.remove_entity(&comment("1"), &lang("en")).unwrap();
        assert!(!kv.exists("meta/en.json").unwrap());
        assert!(index.languages().unwrap().is_empty());
    }

    #[test]
    fn remove_absent_writes_nothing() {
        let (kv, index) = setup();
        assert!(!index.remove_entity(&article("1"), &lang("en")).unwrap());
        assert!(kv.is_empty());
    }

    #[test]
    fn remove_from_all_languages_uses_index_keys() {
        let (_kv, index) = setup();
        for tag in ["en", "fr", "de"] {
            index.add_entity(&article("1"), &lang(tag)).unwrap();
        }
        index.add_entity(&article("2"), &lang("fr")).unwrap();

        let changed = index.remove_entity_from_all_languages(&article("1")).unwrap();
        assert_eq!(changed, vec![lang("de"), lang("en"), lang("fr")]);
        assert_eq!(index.languages().unwrap(), vec![lang("fr")]);
        assert_eq!(index.entities_in_language("App\\Article", &lang("fr")).unwrap(), vec!["2"]);
    }

    #[test]
    fn replace_with_empty_record_deletes_key() {
        let (kv, index) = setup();
        let record: LanguageRecord = [article("1"), article("2")].into_iter().collect();
        index.replace(&lang("en"), record.clone()).unwrap();
        assert_eq!(index.record(&lang("en")).unwrap(), record);

        index.replace(&lang("en"), LanguageRecord::new()).unwrap();
        assert!(!kv.exists("meta/en.json").unwrap());
    }

    #[test]
    fn corrupt_record_is_reported() {
        let (kv, index) = setup();
        kv.write("meta/en.json", b"[oops").unwrap();
        assert!(matches!(
            index.record(&lang("en")),
            Err(IndexError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn stored_duplicates_are_repaired_on_load() {
        let (kv, index) = setup();
        kv.write("meta/en.json", br#"{"App\\Article":["1","1"],"App\\Comment":[]}"#)
            .unwrap();
        let record = index.record(&lang("en")).unwrap();
        assert_eq!(record.ids("App\\Article"), ["1"]);
        assert_eq!(record.type_count(), 1);
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_adds_to_one_language_lose_nothing() {
        let (_kv, index) = setup();
        let index = Arc::new(index);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let index = index.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        let id = (t * 25 + i).to_string();
                        index.add_entity(&article(&id), &lang("en")).unwrap();
                        // Every thread also races on one shared id.
                        index.add_entity(&article("shared"), &lang("en")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let ids = index.entities_in_language("App\\Article", &lang("en")).unwrap();
        assert_eq!(ids.len(), 8 * 25 + 1);
        assert_eq!(ids.iter().filter(|id| *id == "shared").count(), 1);
    }

    #[test]
    fn concurrent_add_and_remove_keep_invariants() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(LanguageIndex::new(Arc::new(
            FsKeyValueStore::open(dir.path()).unwrap(),
        )));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let index = index.clone();
                thread::spawn(move || {
                    for i in 0..20 {
                        let e = article(&format!("{t}-{i}"));
                        index.add_entity(&e, &lang("en")).unwrap();
                        index.remove_entity(&e, &lang("en")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(index.record(&lang("en")).unwrap().is_empty());
        assert!(!dir.path().join("meta/en.json").exists());
    }

    #[test]
    fn concurrent_writers_of_different_languages_never_fail() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(LanguageIndex::new(Arc::new(
            FsKeyValueStore::open(dir.path()).unwrap(),
        )));

        // Every remove empties its language's record, deleting the key
        // while the other languages keep writing into `meta/`.
        let handles: Vec<_> = ["en", "fr", "de", "it"]
            .into_iter()
            .map(|tag| {
                let index = index.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let e = article(&i.to_string());
                        index.add_entity(&e, &lang(tag)).unwrap();
                        index.remove_entity(&e, &lang(tag)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(index.languages().unwrap().is_empty());
    }

    #[test]
    fn separate_instances_over_one_root_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let open = || {
            Arc::new(LanguageIndex::new(Arc::new(
                FsKeyValueStore::open(dir.path()).unwrap(),
            )))
        };

        // Two instances stand in for two processes: no shared lock table.
        let handles: Vec<_> = [open(), open()]
            .into_iter()
            .enumerate()
            .map(|(n, index)| {
                thread::spawn(move || {
                    for i in 0..200 {
                        index.add_entity(&article(&format!("{n}-{i}")), &lang("en")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let ids = open().entities_in_language("App\\Article", &lang("en")).unwrap();
        assert_eq!(ids.len(), 400);
    }

    // -----------------------------------------------------------------------
    // Rebuild
    // -----------------------------------------------------------------------

    #[test]
    fn rebuild_recomputes_from_blobs() {
        let (kv, index) = setup();
        let blobs = BlobStore::new(kv.clone());
        blobs.store(&article("2"), &lang("en"), &attrs(&[("t", "b")])).unwrap();
        blobs.store(&article("1"), &lang("en"), &attrs(&[("t", "a")])).unwrap();
        blobs.store(&article("1"), &lang("fr"), &attrs(&[("t", "a")])).unwrap();

        // Stale entries: a deleted entity and a language with nothing left.
        index.add_entity(&article("9"), &lang("en")).unwrap();
        index.add_entity(&article("9"), &lang("de")).unwrap();
        // Types outside the rebuild are left alone.
        index.add_entity(&comment("5"), &lang("en")).unwrap();

        let report = index.rebuild(&blobs, &["App\\Article"]).unwrap();
        assert_eq!(report.entries, 3);
        assert_eq!(report.entity_types, 1);

        assert_eq!(index.entities_in_language("App\\Article", &lang("en")).unwrap(), vec!["1", "2"]);
        assert_eq!(index.entities_in_language("App\\Article", &lang("fr")).unwrap(), vec!["1"]);
        assert_eq!(index.entities_in_language("App\\Comment", &lang("en")).unwrap(), vec!["5"]);
        assert_eq!(index.languages().unwrap(), vec![lang("en"), lang("fr")]);
    }

    #[test]
    fn lookups_resolve_aliased_type_names() {
        let (kv, index) = setup();
        let blobs = BlobStore::new(kv.clone());
        blobs.store(&article("1"), &lang("en"), &attrs(&[("t", "a")])).unwrap();
        index.add_entity(&article("1"), &lang("en")).unwrap();

        for alias in ["App\\Article", "app-article", "app_article"] {
            assert_eq!(index.entities_in_language(alias, &lang("en")).unwrap(), vec!["1"]);
            assert_eq!(blobs.scan_language(alias, &lang("en")).unwrap(), vec!["1"]);
        }

        // Rebuilding under an alias touches the same entry.
        let report = index.rebuild(&blobs, &["app-article", "App\\Article"]).unwrap();
        assert_eq!(report.entity_types, 1);
        assert!(report.languages.is_empty());
    }

    #[test]
    fn rebuild_of_consistent_index_changes_nothing() {
        let (kv, index) = setup();
        let blobs = BlobStore::new(kv.clone());
        blobs.store(&article("1"), &lang("en"), &attrs(&[("t", "a")])).unwrap();
        index.add_entity(&article("1"), &lang("en")).unwrap();

        let report = index.rebuild(&blobs, &["App\\Article"]).unwrap();
        assert!(report.languages.is_empty());
        assert_eq!(report.entries, 1);
    }
}
