use std::sync::Arc;

use lingo_index::LanguageIndex;
use lingo_store::BlobStore;
use lingo_types::SyncTask;
use tracing::debug;

use crate::error::SyncResult;

/// What a [`Synchronizer::sync`] call did to the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The blob is non-empty and the entity was added to the index.
    Added,
    /// The blob is non-empty and the entity was already indexed.
    AlreadyPresent,
    /// The blob is empty or absent and the entity was removed from the index.
    Removed,
    /// The blob is empty or absent and the entity was not indexed.
    AlreadyAbsent,
}

impl SyncOutcome {
    /// Whether the entity is indexed in the task's language afterwards.
    pub fn is_present(self) -> bool {
        matches!(self, Self::Added | Self::AlreadyPresent)
    }

    /// Whether the index record was modified.
    pub fn changed(self) -> bool {
        matches!(self, Self::Added | Self::Removed)
    }
}

/// Reconciles the language index against blob store truth, one
/// (entity, language) pair at a time.
#[derive(Clone, Debug)]
pub struct Synchronizer {
    blobs: BlobStore,
    index: Arc<LanguageIndex>,
}

impl Synchronizer {
    pub fn new(blobs: BlobStore, index: Arc<LanguageIndex>) -> Self {
        Self { blobs, index }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn index(&self) -> &Arc<LanguageIndex> {
        &self.index
    }

    /// Apply one task: index the entity if its blob is non-empty, unindex it
    /// otherwise.
    ///
    /// The outcome depends only on what storage holds when this runs, so
    /// running the same task again, or after a later task for the same pair,
    /// converges on the same state.
    pub fn sync(&self, task: &SyncTask) -> SyncResult<SyncOutcome> {
        let present = !self.blobs.get(&task.entity, &task.language)?.is_empty();
        let outcome = if present {
            if self.index.add_entity(&task.entity, &task.language)? {
                SyncOutcome::Added
            } else {
                SyncOutcome::AlreadyPresent
            }
        } else if self.index.remove_entity(&task.entity, &task.language)? {
            SyncOutcome::Removed
        } else {
            SyncOutcome::AlreadyAbsent
        };
        debug!(%task, ?outcome, "synced");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingo_store::InMemoryKeyValueStore;
    use lingo_types::{AttributeMap, EntityRef, Language};

    fn setup() -> Synchronizer {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        Synchronizer::new(BlobStore::new(kv.clone()), Arc::new(LanguageIndex::new(kv)))
    }

    fn task(id: &str, tag: &str) -> SyncTask {
        SyncTask::new(
            EntityRef::new("App\\Article", id).unwrap(),
            Language::new(tag).unwrap(),
        )
    }

    fn title(value: &str) -> AttributeMap {
        AttributeMap::new().with("title", value)
    }

    #[test]
    fn sync_adds_entity_with_blob() {
        let sync = setup();
        let t = task("1", "en");
        sync.blobs().store(&t.entity, &t.language, &title("Hello")).unwrap();

        assert_eq!(sync.sync(&t).unwrap(), SyncOutcome::Added);
        assert_eq!(
            sync.index().entities_in_language("App\\Article", &t.language).unwrap(),
            vec!["1"]
        );
    }

    #[test]
    fn repeated_sync_is_a_noop() {
        let sync = setup();
        let t = task("1", "en");
        sync.blobs().store(&t.entity, &t.language, &title("Hello")).unwrap();

        sync.sync(&t).unwrap();
        let before = sync.index().record(&t.language).unwrap();
        for _ in 0..3 {
            let outcome = sync.sync(&t).unwrap();
            assert_eq!(outcome, SyncOutcome::AlreadyPresent);
            assert!(!outcome.changed());
        }
        assert_eq!(sync.index().record(&t.language).unwrap(), before);
        assert_eq!(
            sync.index().entities_in_language("App\\Article", &t.language).unwrap(),
            vec!["1"]
        );
    }

    #[test]
    fn sync_removes_entity_after_delete() {
        let sync = setup();
        let t = task("1", "en");
        sync.blobs().store(&t.entity, &t.language, &title("Hello")).unwrap();
        sync.sync(&t).unwrap();

        sync.blobs().delete_all(&t.entity).unwrap();
        assert_eq!(sync.sync(&t).unwrap(), SyncOutcome::Removed);
        assert!(sync.index().languages().unwrap().is_empty());
    }

    #[test]
    fn stale_task_cannot_resurrect_deleted_entity() {
        let sync = setup();
        let t = task("1", "en");

        // A store and a delete happen back to back; both tasks arrive late
        // and in reverse order.
        sync.blobs().store(&t.entity, &t.language, &title("Hello")).unwrap();
        let store_task = t.clone();
        sync.blobs().delete_all(&t.entity).unwrap();
        let delete_task = t.clone();

        sync.sync(&delete_task).unwrap();
        let outcome = sync.sync(&store_task).unwrap();
        assert!(!outcome.is_present());
        assert!(sync.index().record(&t.language).unwrap().is_empty());
    }

    #[test]
    fn sync_without_blob_is_absent() {
        let sync = setup();
        assert_eq!(sync.sync(&task("7", "fr")).unwrap(), SyncOutcome::AlreadyAbsent);
    }
}
