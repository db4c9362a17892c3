//! The JSON file driver: blob store, language index, and sync queue wired
//! together.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use lingo_index::{LanguageIndex, RebuildReport};
use lingo_store::{BlobStore, FsKeyValueStore, KeyValueStore};
use lingo_sync::{
    ChannelQueue, InlineQueue, JournaledQueue, RecordingQueue, SyncWorker, Synchronizer, TaskQueue,
};
use lingo_types::{AttributeMap, EntityRef, Language, SyncTask};
use tracing::{debug, info};

use crate::config::{IndexMode, QueueKind, TranslationConfig};
use crate::contract::TranslationDriver;
use crate::error::DriverResult;

/// Translation driver persisting one JSON file per (entity, language) and
/// a per-language index under `meta/`.
///
/// Every mutation writes the blob first and only then queues one
/// [`SyncTask`] per language it touched, so the index converges on what
/// storage holds once the queue is drained.
pub struct JsonTranslationDriver {
    synchronizer: Synchronizer,
    queue: Arc<dyn TaskQueue>,
    mode: IndexMode,
}

impl JsonTranslationDriver {
    /// Assemble a driver from its parts. `queue` must feed `synchronizer`
    /// (directly or through a worker) for the index to stay current.
    pub fn from_parts(synchronizer: Synchronizer, queue: Arc<dyn TaskQueue>, mode: IndexMode) -> Self {
        Self {
            synchronizer,
            queue,
            mode,
        }
    }

    /// A driver whose index is updated before each mutation returns.
    pub fn inline(backend: Arc<dyn KeyValueStore>, mode: IndexMode) -> Self {
        let synchronizer = synchronizer_for(backend);
        let queue = Arc::new(InlineQueue::new(synchronizer.clone()));
        Self::from_parts(synchronizer, queue, mode)
    }

    /// A driver whose sync tasks go to the returned worker.
    pub fn channel(backend: Arc<dyn KeyValueStore>, mode: IndexMode) -> (Self, SyncWorker) {
        let synchronizer = synchronizer_for(backend);
        let (queue, receiver) = ChannelQueue::unbounded();
        let worker = SyncWorker::new(receiver, synchronizer.clone());
        (Self::from_parts(synchronizer, Arc::new(queue), mode), worker)
    }

    /// Like [`Self::channel`], journaling tasks at `journal_path`. Tasks
    /// left unacknowledged by a previous run are queued for the worker
    /// straight away.
    pub fn journaled(
        backend: Arc<dyn KeyValueStore>,
        mode: IndexMode,
        journal_path: &Path,
    ) -> DriverResult<(Self, SyncWorker)> {
        let synchronizer = synchronizer_for(backend);
        let (queue, receiver) = JournaledQueue::open(journal_path)?;
        queue.recover()?;
        let worker = SyncWorker::new(receiver, synchronizer.clone());
        Ok((Self::from_parts(synchronizer, Arc::new(queue), mode), worker))
    }

    /// A driver whose sync tasks are only recorded, never applied.
    pub fn recording(backend: Arc<dyn KeyValueStore>, mode: IndexMode) -> (Self, Arc<RecordingQueue>) {
        let synchronizer = synchronizer_for(backend);
        let queue = Arc::new(RecordingQueue::new());
        (Self::from_parts(synchronizer, queue.clone(), mode), queue)
    }

    /// Open the driver described by `config` over the filesystem.
    ///
    /// Returns the worker to run when the configured queue needs one.
    pub fn open(config: &TranslationConfig) -> DriverResult<(Self, Option<SyncWorker>)> {
        let backend: Arc<dyn KeyValueStore> = Arc::new(FsKeyValueStore::open(&config.json.base_path)?);
        let mode = config.json.index_mode;
        let opened = match config.queue.kind {
            QueueKind::Inline => (Self::inline(backend, mode), None),
            QueueKind::Channel => {
                let (driver, worker) = Self::channel(backend, mode);
                (driver, Some(worker))
            }
            QueueKind::Journaled => {
                let (driver, worker) = Self::journaled(backend, mode, &config.journal_path())?;
                (driver, Some(worker))
            }
        };
        info!(
            base_path = %config.json.base_path.display(),
            mode = ?mode,
            queue = opened.0.queue.kind(),
            "opened json translation driver"
        );
        Ok(opened)
    }

    pub fn blobs(&self) -> &BlobStore {
        self.synchronizer.blobs()
    }

    pub fn index(&self) -> &Arc<LanguageIndex> {
        self.synchronizer.index()
    }

    /// The reconcile primitive this driver's queue feeds.
    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    pub fn mode(&self) -> IndexMode {
        self.mode
    }

    pub fn queue_kind(&self) -> &'static str {
        self.queue.kind()
    }

    /// Recompute the index entries of `entity_types` from the blobs.
    pub fn rebuild_index<S: AsRef<str>>(&self, entity_types: &[S]) -> DriverResult<RebuildReport> {
        Ok(self.index().rebuild(self.blobs(), entity_types)?)
    }

    fn enqueue<I>(&self, entity: &EntityRef, languages: I) -> DriverResult<()>
    where
        I: IntoIterator<Item = Language>,
    {
        for language in languages {
            self.queue.dispatch(SyncTask::new(entity.clone(), language))?;
        }
        Ok(())
    }
}

fn synchronizer_for(backend: Arc<dyn KeyValueStore>) -> Synchronizer {
    let index = Arc::new(LanguageIndex::new(backend.clone()));
    Synchronizer::new(BlobStore::new(backend), index)
}

impl TranslationDriver for JsonTranslationDriver {
    fn name(&self) -> &str {
        "json"
    }

    fn store(&self, entity: &EntityRef, language: &Language, attributes: &AttributeMap) -> DriverResult<()> {
        self.blobs().store(entity, language, attributes)?;
        self.enqueue(entity, [language.clone()])
    }

    fn get(&self, entity: &EntityRef, language: &Language) -> DriverResult<AttributeMap> {
        Ok(self.blobs().get(entity, language)?)
    }

    fn get_many(
        &self,
        entities: &[EntityRef],
        language: &Language,
    ) -> DriverResult<BTreeMap<String, AttributeMap>> {
        Ok(self.blobs().get_many(entities, language)?)
    }

    fn available_languages(&self, entity: &EntityRef) -> DriverResult<Vec<Language>> {
        Ok(self.blobs().available_languages(entity)?)
    }

    fn models_available_in_language(&self, entity_type: &str, language: &Language) -> DriverResult<Vec<String>> {
        let ids = match self.mode {
            IndexMode::Indexed => self.index().entities_in_language(entity_type, language)?,
            IndexMode::Scan => self.blobs().scan_language(entity_type, language)?,
        };
        debug!(entity_type, %language, mode = ?self.mode, count = ids.len(), "models available");
        Ok(ids)
    }

    fn put(&self, entity: &EntityRef, language: &Language, attributes: &AttributeMap) -> DriverResult<()> {
        self.blobs().put(entity, language, attributes)?;
        self.enqueue(entity, [language.clone()])
    }

    fn patch(&self, entity: &EntityRef, language: &Language, attributes: &AttributeMap) -> DriverResult<()> {
        self.blobs().patch(entity, language, attributes)?;
        self.enqueue(entity, [language.clone()])
    }

    fn delete_all(&self, entity: &EntityRef) -> DriverResult<()> {
        let removed = self.blobs().delete_all(entity)?;
        self.enqueue(entity, removed)
    }

    fn delete_languages(&self, entity: &EntityRef, languages: &[Language]) -> DriverResult<()> {
        self.blobs().delete_languages(entity, languages)?;
        self.enqueue(entity, languages.iter().cloned())
    }

    fn delete_attributes(
        &self,
        entity: &EntityRef,
        attributes: &[&str],
        language: Option<&Language>,
    ) -> DriverResult<()> {
        let touched = self.blobs().delete_attributes(entity, attributes, language)?;
        self.enqueue(entity, touched)
    }
}

impl std::fmt::Debug for JsonTranslationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonTranslationDriver")
            .field("mode", &self.mode)
            .field("queue", &self.queue.kind())
            .finish_non_exhaustive()
    }
}
