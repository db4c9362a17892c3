use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::EntityRef;
use crate::error::TypeError;
use crate::language::Language;

/// A request to reconcile the language index for one (entity, language) pair.
///
/// Tasks carry no delta: executing one recomputes index membership from the
/// current blob, so duplicates and reordering are harmless. On the queue
/// boundary a task is the flat record `{entityType, entityId, language}`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TaskRecord", into = "TaskRecord")]
pub struct SyncTask {
    pub entity: EntityRef,
    pub language: Language,
}

/// Flat wire shape of a [`SyncTask`].
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRecord {
    entity_type: String,
    entity_id: String,
    language: String,
}

impl SyncTask {
    pub fn new(entity: EntityRef, language: Language) -> Self {
        Self { entity, language }
    }
}

impl TryFrom<TaskRecord> for SyncTask {
    type Error = TypeError;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            entity: EntityRef::new(record.entity_type, record.entity_id)?,
            language: Language::new(record.language)?,
        })
    }
}

impl From<SyncTask> for TaskRecord {
    fn from(task: SyncTask) -> Self {
        Self {
            entity_type: task.entity.entity_type().to_string(),
            entity_id: task.entity.entity_id().to_string(),
            language: task.language.into(),
        }
    }
}

impl fmt::Debug for SyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncTask({} @ {})", self.entity, self.language)
    }
}

impl fmt::Display for SyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity, self.language)
    }
}
