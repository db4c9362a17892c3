use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, DriverResult};

/// How `models_available_in_language` is answered by the JSON driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// Read the language index. Fast; stale until pending sync tasks run.
    #[default]
    Indexed,
    /// Scan the blob namespace of the type. Always current; linear cost.
    Scan,
}

/// Which task queue carries sync tasks off the write path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Apply each task before the mutation returns.
    #[default]
    Inline,
    /// Hand tasks to a background worker over a channel.
    Channel,
    /// Like `Channel`, with a crash-safe journal in front.
    Journaled,
}

/// Top-level configuration, usually loaded from `lingo.toml`.
///
/// ```toml
/// driver = "json"
///
/// [json]
/// base_path = "storage/translations"
/// index_mode = "indexed"
///
/// [queue]
/// kind = "journaled"
/// journal_path = "storage/sync.journal"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Name of the default driver. `None` (or `driver = ""` in TOML) means
    /// every lookup must name one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    pub json: JsonConfig,
    pub queue: QueueConfig,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            driver: Some("json".into()),
            json: JsonConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl TranslationConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> DriverResult<Self> {
        toml::from_str(source).map_err(|e| DriverError::Config(e.to_string()))
    }

    /// Read and parse the TOML file at `path`.
    pub fn load(path: &Path) -> DriverResult<Self> {
        let source = fs::read_to_string(path)
            .map_err(|e| DriverError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> DriverResult<String> {
        toml::to_string_pretty(self).map_err(|e| DriverError::Config(e.to_string()))
    }

    /// The configured default driver, if any.
    pub fn default_driver(&self) -> Option<&str> {
        self.driver.as_deref().filter(|name| !name.is_empty())
    }

    /// Where the journaled queue keeps its journal.
    ///
    /// Defaults to a dot-file inside the JSON base path, which blob and
    /// index listings never see.
    pub fn journal_path(&self) -> PathBuf {
        self.queue
            .journal_path
            .clone()
            .unwrap_or_else(|| self.json.base_path.join(".sync.journal"))
    }
}

/// Settings for the JSON driver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawJsonConfig")]
pub struct JsonConfig {
    /// Root directory of the blob and index files.
    pub base_path: PathBuf,
    pub index_mode: IndexMode,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("storage/translations"),
            index_mode: IndexMode::default(),
        }
    }
}

/// On-disk shape of `[json]`. `cache = true|false` is accepted as a
/// shorthand for `index_mode`, which wins when both are present.
#[derive(Deserialize)]
struct RawJsonConfig {
    base_path: Option<PathBuf>,
    index_mode: Option<IndexMode>,
    cache: Option<bool>,
}

impl From<RawJsonConfig> for JsonConfig {
    fn from(raw: RawJsonConfig) -> Self {
        let defaults = JsonConfig::default();
        let index_mode = match (raw.index_mode, raw.cache) {
            (Some(mode), _) => mode,
            (None, Some(true)) => IndexMode::Indexed,
            (None, Some(false)) => IndexMode::Scan,
            (None, None) => defaults.index_mode,
        };
        Self {
            base_path: raw.base_path.unwrap_or(defaults.base_path),
            index_mode,
        }
    }
}

/// Settings for the sync task queue.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub kind: QueueKind,
    /// Journal file for [`QueueKind::Journaled`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_path: Option<PathBuf>,
}
