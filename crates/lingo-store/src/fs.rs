//! Filesystem-backed key-value store.
//!
//! Every key maps to a file below the root directory (`a/1/en.json` ->
//! `<root>/a/1/en.json`). Writes go to a temporary file in the destination
//! directory which is then renamed over the target, so readers see either
//! the old or the new value. Deletes prune an entity directory left empty;
//! the top-level type and `meta/` directories are shared by concurrent
//! writers and are never removed.
//!
//! [`KeyValueStore::locked`] takes an advisory lock on a dot-file next to the
//! key (`meta/.en.json.lock`), so read-modify-write cycles exclude each other
//! across processes as well as across threads.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fd_lock::RwLock;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::keys::validate_key;
use crate::traits::KeyValueStore;

/// Key-value store rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsKeyValueStore {
    root: PathBuf,
}

impl FsKeyValueStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        debug!(root = %root.display(), "opened filesystem store");
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, part| path.join(part)))
    }

    /// Remove empty directories from `dir` upwards, stopping above depth
    /// [`MIN_PRUNE_DEPTH`] so top-level namespaces survive.
    fn prune_empty_dirs(&self, mut dir: Option<&Path>) {
        while let Some(current) = dir {
            let Ok(relative) = current.strip_prefix(&self.root) else {
                break;
            };
            if relative.components().count() < MIN_PRUNE_DEPTH {
                break;
            }
            // Fails (harmlessly) as soon as a directory still has entries.
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }

    fn temp_file_in(&self, dir: &Path) -> io::Result<NamedTempFile> {
        in_existing_dir(dir, || tempfile::Builder::new().prefix(".tmp").tempfile_in(dir))
    }

    fn lock_file_for(&self, path: &Path) -> StoreResult<File> {
        let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
            return Err(StoreError::invalid_key(&path.display().to_string(), "key has no file name"));
        };
        let lock_path = dir.join(format!(".{}.lock", name.to_string_lossy()));
        let file = in_existing_dir(dir, || {
            OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)
        })?;
        Ok(file)
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect();
        Some(parts?.join("/"))
    }
}

impl KeyValueStore for FsKeyValueStore {
    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::invalid_key(key, "key has no parent directory"))?;

        let mut tmp = self.temp_file_in(parent)?;
        tmp.write_all(value)?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                self.prune_empty_dirs(path.parent());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        // Walk only the deepest directory the prefix names fully.
        let walk_root = match prefix.rfind('/') {
            Some(idx) => self.path_for(&prefix[..idx])?,
            None => self.root.clone(),
        };
        if !walk_root.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&walk_root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::NotFound) => {
                    // Concurrently deleted while walking.
                    continue;
                }
                Err(e) => return Err(io::Error::other(e).into()),
            };
            if !entry.file_type().is_file() {
                continue;
            }
            // In-flight temporary files from `write`.
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            match self.key_for(entry.path()) {
                Some(key) if key.starts_with(prefix) => keys.push(key),
                Some(_) => {}
                None => warn!(path = %entry.path().display(), "skipping non UTF-8 path"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn locked(
        &self,
        key: &str,
        critical: &mut dyn FnMut() -> StoreResult<()>,
    ) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let mut lock = RwLock::new(self.lock_file_for(&path)?);
        let _guard = lock.write()?;
        critical()
    }
}

/// Entity directories (`<type>/<id>`) and deeper are pruned when empty.
const MIN_PRUNE_DEPTH: usize = 2;

/// Attempts at re-creating a directory a concurrent delete just pruned.
const DIR_RETRIES: usize = 8;

/// Run `op` inside `dir`, creating the directory first and again whenever
/// `op` reports it missing.
fn in_existing_dir<T>(dir: &Path, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut attempt = 0;
    loop {
        fs::create_dir_all(dir)?;
        match op() {
            Err(e) if e.kind() == io::ErrorKind::NotFound && attempt < DIR_RETRIES => {
                attempt += 1;
                debug!(dir = %dir.display(), attempt, "directory pruned under us, retrying");
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, FsKeyValueStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKeyValueStore::open(dir.path().join("translations")).unwrap();
        (dir, store)
    }

    #[test]
    fn write_read_roundtrip() {
        let (_dir, store) = temp_store();
        store.write("app-article/1/en.json", br#"{"title":"Hi"}"#).unwrap();

        let bytes = store.read("app-article/1/en.json").unwrap().unwrap();
        assert_eq!(bytes, br#"{"title":"Hi"}"#);
        assert!(store.root().join("app-article/1/en.json").is_file());
    }

    #[test]
    fn overwrite_replaces_content() {
        let (_dir, store) = temp_store();
        store.write("k/v.json", b"first").unwrap();
        store.write("k/v.json", b"second").unwrap();
        assert_eq!(store.read("k/v.json").unwrap().unwrap(), b"second");
        assert_eq!(store.list("k/").unwrap(), vec!["k/v.json"]);
    }

    #[test]
    fn read_missing_returns_none() {
        let (_dir, store) = temp_store();
        assert!(store.read("missing/1/en.json").unwrap().is_none());
        assert!(!store.exists("missing/1/en.json").unwrap());
    }

    #[test]
    fn delete_prunes_empty_directories() {
        let (_dir, store) = temp_store();
        store.write("app-article/1/en.json", b"{}").unwrap();
        store.write("app-article/2/en.json", b"{}").unwrap();

        assert!(store.delete("app-article/1/en.json").unwrap());
        assert!(!store.root().join("app-article/1").exists());
        assert!(store.root().join("app-article/2").exists());

        assert!(store.delete("app-article/2/en.json").unwrap());
        assert!(!store.root().join("app-article/2").exists());
        // Top-level namespaces stay for concurrent writers.
        assert!(store.root().join("app-article").is_dir());

        store.write("meta/en.json", b"{}").unwrap();
        assert!(store.delete("meta/en.json").unwrap());
        assert!(store.root().join("meta").is_dir());

        assert!(!store.delete("app-article/2/en.json").unwrap());
    }

    #[test]
    fn list_walks_nested_namespaces() {
        let (_dir, store) = temp_store();
        for key in [
            "app-article/1/en.json",
            "app-article/1/fr.json",
            "app-article/10/en.json",
            "app-comment/1/en.json",
            "meta/en.json",
        ] {
            store.write(key, b"{}").unwrap();
        }

        assert_eq!(
            store.list("app-article/").unwrap(),
            vec!["app-article/1/en.json", "app-article/1/fr.json", "app-article/10/en.json"]
        );
        assert_eq!(
            store.list("app-article/1/").unwrap(),
            vec!["app-article/1/en.json", "app-article/1/fr.json"]
        );
        assert_eq!(store.list("").unwrap().len(), 5);
        assert!(store.list("nothing/").unwrap().is_empty());
    }

    #[test]
    fn list_skips_hidden_temp_files() {
        let (_dir, store) = temp_store();
        store.write("a/1/en.json", b"{}").unwrap();
        fs::write(store.root().join("a/1/.tmpdead"), b"partial").unwrap();
        assert_eq!(store.list("a/").unwrap(), vec!["a/1/en.json"]);
    }

    #[test]
    fn writes_survive_concurrent_pruning() {
        let (_dir, store) = temp_store();
        let store = std::sync::Arc::new(store);

        // Each thread owns one language of one entity; every delete empties
        // the shared entity directory that the other threads write into.
        let handles: Vec<_> = ["en", "fr", "de", "it"]
            .into_iter()
            .map(|language| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let key = format!("app-article/1/{language}.json");
                    for _ in 0..300 {
                        store.write(&key, b"{}").unwrap();
                        assert!(store.delete(&key).unwrap());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(store.list("").unwrap().is_empty());
        assert!(!store.root().join("app-article/1").exists());
    }

    #[test]
    fn locked_sections_exclude_each_other() {
        let (_dir, store) = temp_store();
        store.write("meta/en.json", b"0").unwrap();

        // Separate handles open separate lock files, as separate processes do.
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = FsKeyValueStore::open(store.root()).unwrap();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store
                            .locked("meta/en.json", &mut || {
                                let bytes = store.read("meta/en.json")?.unwrap_or_default();
                                let n: u32 = String::from_utf8_lossy(&bytes).parse().unwrap_or(0);
                                store.write("meta/en.json", (n + 1).to_string().as_bytes())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.read("meta/en.json").unwrap().unwrap(), b"200");
        assert!(store.root().join("meta/.en.json.lock").is_file());
        assert_eq!(store.list("meta/").unwrap(), vec!["meta/en.json"]);
    }

    #[test]
    fn escaping_keys_are_rejected() {
        let (_dir, store) = temp_store();
        assert!(store.write("../outside.json", b"x").is_err());
        assert!(store.read("/etc/passwd").is_err());
    }

    #[test]
    fn reopen_sees_existing_data() {
        let (dir, store) = temp_store();
        store.write("meta/en.json", b"{}").unwrap();
        drop(store);

        let reopened = FsKeyValueStore::open(dir.path().join("translations")).unwrap();
        assert!(reopened.exists("meta/en.json").unwrap());
    }
}
