use crate::error::StoreResult;

/// Generic key-value boundary the blob store and language index persist
/// through.
///
/// Keys are relative, `/`-separated paths (`app-article/7/en.json`). All
/// implementations must satisfy these invariants:
/// - `read` of a missing key is `Ok(None)`, never an error.
/// - `write` fully replaces the value; readers never observe a partial write.
/// - `delete` of a missing key is `Ok(false)`, never an error.
/// - `list` returns every key that starts with `prefix`, sorted.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored at `key`.
    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Create or overwrite the value at `key`.
    fn write(&self, key: &str, value: &[u8]) -> StoreResult<()>;

    /// Delete `key`. Returns `true` if it existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// All keys starting with `prefix`, in sorted order.
    fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Check whether `key` exists.
    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.read(key)?.is_some())
    }

    /// Read several keys in one call.
    ///
    /// Default implementation calls `read()` for each key. Backends may
    /// override for fewer round-trips.
    fn read_batch(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|key| self.read(key)).collect()
    }

    /// Run `critical` while holding an exclusive lock on `key`.
    ///
    /// Used for read-modify-write cycles. The default takes no lock, which
    /// is enough for backends that live in a single process and whose
    /// callers already serialize through their own mutex. Backends shared
    /// between processes must override this.
    fn locked(
        &self,
        key: &str,
        critical: &mut dyn FnMut() -> StoreResult<()>,
    ) -> StoreResult<()> {
        let _ = key;
        critical()
    }

    /// Delete every key under `prefix`. Returns the number of keys removed.
    fn delete_prefix(&self, prefix: &str) -> StoreResult<usize> {
        let mut removed = 0;
        for key in self.list(prefix)? {
            if self.delete(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
