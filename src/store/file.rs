use super::{KeyValueStore, Update};
use crate::error::{AppError, Result};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// JSON object on disk. Every call re-reads the file under an exclusive lock, so separate
/// processes (`watch` alongside `add`) never overwrite each other's keys.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    #[instrument(name = "Opening local state", skip_all, fields(path = ?path.as_ref()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };

        // Surface a corrupt file now rather than on first use
        let _lock = store.lock()?;
        store.read()?;

        Ok(store)
    }

    /// Exclusive advisory lock on a sibling file, held until the returned handle drops. The
    /// state file itself is replaced by rename, so it cannot carry the lock.
    fn lock(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::StorageUnavailable(format!("Failed to create state directory: {}", e))
            })?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .mode(0o600)
            .open(self.path.with_extension("json.lock"))
            .map_err(|e| AppError::StorageUnavailable(format!("Failed to open state lock: {}", e)))?;

        lock_file
            .lock_exclusive()
            .map_err(|e| AppError::StorageUnavailable(format!("Failed to lock local state: {}", e)))?;

        Ok(lock_file)
    }

    fn read(&self) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                AppError::StorageUnavailable(format!(
                    "Failed to parse local state {:?}: {}",
                    self.path, e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No local state yet");
                Ok(BTreeMap::new())
            }
            Err(e) => Err(AppError::StorageUnavailable(format!(
                "Failed to read local state {:?}: {}",
                self.path, e
            ))),
        }
    }

    /// Write the whole map to a sibling temp file, then rename it over the real one. Must be
    /// called with the lock held.
    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let contents = serde_json::to_string_pretty(entries)?;

        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp_path)
            .map_err(|e| AppError::StorageUnavailable(format!("Failed to open state file: {}", e)))?;

        file.write_all(contents.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| AppError::StorageUnavailable(format!("Failed to write state file: {}", e)))?;

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            AppError::StorageUnavailable(format!("Failed to replace state file: {}", e))
        })?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _lock = self.lock()?;
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(key, &mut |_| Ok(Some(value.to_string())))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(key, &mut |_| Ok(None))
    }

    fn update(&self, key: &str, apply: Update<'_>) -> Result<()> {
        let _lock = self.lock()?;
        let mut entries = self.read()?;

        let current = entries.get(key).cloned();
        let next = apply(current.clone())?;
        if next == current {
            return Ok(());
        }

        match next {
            Some(value) => entries.insert(key.to_string(), value),
            None => entries.remove(key),
        };
        self.flush(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("state.json")).unwrap();
        assert_eq!(store.get("anything").unwrap(), None);
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStore::open(&path).unwrap();
        store.set("selected_sheet_name", "Expenses").unwrap();
        store.set("user_has_signed_in", "true").unwrap();
        store.remove("user_has_signed_in").unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("selected_sheet_name").unwrap(),
            Some("Expenses".to_string())
        );
        assert_eq!(reopened.get("user_has_signed_in").unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        let result = FileStore::open(&path);
        assert!(matches!(result, Err(AppError::StorageUnavailable(_))));
    }

    #[test]
    fn test_failed_write_keeps_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStore::open(&path).unwrap();
        store.set("pending-expenses", "[]").unwrap();

        // A directory where the temp file goes makes the flush fail
        fs::create_dir_all(path.with_extension("json.tmp").join("blocker")).unwrap();
        let result = store.set("pending-expenses", "[1]");

        assert!(matches!(result, Err(AppError::StorageUnavailable(_))));
        assert_eq!(
            store.get("pending-expenses").unwrap(),
            Some("[]".to_string())
        );
    }

    #[test]
    fn test_stores_sharing_a_file_see_each_others_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let watcher = FileStore::open(&path).unwrap();
        let other = FileStore::open(&path).unwrap();

        other.set("pending-expenses", "[\"B\"]").unwrap();
        assert_eq!(
            watcher.get("pending-expenses").unwrap(),
            Some("[\"B\"]".to_string())
        );

        // Writing one key leaves keys written elsewhere alone
        watcher.set("selected_sheet_name", "Expenses").unwrap();
        assert_eq!(
            other.get("pending-expenses").unwrap(),
            Some("[\"B\"]".to_string())
        );
        assert_eq!(
            other.get("selected_sheet_name").unwrap(),
            Some("Expenses".to_string())
        );
    }

    #[test]
    fn test_update_sees_latest_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let first = FileStore::open(&path).unwrap();
        let second = FileStore::open(&path).unwrap();

        first.set("counter", "1").unwrap();
        second
            .update("counter", &mut |current| {
                let n: u32 = current.unwrap_or_default().parse().unwrap_or(0);
                Ok(Some((n + 1).to_string()))
            })
            .unwrap();

        assert_eq!(first.get("counter").unwrap(), Some("2".to_string()));
    }
}
