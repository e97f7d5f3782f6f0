//! File-backed storage for the persistent scope.

use crate::{ScopeStorage, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Stores all keys as one JSON object in a single file.
///
/// Every write rewrites the whole file through a temp file and a rename, so a
/// crash mid-write leaves either the old or the new contents on disk.
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StorageResult<BTreeMap<String, String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(err) => return Err(err.into()),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            StorageError::Encoding(format!("{}: {}", self.path.display(), e))
        })
    }

    /// Load for a read-modify-write cycle. A corrupt file is replaced rather
    /// than blocking every future write.
    fn load_for_write(&self) -> StorageResult<BTreeMap<String, String>> {
        match self.load() {
            Err(StorageError::Encoding(reason)) => {
                warn!(reason = %reason, "Discarding unreadable credential file");
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    fn persist(&self, data: &BTreeMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;
        std::fs::write(&tmp_path, content)?;
        restrict_permissions(&tmp_path);
        std::fs::rename(&tmp_path, &self.path)?;

        debug!(path = %self.path.display(), keys = data.len(), "Persisted credential file");
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(err) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        warn!(path = %path.display(), error = %err, "Failed to tighten credential file permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

impl ScopeStorage for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock();
        let mut data = self.load_for_write()?;
        data.insert(key.to_string(), value.to_string());
        self.persist(&data)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.load()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let _guard = self.write_lock.lock();
        let mut data = self.load_for_write()?;
        let existed = data.remove(key).is_some();
        if existed {
            self.persist(&data)?;
        }
        Ok(existed)
    }
}
