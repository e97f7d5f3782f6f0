//! File system paths.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths under `~/.portal`.
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.portal`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".portal"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.portal).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.portal/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Backing file for the persistent credential scope (~/.portal/credentials.json).
    pub fn credentials_file(&self) -> PathBuf {
        self.base_dir.join("credentials.json")
    }

    /// Get the logs directory (~/.portal/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file (~/.portal/logs/portal.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("portal.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_layout() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/portal-test"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/portal-test/config.json"));
        assert_eq!(
            paths.credentials_file(),
            PathBuf::from("/tmp/portal-test/credentials.json")
        );
        assert_eq!(
            paths.log_file(),
            PathBuf::from("/tmp/portal-test/logs/portal.jsonl")
        );
    }

    #[test]
    fn test_ensure_dirs_creates_tree() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("nested"));
        paths.ensure_dirs().unwrap();
        assert!(paths.base_dir().exists());
        assert!(paths.logs_dir().exists());
    }
}
