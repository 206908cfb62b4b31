//! File-backed configuration storage.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use racs_core::error::StorageError;
use racs_core::hal::ConfigStore;

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load_bytes(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                tracing::error!(path = %self.path.display(), "config read failed: {e}");
                return Err(StorageError::ReadFailed);
            }
        };
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }

    fn store_bytes(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        fs::write(&self.path, bytes).map_err(|e| {
            tracing::error!(path = %self.path.display(), "config write failed: {e}");
            StorageError::WriteFailed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use racs_core::config::{load_or_default, save_config, ConfigLoad};
    use racs_core::ControlConfig;

    #[test]
    fn test_missing_file_self_heals() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileConfigStore::new(dir.path().join("config.bin"));

        let (config, load) = load_or_default(&mut store).unwrap();
        assert_eq!(config, ControlConfig::default());
        assert!(matches!(load, ConfigLoad::RestoredDefaults(_)));
        assert!(store.path().exists());

        let (_, load) = load_or_default(&mut store).unwrap();
        assert_eq!(load, ConfigLoad::Loaded);
    }

    #[test]
    fn test_saved_config_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.bin");
        let mut config = ControlConfig::default();
        config.roll.kd = 0.75;
        save_config(&mut FileConfigStore::new(&path), &config).unwrap();

        let (loaded, load) = load_or_default(&mut FileConfigStore::new(&path)).unwrap();
        assert_eq!(load, ConfigLoad::Loaded);
        assert_eq!(loaded.roll.kd, 0.75);
    }

    #[test]
    fn test_corrupt_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.bin");
        fs::write(&path, b"garbage").unwrap();

        let (config, load) = load_or_default(&mut FileConfigStore::new(&path)).unwrap();
        assert_eq!(config, ControlConfig::default());
        assert!(matches!(load, ConfigLoad::RestoredDefaults(_)));
    }

    #[test]
    fn test_unwritable_path_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileConfigStore::new(dir.path().join("missing").join("config.bin"));
        assert_eq!(store.store_bytes(&[1, 2, 3]), Err(StorageError::WriteFailed));
    }
}
