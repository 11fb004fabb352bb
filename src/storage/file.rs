//! Directory-backed `KeyValueStore`.
//!
//! DESIGN
//! ======
//! Each key maps to `<dir>/<key>.json`. Every write goes to its own
//! uniquely named temp file in the same directory, is synced, then renamed
//! over the target. Readers see either the old value or the new one, never
//! a torn write, even with concurrent writers to one key. A failed rename
//! removes its temp file. The directory is created lazily on the first
//! write.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use super::{KeyValueStore, StoreError, validate_key};

#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        std::fs::create_dir_all(&self.dir)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(key)).map_err(|e| StoreError::Io(e.error))?;
        debug!(key, bytes = value.len(), "storage: value written");
        Ok(())
    }
}

#[cfg(test)]
#[path = "file_test.rs"]
mod tests;
