// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use crate::errors::PersistError;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// String key-value store shared by the request cache and by anything else
/// that persists small values (theme, last viewport).
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    fn remove(&self, key: &str);
}

/// Lives for the process, the equivalent of a browser session store.
#[derive(Debug, Default)]
pub struct SessionBackend {
    values: DashMap<String, String>,
}

impl SessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl KvBackend for SessionBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.values.remove(key);
    }
}

/// Profile scoped store, one file per key under a directory.
///
/// File names are a seahash of the key so arbitrary URLs are safe to use.
/// I/O failures are logged and behave like a miss.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| PersistError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{:016x}.kv", crate::stable_hash(key)))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let path = self.path_for(key);
        let temp_path = path.with_extension("kv.tmp");

        std::fs::write(&temp_path, value).map_err(|source| PersistError::Io {
            path: temp_path.clone(),
            source,
        })?;
        std::fs::rename(&temp_path, &path).map_err(|source| PersistError::Io { path, source })?;

        Ok(())
    }
}

impl KvBackend for FileBackend {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Some(value),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                warn!("{}", PersistError::Io { path, source });
                None
            }
        }
    }

    fn set(&self, key: &str, value: String) {
        if let Err(e) = self.write(key, &value) {
            warn!("failed to persist {}: {}", key, e);
        }
    }

    fn remove(&self, key: &str) {
        let path = self.path_for(key);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("{}", PersistError::Io { path, source: e });
            }
        }
    }
}
