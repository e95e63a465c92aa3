//! Key/value storage backends

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use wayfinder_core::StorageError;

/// Client-durable key/value store
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Read a value, `None` if the key is absent
    ///
    /// # Errors
    /// Backend-specific read failures
    fn read(&self, key: &StorageKey) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one
    ///
    /// # Errors
    /// Backend-specific write failures, including [`StorageError::QuotaExceeded`]
    fn write(&self, key: &StorageKey, value: &str) -> Result<(), StorageError>;

    /// Remove a value; removing a missing key is not an error
    ///
    /// # Errors
    /// Backend-specific failures
    fn remove(&self, key: &StorageKey) -> Result<(), StorageError>;
}

/// Who persisted state belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Signed-in user
    User(String),
    /// Anonymous browser session
    Session(String),
}

impl fmt::Display for StorageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageScope::User(id) => write!(f, "user:{id}"),
            StorageScope::Session(id) => write!(f, "session:{id}"),
        }
    }
}

/// Fully qualified storage key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// Key of the workflow blob for `scope`
    #[must_use]
    pub fn workflow(namespace: &str, scope: &StorageScope) -> Self {
        Self(format!("{namespace}:workflow:{scope}"))
    }

    /// Raw key string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// In-process storage with an optional byte quota
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    /// Unbounded storage
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes once `quota_bytes` of values are stored
    #[inline]
    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl StorageBackend for MemoryStorage {
    fn read(&self, key: &StorageKey) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key.as_str()).cloned())
    }

    fn write(&self, key: &StorageKey, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key.as_str())
                .map(|(_, v)| v.len())
                .sum();
            let available = quota.saturating_sub(used);
            if value.len() > available {
                return Err(StorageError::QuotaExceeded {
                    needed: value.len(),
                    available,
                });
            }
        }
        entries.insert(key.as_str().to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &StorageKey) -> Result<(), StorageError> {
        self.entries.lock().remove(key.as_str());
        Ok(())
    }
}

/// One JSON file per key under a directory
///
/// Writes go through a temporary file in the same directory and are renamed
/// into place, so a crash never leaves a half-written blob.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `dir`, created if missing
    ///
    /// # Errors
    /// Directory creation failure
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`
    ///
    /// Named by the blake3 hash of the full key, so distinct scopes never
    /// share a file regardless of the characters they contain.
    #[must_use]
    pub fn path_for(&self, key: &StorageKey) -> PathBuf {
        let name = blake3::hash(key.as_str().as_bytes()).to_hex();
        self.dir.join(format!("{name}.json"))
    }
}

impl StorageBackend for FileStorage {
    fn read(&self, key: &StorageKey) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &StorageKey, value: &str) -> Result<(), StorageError> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(key)).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&self, key: &StorageKey) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
