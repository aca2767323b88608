//! Durable local storage.
//!
//! A small key/value store persisted as one JSON document under the data
//! directory, plus a transient in-memory session area and a namespaced cache
//! directory. Each domain owns one fixed [`StorageKey`]; free-form keys live
//! under [`KEY_PREFIX`].
//!
//! Writes go through a temp file and a rename while holding an exclusive
//! `fs2` lock on a sidecar lock file, so two CLI processes never interleave a
//! partial document.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::StorageError;

/// Prefix for free-form keys removed by [`Storage::clear_all`].
pub const KEY_PREFIX: &str = "sprintboard:";

/// Cache entries whose file name contains this are removed by [`Storage::clear_all`].
pub const NAMESPACE: &str = "sprintboard";

const STORAGE_FILE: &str = "storage.json";
const LOCK_FILE: &str = "storage.lock";

/// One durable key per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    AuthSession,
    ProjectCache,
    SprintCache,
    Theme,
    Language,
    Chat,
    Template,
    Tag,
    Activity,
    Settings,
}

impl StorageKey {
    pub const ALL: [StorageKey; 10] = [
        StorageKey::AuthSession,
        StorageKey::ProjectCache,
        StorageKey::SprintCache,
        StorageKey::Theme,
        StorageKey::Language,
        StorageKey::Chat,
        StorageKey::Template,
        StorageKey::Tag,
        StorageKey::Activity,
        StorageKey::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthSession => "auth-storage",
            Self::ProjectCache => "project-storage",
            Self::SprintCache => "sprint-storage",
            Self::Theme => "theme-storage",
            Self::Language => "language-storage",
            Self::Chat => "chat-storage",
            Self::Template => "template-storage",
            Self::Tag => "tag-storage",
            Self::Activity => "activity-storage",
            Self::Settings => "settings-storage",
        }
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a bulk clear removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClearReport {
    pub durable_keys: usize,
    pub session_keys: usize,
    pub cache_entries: usize,
}

pub struct Storage {
    /// `None` keeps everything in memory.
    dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    durable: Mutex<BTreeMap<String, Value>>,
    session: Mutex<HashMap<String, Value>>,
}

impl Storage {
    /// Open (or create) storage rooted at `data_dir`, with cache entries under `cache_dir`.
    ///
    /// A corrupt storage document is moved aside and storage starts empty.
    pub fn open(data_dir: &Path, cache_dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(data_dir).map_err(|source| StorageError::Io {
            path: data_dir.to_path_buf(),
            source,
        })?;
        let file = data_dir.join(STORAGE_FILE);
        let durable = if file.exists() {
            let content = fs::read_to_string(&file).map_err(|source| StorageError::Io {
                path: file.clone(),
                source,
            })?;
            match serde_json::from_str::<BTreeMap<String, Value>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    let aside = data_dir.join(format!("{}.corrupt", STORAGE_FILE));
                    warn!(path = %file.display(), error = %e, "discarding corrupt storage file");
                    let _ = fs::rename(&file, &aside);
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            dir: Some(data_dir.to_path_buf()),
            cache_dir: Some(cache_dir.to_path_buf()),
            durable: Mutex::new(durable),
            session: Mutex::new(HashMap::new()),
        })
    }

    /// Storage that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            cache_dir: None,
            durable: Mutex::new(BTreeMap::new()),
            session: Mutex::new(HashMap::new()),
        }
    }

    /// Read and decode a durable value. Undecodable values read as absent.
    pub fn get<T: DeserializeOwned>(&self, key: StorageKey) -> Option<T> {
        let value = self.get_raw(key.as_str())?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key = %key, error = %e, "ignoring undecodable stored value");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: StorageKey, value: &T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value).map_err(|source| StorageError::Encode {
            key: key.as_str().to_string(),
            source,
        })?;
        self.set_raw(key.as_str(), value)
    }

    pub fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        self.remove_raw(key.as_str())
    }

    fn durable_map(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.durable.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn session_map(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get_raw(&self, name: &str) -> Option<Value> {
        self.durable_map().get(name).cloned()
    }

    pub fn set_raw(&self, name: &str, value: Value) -> Result<(), StorageError> {
        let mut map = self.durable_map();
        map.insert(name.to_string(), value);
        self.flush(&map)
    }

    pub fn remove_raw(&self, name: &str) -> Result<(), StorageError> {
        let mut map = self.durable_map();
        if map.remove(name).is_some() {
            self.flush(&map)?;
        }
        Ok(())
    }

    /// All durable key names, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.durable_map().keys().cloned().collect()
    }

    pub fn session_get(&self, name: &str) -> Option<Value> {
        self.session_map().get(name).cloned()
    }

    pub fn session_set(&self, name: &str, value: Value) {
        self.session_map().insert(name.to_string(), value);
    }

    /// Remove every domain key, every prefixed key, all session values and
    /// every namespaced cache entry.
    pub fn clear_all(&self) -> Result<ClearReport, StorageError> {
        let mut report = ClearReport::default();
        {
            let mut map = self.durable_map();
            let before = map.len();
            for key in StorageKey::ALL {
                map.remove(key.as_str());
            }
            map.retain(|name, _| !name.starts_with(KEY_PREFIX));
            report.durable_keys = before - map.len();
            self.flush(&map)?;
        }
        {
            let mut session = self.session_map();
            report.session_keys = session.len();
            session.clear();
        }
        if let Some(dir) = &self.cache_dir {
            report.cache_entries = clear_namespaced_entries(dir)?;
        }
        debug!(?report, "cleared local storage");
        Ok(report)
    }

    fn flush(&self, map: &BTreeMap<String, Value>) -> Result<(), StorageError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StorageError::Io { path, source }
        };

        let lock_path = dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(io_err(&lock_path))?;
        lock.lock_exclusive().map_err(io_err(&lock_path))?;

        let file = dir.join(STORAGE_FILE);
        let tmp = dir.join(format!("{}.tmp", STORAGE_FILE));
        let content = serde_json::to_vec_pretty(map).map_err(|source| StorageError::Encode {
            key: STORAGE_FILE.to_string(),
            source,
        })?;
        let result = fs::write(&tmp, content)
            .and_then(|_| fs::rename(&tmp, &file))
            .map_err(io_err(&file));

        let _ = FileExt::unlock(&lock);
        result
    }
}

fn clear_namespaced_entries(dir: &Path) -> Result<usize, StorageError> {
    if !dir.exists() {
        return Ok(0);
    }
    let io_err = |source| StorageError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut removed = 0;
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_name().to_string_lossy().contains(NAMESPACE) {
            continue;
        }
        let path = entry.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|source| StorageError::Io {
            path: path.clone(),
            source,
        })?;
        removed += 1;
    }
    Ok(removed)
}
