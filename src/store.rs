//! Settings store collaborators.
//!
//! Preferences live outside the synthesis engine. The engine reads them by
//! key and writes back only the lazily generated control-plane secret.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::fs_atomic;

/// Key-value settings persistence.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = io::Result<Option<Value>>> + Send;

    /// Stores `value` durably before returning.
    fn set(&self, key: &str, value: Value) -> impl Future<Output = io::Result<()>> + Send;
}

// ============================================================================
// JSON File Store
// ============================================================================

/// Settings kept as one JSON object on disk.
///
/// Every `set` rewrites the whole file through a sibling temporary file, so
/// a crash mid-write leaves the previous settings readable.
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let values = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Map::new(),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e),
        };
        debug!("Opened settings store {} ({} keys)", path.display(), values.len());
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, values: &Map<String, Value>) -> io::Result<()> {
        let content = serde_json::to_vec_pretty(values)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let _guard = fs_atomic::lock_path(&self.path).await;
        fs_atomic::replace_file(&self.path, &content).await
    }
}

impl SettingsStore for JsonFileStore {
    async fn get(&self, key: &str) -> io::Result<Option<Value>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> io::Result<()> {
        let mut values = self.values.lock().await;
        let previous = values.insert(key.to_string(), value);
        if let Err(e) = self.persist(&values).await {
            match previous {
                Some(previous) => values.insert(key.to_string(), previous),
                None => values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}

// ============================================================================
// Memory Store
// ============================================================================

/// Non-persistent store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            values: Mutex::new(values.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }
}

impl SettingsStore for MemoryStore {
    async fn get(&self, key: &str) -> io::Result<Option<Value>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> io::Result<()> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}
