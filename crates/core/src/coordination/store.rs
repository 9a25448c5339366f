// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared key/value state for independent processes
//!
//! The file-backed store persists the whole map as one JSON document guarded
//! by a [`FileLock`]. Every operation runs acquire, load, apply, write back,
//! release; the in-process copy is only a cache used when the lock cannot be
//! obtained for a read.

use super::lock::{lock_path_for, FileLock, LockConfig, LockError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state lock unavailable: {0}")]
    LockUnavailable(#[source] LockError),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<LockError> for StoreError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Io { path, source } => StoreError::Io { path, source },
            other => StoreError::LockUnavailable(other),
        }
    }
}

/// Persisted coordination state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedState {
    pub state_id: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub data: BTreeMap<String, Value>,
}

impl SharedState {
    pub fn new(state_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            state_id: state_id.into(),
            created_at: now,
            last_modified: now,
            data: BTreeMap::new(),
        }
    }

    fn touch(&mut self) {
        self.last_modified = Utc::now();
    }
}

/// String form used by compare-and-swap.
///
/// Strings compare by their raw text and everything else by compact JSON, so
/// `"1"` and `1` are considered equal. An absent key and JSON null both map
/// to the empty string.
pub fn display_form(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Key/value operations shared by the file-backed and in-memory stores
pub trait SharedStateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Read-modify-write under the store lock; returns the new value
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<Value>) -> Value,
    ) -> Result<Value, StoreError>;

    /// Replace the value if its string form matches `expected`'s
    fn compare_and_swap(&self, key: &str, expected: &Value, new: Value)
        -> Result<bool, StoreError>;

    fn remove(&self, key: &str) -> Result<Option<Value>, StoreError>;

    fn get_all(&self) -> Result<BTreeMap<String, Value>, StoreError>;
}

fn apply_cas(state: &mut SharedState, key: &str, expected: &Value, new: Value) -> bool {
    if display_form(state.data.get(key)) != display_form(Some(expected)) {
        return false;
    }
    state.data.insert(key.to_string(), new);
    state.touch();
    true
}

/// Store persisted to a JSON file, safe across processes
#[derive(Debug)]
pub struct FileBackedStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock_config: LockConfig,
    cache: Mutex<BTreeMap<String, Value>>,
}

impl FileBackedStore {
    /// Open the store at `path`, creating an empty state document if none exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with(path, LockConfig::default())
    }

    pub fn open_with(path: impl Into<PathBuf>, lock_config: LockConfig) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let store = Self {
            lock_path: lock_path_for(&path),
            path,
            lock_config,
            cache: Mutex::new(BTreeMap::new()),
        };
        store.with_state(true, |_| ())?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identifier of the persisted state document
    pub fn state_id(&self) -> Result<String, StoreError> {
        self.with_state(false, |state| state.state_id.clone())
    }

    /// Load the raw document without taking the lock
    pub fn snapshot(&self) -> Result<SharedState, StoreError> {
        self.load()
    }

    fn load(&self) -> Result<SharedState, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Ok(SharedState::new(uuid::Uuid::new_v4().to_string()))
            }
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn persist(&self, state: &SharedState) -> Result<(), StoreError> {
        let io_err = |source: io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_vec_pretty(state).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        // Write beside the target then rename, so a killed writer never leaves half a document
        let mut staging = self.path.as_os_str().to_os_string();
        staging.push(format!(".{}.staging", std::process::id()));
        let staging = PathBuf::from(staging);
        fs::write(&staging, json).map_err(io_err)?;
        fs::rename(&staging, &self.path).map_err(io_err)
    }

    /// Run `f` against freshly loaded state while holding the lock.
    /// When `mutate` is set the (possibly changed) state is written back.
    fn with_state<T>(
        &self,
        mutate: bool,
        f: impl FnOnce(&mut SharedState) -> T,
    ) -> Result<T, StoreError> {
        let handle = FileLock::acquire(&self.lock_path, &self.lock_config)?;
        let mut state = self.load()?;
        let out = f(&mut state);
        if mutate || !self.path.exists() {
            self.persist(&state)?;
        }
        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            *cache = state.data;
        }
        handle.release();
        Ok(out)
    }
}

impl SharedStateStore for FileBackedStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match self.with_state(false, |state| state.data.get(key).cloned()) {
            Ok(value) => Ok(value),
            Err(StoreError::LockUnavailable(e)) => {
                // Availability over consistency: serve the last value this process saw
                let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
                let stale = cache.get(key).cloned();
                tracing::warn!(key, error = %e, "state lock unavailable, returning cached value");
                Ok(stale)
            }
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.with_state(true, |state| {
            state.data.insert(key.to_string(), value);
            state.touch();
        })
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<Value>) -> Value,
    ) -> Result<Value, StoreError> {
        self.with_state(true, |state| {
            let new = f(state.data.get(key).cloned());
            state.data.insert(key.to_string(), new.clone());
            state.touch();
            new
        })
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: &Value,
        new: Value,
    ) -> Result<bool, StoreError> {
        self.with_state(true, |state| apply_cas(state, key, expected, new))
    }

    fn remove(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.with_state(true, |state| {
            let old = state.data.remove(key);
            if old.is_some() {
                state.touch();
            }
            old
        })
    }

    fn get_all(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        self.with_state(false, |state| state.data.clone())
    }
}

/// Mutex-backed store for single-process tests
#[derive(Debug)]
pub struct InMemoryStore {
    state: Mutex<SharedState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SharedState::new(uuid::Uuid::new_v4().to_string())),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SharedState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStateStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.with_state(|state| state.data.get(key).cloned()))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.with_state(|state| {
            state.data.insert(key.to_string(), value);
            state.touch();
        });
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<Value>) -> Value,
    ) -> Result<Value, StoreError> {
        Ok(self.with_state(|state| {
            let new = f(state.data.get(key).cloned());
            state.data.insert(key.to_string(), new.clone());
            state.touch();
            new
        }))
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: &Value,
        new: Value,
    ) -> Result<bool, StoreError> {
        Ok(self.with_state(|state| apply_cas(state, key, expected, new)))
    }

    fn remove(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.with_state(|state| state.data.remove(key)))
    }

    fn get_all(&self) -> Result<BTreeMap<String, Value>, StoreError> {
        Ok(self.with_state(|state| state.data.clone()))
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
