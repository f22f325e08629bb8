//! # Local file backend.
//!
//! One JSON file on disk holds the full `{name: value}` mapping for every
//! schema key. The file is read once at `open()`; every write rewrites the
//! file in full, so there are no partial updates to recover from.
//!
//! The mapping is kept sorted by key (`BTreeMap`) so repeated runs produce
//! stable files that diff cleanly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;

use crate::error::BackendError;
use crate::store::{Backend, Value};

/// File-backed mapping of schema keys to serialized values.
pub struct FileBackend {
    path: PathBuf,
    // None = closed. The mutex only guards the in-memory mirror; file writes
    // happen outside the critical section on a snapshot.
    state: Mutex<Option<BTreeMap<String, Value>>>,
}

impl FileBackend {
    /// Creates a backend for the given file path. Nothing is touched on
    /// disk until [`Backend::open`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> BackendError {
        BackendError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn snapshot(&self) -> Result<BTreeMap<String, Value>, BackendError> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.clone().ok_or(BackendError::Closed)
    }

    async fn persist(&self, map: &BTreeMap<String, Value>) -> Result<(), BackendError> {
        let bytes = serde_json::to_vec_pretty(map).map_err(|source| BackendError::Codec {
            key: "*".to_string(),
            source,
        })?;
        fs::write(&self.path, bytes)
            .await
            .map_err(|e| self.io_err(e))
    }
}

#[async_trait]
impl Backend for FileBackend {
    async fn open(&self) -> Result<(), BackendError> {
        if self.state.lock().unwrap_or_else(|p| p.into_inner()).is_some() {
            return Ok(());
        }
        let map = match fs::read(&self.path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| BackendError::Codec {
                    key: "*".to_string(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(self.io_err(e)),
        };
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = Some(map);
        Ok(())
    }

    async fn close(&self) -> Result<(), BackendError> {
        let map = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            state.take()
        };
        match map {
            Some(map) => self.persist(&map).await,
            None => Ok(()),
        }
    }

    async fn flush(&self) -> Result<(), BackendError> {
        let map = self.snapshot()?;
        self.persist(&map).await
    }

    async fn load(&self, key: &str) -> Result<Option<Value>, BackendError> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match state.as_ref() {
            Some(map) => Ok(map.get(key).cloned()),
            None => Err(BackendError::Closed),
        }
    }

    async fn store(&self, key: &str, value: &Value) -> Result<(), BackendError> {
        let map = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            let map = state.as_mut().ok_or(BackendError::Closed)?;
            map.insert(key.to_string(), value.clone());
            map.clone()
        };
        self.persist(&map).await
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        let map = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            let map = state.as_mut().ok_or(BackendError::Closed)?;
            map.remove(key);
            map.clone()
        };
        self.persist(&map).await
    }
}
