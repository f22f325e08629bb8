//! # Storage backend capability interface.
//!
//! A [`Backend`] is the concrete medium a [`Store`](crate::Store) persists
//! to. Exactly two implementations exist, selected once at construction:
//!
//! - [`FileBackend`](crate::store::FileBackend): one local JSON mapping file.
//! - [`RemoteBackend`](crate::store::RemoteBackend): a remote HTTP key-value
//!   service, one key per schema entry.
//!
//! ## Rules
//! - `open` must succeed before any `load`/`store`; a closed backend answers
//!   [`BackendError::Closed`].
//! - `load` returns `Ok(None)` for a key that was never persisted.
//! - `flush` is a durability barrier; backends with write-through semantics
//!   may treat it as a no-op.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::BackendError;
use crate::store::Value;

/// Shared handle to a backend implementation.
pub type BackendRef = Arc<dyn Backend>;

/// Capability interface implemented by the two storage media.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Attaches the backing medium. Idempotent.
    async fn open(&self) -> Result<(), BackendError>;

    /// Flushes and detaches. Further access answers [`BackendError::Closed`].
    async fn close(&self) -> Result<(), BackendError>;

    /// Durability barrier for any buffered writes.
    async fn flush(&self) -> Result<(), BackendError>;

    /// Reads one key. `Ok(None)` when the key was never persisted.
    async fn load(&self, key: &str) -> Result<Option<Value>, BackendError>;

    /// Writes one key.
    async fn store(&self, key: &str, value: &Value) -> Result<(), BackendError>;

    /// Deletes one key. Deleting an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), BackendError>;

    /// True when list-kind slots on this backend are proxied by a
    /// [`SyncedList`](crate::store::SyncedList) so in-place mutation stays
    /// durable without reassigning the attribute.
    fn wraps_lists(&self) -> bool {
        false
    }
}
