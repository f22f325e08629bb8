//! # SyncedList: an ordered-sequence proxy over a remote key.
//!
//! A [`SyncedList`] is handed out by a remote-backed
//! [`Store`](crate::Store) for every list-kind attribute slot. It keeps a
//! local cache that is authoritative for reads, and pushes the full changed
//! state to the remote key on every mutating operation. There is no
//! interception magic: each mutator below is documented as performing an
//! immediate remote write.
//!
//! ## Synchronization protocol
//! ```text
//! attach(overwrite=false):  remote present → cache = remote content
//!                           remote absent  → cache = initial, push once
//! attach(overwrite=true):   cache = initial, remote replaced
//! mutation:                 cache updated first, then full push to remote
//! sync():                   full rewrite of the remote key from the cache
//! ```
//!
//! Cache update and remote push are not transactional with each other: a
//! failure or crash between them leaves the two diverged, with the cache
//! ahead of the remote, until a forced [`sync`] rewrites the key.
//!
//! [`sync`]: SyncedList::sync

use std::sync::{Arc, Mutex};

use crate::error::BackendError;
use crate::store::{BackendRef, Value};

/// Cloneable handle to one remote-synchronized ordered sequence.
///
/// Clones share the same cache and remote key; a store hands out exactly
/// one logical list per attribute slot.
#[derive(Clone)]
pub struct SyncedList {
    inner: Arc<Inner>,
}

struct Inner {
    key: String,
    backend: BackendRef,
    cache: Mutex<Vec<Value>>,
}

impl SyncedList {
    /// Builds the list from local initial content plus whatever is already
    /// present under the remote key.
    ///
    /// With `overwrite = false` the remote content is preferred: existing
    /// remote items win and `initial` is discarded; only when the key is
    /// absent does `initial` seed both cache and remote. With
    /// `overwrite = true` the remote key is replaced by `initial`.
    ///
    /// `unique` applies [`wrap`](SyncedList::wrap) to whichever content is
    /// accepted before it becomes visible.
    pub async fn attach(
        backend: BackendRef,
        key: impl Into<String>,
        initial: Vec<Value>,
        overwrite: bool,
        unique: bool,
    ) -> Result<Self, BackendError> {
        let key = key.into();
        let remote = if overwrite {
            None
        } else {
            backend.load(&key).await?
        };

        let (content, push) = match remote {
            Some(Value::List(items)) => (items, false),
            // A non-list value under this key is replaced; the slot owns it.
            Some(_) | None => (initial, true),
        };
        let content = if unique { Self::wrap(content) } else { content };

        let list = Self {
            inner: Arc::new(Inner {
                key,
                backend,
                cache: Mutex::new(content),
            }),
        };
        if push || overwrite {
            list.sync().await?;
        }
        Ok(list)
    }

    /// Deduplicates a sequence by equality, keeping the first occurrence.
    ///
    /// ```
    /// use magpie::store::{SyncedList, Value};
    ///
    /// let deduped = SyncedList::wrap(vec![
    ///     Value::Int(1),
    ///     Value::Int(1),
    ///     Value::Int(2),
    /// ]);
    /// assert_eq!(deduped, vec![Value::Int(1), Value::Int(2)]);
    /// ```
    pub fn wrap(items: Vec<Value>) -> Vec<Value> {
        let mut out: Vec<Value> = Vec::with_capacity(items.len());
        for item in items {
            if !out.contains(&item) {
                out.push(item);
            }
        }
        out
    }

    /// Remote key this list is bound to.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    // ---- reads: served from the local cache ----

    /// Number of items.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when the list holds no items.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Clone of the item at `index`, if present.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.lock().get(index).cloned()
    }

    /// True when an equal item is present.
    pub fn contains(&self, item: &Value) -> bool {
        self.lock().contains(item)
    }

    /// Clone of the full cached sequence.
    pub fn snapshot(&self) -> Vec<Value> {
        self.lock().clone()
    }

    // ---- mutations: cache first, then an immediate remote write ----

    /// Appends an item. Performs an immediate remote write.
    pub async fn push(&self, item: Value) -> Result<(), BackendError> {
        let snapshot = {
            let mut cache = self.lock();
            cache.push(item);
            cache.clone()
        };
        self.push_remote(snapshot).await
    }

    /// Inserts an item at `index` (clamped to the current length).
    /// Performs an immediate remote write.
    pub async fn insert(&self, index: usize, item: Value) -> Result<(), BackendError> {
        let snapshot = {
            let mut cache = self.lock();
            let index = index.min(cache.len());
            cache.insert(index, item);
            cache.clone()
        };
        self.push_remote(snapshot).await
    }

    /// Replaces the item at `index`. Returns `false` (with no write) when
    /// the index is out of range. Performs an immediate remote write.
    pub async fn set(&self, index: usize, item: Value) -> Result<bool, BackendError> {
        let snapshot = {
            let mut cache = self.lock();
            match cache.get_mut(index) {
                Some(slot) => *slot = item,
                None => return Ok(false),
            }
            cache.clone()
        };
        self.push_remote(snapshot).await?;
        Ok(true)
    }

    /// Removes and returns the item at `index`, or `None` (with no write)
    /// when out of range. Performs an immediate remote write.
    pub async fn remove(&self, index: usize) -> Result<Option<Value>, BackendError> {
        let (removed, snapshot) = {
            let mut cache = self.lock();
            if index >= cache.len() {
                return Ok(None);
            }
            let removed = cache.remove(index);
            (removed, cache.clone())
        };
        self.push_remote(snapshot).await?;
        Ok(Some(removed))
    }

    /// Removes and returns the last item, or `None` when empty.
    /// Performs an immediate remote write.
    pub async fn pop(&self) -> Result<Option<Value>, BackendError> {
        let (popped, snapshot) = {
            let mut cache = self.lock();
            match cache.pop() {
                Some(v) => (v, cache.clone()),
                None => return Ok(None),
            }
        };
        self.push_remote(snapshot).await?;
        Ok(Some(popped))
    }

    /// Appends every item of `items`. Performs one immediate remote write.
    pub async fn extend(&self, items: Vec<Value>) -> Result<(), BackendError> {
        if items.is_empty() {
            return Ok(());
        }
        let snapshot = {
            let mut cache = self.lock();
            cache.extend(items);
            cache.clone()
        };
        self.push_remote(snapshot).await
    }

    /// Drops every item. Performs an immediate remote write.
    pub async fn clear(&self) -> Result<(), BackendError> {
        {
            self.lock().clear();
        }
        self.push_remote(Vec::new()).await
    }

    /// Replaces the full content. Performs an immediate remote write.
    pub async fn assign(&self, items: Vec<Value>) -> Result<(), BackendError> {
        let snapshot = {
            let mut cache = self.lock();
            *cache = items;
            cache.clone()
        };
        self.push_remote(snapshot).await
    }

    /// Forces a full rewrite of the remote key from the local cache.
    ///
    /// Used to recover from divergence after a partial failure (a mutation
    /// whose remote push did not complete).
    pub async fn sync(&self) -> Result<(), BackendError> {
        let snapshot = self.snapshot();
        self.inner
            .backend
            .store(&self.inner.key, &Value::List(snapshot))
            .await
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Value>> {
        self.inner
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn push_remote(&self, snapshot: Vec<Value>) -> Result<(), BackendError> {
        self.inner
            .backend
            .store(&self.inner.key, &Value::List(snapshot))
            .await
    }
}

impl std::fmt::Debug for SyncedList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncedList")
            .field("key", &self.inner.key)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Backend, FileBackend};
    use std::sync::Arc;

    // The file backend honors the same Backend contract, which keeps these
    // tests off the network; remote-specific behavior is covered in
    // `store::remote` and `store::store`.
    async fn test_backend() -> (tempfile::TempDir, BackendRef) {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FileBackend::new(dir.path().join("list.json")));
        backend.open().await.unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn attach_prefers_remote_content() {
        let (_dir, backend) = test_backend().await;
        backend
            .store("songs", &Value::List(vec![Value::Int(1)]))
            .await
            .unwrap();

        let list = SyncedList::attach(
            backend,
            "songs",
            vec![Value::Int(9), Value::Int(8)],
            false,
            false,
        )
        .await
        .unwrap();
        assert_eq!(list.snapshot(), vec![Value::Int(1)]);
    }

    #[tokio::test]
    async fn attach_overwrite_replaces_remote() {
        let (_dir, backend) = test_backend().await;
        backend
            .store("songs", &Value::List(vec![Value::Int(1)]))
            .await
            .unwrap();

        let list = SyncedList::attach(
            backend.clone(),
            "songs",
            vec![Value::Int(9)],
            true,
            false,
        )
        .await
        .unwrap();
        assert_eq!(list.snapshot(), vec![Value::Int(9)]);
        assert_eq!(
            backend.load("songs").await.unwrap(),
            Some(Value::List(vec![Value::Int(9)]))
        );
    }

    #[tokio::test]
    async fn wrap_unique_keeps_first_occurrence() {
        let a = Value::Text("a".into());
        let b = Value::Text("b".into());
        assert_eq!(
            SyncedList::wrap(vec![a.clone(), a.clone(), b.clone()]),
            vec![a, b]
        );
    }

    #[tokio::test]
    async fn mutations_push_to_remote_immediately() {
        let (_dir, backend) = test_backend().await;
        let list = SyncedList::attach(backend.clone(), "songs", vec![], false, false)
            .await
            .unwrap();

        list.push(Value::Int(1)).await.unwrap();
        list.push(Value::Int(2)).await.unwrap();
        list.remove(0).await.unwrap();

        assert_eq!(
            backend.load("songs").await.unwrap(),
            Some(Value::List(vec![Value::Int(2)]))
        );
    }

    #[tokio::test]
    async fn out_of_range_ops_have_no_side_effect() {
        let (_dir, backend) = test_backend().await;
        let list = SyncedList::attach(backend, "songs", vec![Value::Int(1)], false, false)
            .await
            .unwrap();

        assert!(!list.set(5, Value::Int(0)).await.unwrap());
        assert_eq!(list.remove(5).await.unwrap(), None);
        assert_eq!(list.snapshot(), vec![Value::Int(1)]);
    }
}
