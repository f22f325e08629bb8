//! # Schema-typed persistent store.
//!
//! [`Store`] owns a [`Schema`], a [`Backend`] handle chosen once at
//! construction, and the in-memory attribute state, guarded by a single
//! async lock shared by every cooperating task.
//!
//! ## Lifecycle
//! ```text
//! Store::file(..) / Store::remote(..)      (constructed closed)
//!     └─► add_key / add_unique_list        (schema, before open only)
//!          └─► open()                      (attach backend, load values;
//!               │                           missing keys get defaults)
//!               ├─► get / set / list       (typed, schema-validated)
//!               ├─► sync(key|all)          (flush to backend)
//!               ├─► migrate_to(other)      (copy all values across)
//!               └─► close()                (sync, detach)
//! ```
//!
//! ## Rules
//! - `open()` is idempotent; every other data call on a closed store fails
//!   with [`SchemaError::NotOpen`].
//! - Public operations take the lock once and delegate to lock-free
//!   helpers, so no code path ever re-locks the same store.
//! - On a remote backend, list-kind slots are proxied by a
//!   [`SyncedList`]; in-place mutation through the proxy stays durable
//!   without reassigning the attribute.
//!
//! ## Example
//! ```no_run
//! use magpie::store::{Store, Value, ValueKind};
//!
//! # async fn demo() -> Result<(), magpie::StoreError> {
//! let mut store = Store::file("magpie.json");
//! store.add_key("greeting", ValueKind::Text, Value::Text("hi".into()))?;
//! store.open().await?;
//!
//! store.set("greeting", Value::Text("hello".into())).await?;
//! assert_eq!(store.get("greeting").await?, Value::Text("hello".into()));
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{SchemaError, StoreError};
use crate::store::{
    Backend, BackendRef, FileBackend, RemoteBackend, Schema, SyncedList, Value, ValueKind,
};

/// One attribute slot's live representation.
enum Slot {
    /// Plain value, written through to the backend on `set`.
    Plain(Value),
    /// List slot proxied to the remote key.
    List(SyncedList),
}

struct State {
    open: bool,
    slots: HashMap<String, Slot>,
}

/// Schema-typed store over a file or remote backend.
pub struct Store {
    schema: Schema,
    backend: BackendRef,
    state: Mutex<State>,
}

impl Store {
    /// Store persisting to a single local JSON mapping file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::with_backend(Arc::new(FileBackend::new(path)))
    }

    /// Store persisting to a remote key-value service, one key per schema
    /// entry at `<namespace:>name`.
    pub fn remote(base_url: impl Into<String>, namespace: Option<String>) -> Self {
        Self::with_backend(Arc::new(RemoteBackend::with_namespace(base_url, namespace)))
    }

    /// Store over an explicit backend handle.
    pub fn with_backend(backend: BackendRef) -> Self {
        Self {
            schema: Schema::new(),
            backend,
            state: Mutex::new(State {
                open: false,
                slots: HashMap::new(),
            }),
        }
    }

    /// Registers a typed attribute. Must be called before [`open`](Store::open).
    pub fn add_key(
        &mut self,
        name: impl Into<String>,
        kind: ValueKind,
        default: Value,
    ) -> Result<(), SchemaError> {
        let name = name.into();
        self.ensure_closed(&name)?;
        self.schema.add(name, kind, default)
    }

    /// Registers a list attribute whose initial content is deduplicated
    /// (first occurrence wins). Must be called before [`open`](Store::open).
    pub fn add_unique_list(
        &mut self,
        name: impl Into<String>,
        default: Vec<Value>,
    ) -> Result<(), SchemaError> {
        let name = name.into();
        self.ensure_closed(&name)?;
        self.schema.add_unique_list(name, default)
    }

    fn ensure_closed(&self, name: &str) -> Result<(), SchemaError> {
        // `&mut self` guarantees exclusive access here, so peeking at the
        // state without awaiting the lock is safe.
        let open = match self.state.try_lock() {
            Ok(state) => state.open,
            Err(_) => true,
        };
        if open {
            return Err(SchemaError::AddAfterOpen {
                key: name.to_string(),
            });
        }
        Ok(())
    }

    /// The schema this store enforces.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// True once [`open`](Store::open) has succeeded and before
    /// [`close`](Store::close).
    pub async fn is_open(&self) -> bool {
        self.state.lock().await.open
    }

    /// Attaches the backend and loads persisted values.
    ///
    /// Every schema key missing from the backend yields its declared
    /// default. Idempotent: opening an open store is a no-op. A failure
    /// here during startup is fatal to the process.
    pub async fn open(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.open {
            return Ok(());
        }
        self.backend.open().await?;

        let mut slots = HashMap::with_capacity(self.schema.len());
        for (name, item) in self.schema.iter() {
            let slot = if self.backend.wraps_lists() && item.kind() == ValueKind::List {
                let initial = match item.default() {
                    Value::List(items) => items.clone(),
                    _ => Vec::new(),
                };
                let list = SyncedList::attach(
                    self.backend.clone(),
                    name,
                    initial,
                    false,
                    item.unique(),
                )
                .await?;
                Slot::List(list)
            } else {
                let loaded = self.backend.load(name).await?;
                // A persisted value that no longer conforms to the schema
                // is ignored in favor of the declared default.
                let value = match loaded {
                    Some(v) if v.kind() == item.kind() => v,
                    _ => item.default().clone(),
                };
                Slot::Plain(value)
            };
            slots.insert(name.to_string(), slot);
        }

        state.slots = slots;
        state.open = true;
        Ok(())
    }

    /// Reads one attribute.
    ///
    /// List slots answer a snapshot of the proxy's local cache.
    pub async fn get(&self, name: &str) -> Result<Value, StoreError> {
        let state = self.state.lock().await;
        Self::slot_value(&state, name)
    }

    /// Writes one attribute, validating against the schema first.
    ///
    /// On a plain slot the value is written through to the backend; on a
    /// list slot the proxy's content is replaced and pushed to the remote
    /// key.
    pub async fn set(&self, name: &str, value: Value) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.open {
            return Err(SchemaError::NotOpen.into());
        }
        self.schema.check(name, &value)?;

        match state.slots.get_mut(name) {
            Some(Slot::List(list)) => match value {
                Value::List(items) => list.assign(items).await?,
                other => {
                    return Err(SchemaError::KindMismatch {
                        key: name.to_string(),
                        expected: ValueKind::List,
                        actual: other.kind(),
                    }
                    .into())
                }
            },
            Some(Slot::Plain(slot)) => {
                *slot = value.clone();
                self.backend.store(name, &value).await?;
            }
            None => {
                return Err(SchemaError::UnknownKey {
                    key: name.to_string(),
                }
                .into())
            }
        }
        Ok(())
    }

    /// Reads a record attribute into a concrete user type.
    pub async fn get_as<T: for<'de> serde::Deserialize<'de>>(
        &self,
        name: &str,
    ) -> Result<T, StoreError> {
        let value = self.get(name).await?;
        Ok(value.to_record::<T>().map_err(|e| match e {
            SchemaError::KindMismatch { expected, actual, .. } => SchemaError::KindMismatch {
                key: name.to_string(),
                expected,
                actual,
            },
            other => other,
        })?)
    }

    /// Writes a record attribute from a concrete user type.
    pub async fn set_record<T: serde::Serialize>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let value = Value::record(value)?;
        self.set(name, value).await
    }

    /// Hands out the [`SyncedList`] proxying a list slot.
    ///
    /// Only remote-backed stores proxy their list slots; on a file-backed
    /// store this answers [`StoreError::NotSynced`].
    pub async fn list(&self, name: &str) -> Result<SyncedList, StoreError> {
        let state = self.state.lock().await;
        if !state.open {
            return Err(SchemaError::NotOpen.into());
        }
        match state.slots.get(name) {
            Some(Slot::List(list)) => Ok(list.clone()),
            Some(Slot::Plain(_)) => Err(StoreError::NotSynced {
                key: name.to_string(),
            }),
            None => Err(SchemaError::UnknownKey {
                key: name.to_string(),
            }
            .into()),
        }
    }

    /// Flushes one key (or all keys, with `None`) to the backend.
    pub async fn sync(&self, key: Option<&str>) -> Result<(), StoreError> {
        let state = self.state.lock().await;
        if !state.open {
            return Err(SchemaError::NotOpen.into());
        }
        if let Some(key) = key {
            if !self.schema.contains(key) {
                return Err(SchemaError::UnknownKey {
                    key: key.to_string(),
                }
                .into());
            }
        }
        for (name, slot) in &state.slots {
            if key.is_some_and(|k| k != name) {
                continue;
            }
            match slot {
                Slot::Plain(value) => self.backend.store(name, value).await?,
                Slot::List(list) => list.sync().await?,
            }
        }
        self.backend.flush().await?;
        Ok(())
    }

    /// Syncs everything, detaches the backend, and marks the store closed.
    ///
    /// Closing a closed store is a no-op.
    pub async fn close(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.open {
            return Ok(());
        }
        for (name, slot) in &state.slots {
            match slot {
                Slot::Plain(value) => self.backend.store(name, value).await?,
                Slot::List(list) => list.sync().await?,
            }
        }
        self.backend.flush().await?;
        self.backend.close().await?;
        state.open = false;
        state.slots.clear();
        Ok(())
    }

    /// Copies every schema key's current value into an already-open target
    /// store, leaving this store unmodified.
    ///
    /// The target validates each write against its own schema, so a target
    /// missing one of this store's keys fails that key's copy.
    pub async fn migrate_to(&self, other: &Store) -> Result<(), StoreError> {
        let snapshot: Vec<(String, Value)> = {
            let state = self.state.lock().await;
            if !state.open {
                return Err(SchemaError::NotOpen.into());
            }
            self.schema
                .iter()
                .map(|(name, _)| {
                    Self::slot_value(&state, name).map(|value| (name.to_string(), value))
                })
                .collect::<Result<_, _>>()?
        };
        // This store's lock is released before touching the target, so two
        // stores can never be locked by one call at the same time.
        for (name, value) in snapshot {
            other.set(&name, value).await?;
        }
        Ok(())
    }

    fn slot_value(state: &State, name: &str) -> Result<Value, StoreError> {
        if !state.open {
            return Err(SchemaError::NotOpen.into());
        }
        match state.slots.get(name) {
            Some(Slot::Plain(value)) => Ok(value.clone()),
            Some(Slot::List(list)) => Ok(Value::List(list.snapshot())),
            None => Err(SchemaError::UnknownKey {
                key: name.to_string(),
            }
            .into()),
        }
    }
}
