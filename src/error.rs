//! Error types used by the magpie runtime and store.
//!
//! This module defines the error enums for the two halves of the crate:
//!
//! - [`SchemaError`] — a store access violated the declared schema.
//! - [`BackendError`] — the persistence backend failed (I/O, transport).
//! - [`StoreError`] — either of the above, as surfaced by [`Store`](crate::Store) calls.
//! - [`TaskError`] — errors raised by registered workers and loop tasks.
//! - [`RuntimeError`] — errors raised by the orchestration runtime itself.
//!
//! All types provide an `as_label` helper for logging.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::store::ValueKind;

/// # Schema violations.
///
/// A schema error fails the single offending call; it is never fatal to the
/// process once the store is open. Raising one from `add_key` before `open()`
/// indicates a misconfiguration and should abort startup.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The key was never registered with `add_key`.
    #[error("key '{key}' not present in schema")]
    UnknownKey {
        /// The offending key name.
        key: String,
    },

    /// The written value does not conform to the declared kind.
    #[error("'{key}' is of wrong kind {actual:?}, should be: {expected:?}")]
    KindMismatch {
        /// The offending key name.
        key: String,
        /// Kind declared in the schema.
        expected: ValueKind,
        /// Kind of the rejected value.
        actual: ValueKind,
    },

    /// `add_key` was called after the store was opened.
    #[error("cannot add '{key}' to schema once store has been opened")]
    AddAfterOpen {
        /// The key that was being registered.
        key: String,
    },

    /// The store is not open (either never opened or already closed).
    #[error("store is not open")]
    NotOpen,

    /// A record value failed to serialize or deserialize.
    #[error("record conversion failed: {0}")]
    Record(#[from] serde_json::Error),
}

impl SchemaError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SchemaError::UnknownKey { .. } => "schema_unknown_key",
            SchemaError::KindMismatch { .. } => "schema_kind_mismatch",
            SchemaError::AddAfterOpen { .. } => "schema_add_after_open",
            SchemaError::NotOpen => "schema_not_open",
            SchemaError::Record(_) => "schema_record",
        }
    }
}

/// # Persistence backend failures.
///
/// Surfaced to the direct caller. A failure during startup `open()` is fatal
/// to the process; a failure inside a running loop task is caught at the
/// runner boundary and only aborts that execution.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BackendError {
    /// Local file I/O failed.
    #[error("file backend i/o on {path:?}: {source}")]
    Io {
        /// Path of the backing file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A value could not be serialized or deserialized for persistence.
    #[error("codec failure for key '{key}': {source}")]
    Codec {
        /// Key whose value failed to round-trip.
        key: String,
        /// Underlying serde error.
        source: serde_json::Error,
    },

    /// The remote key-value service could not be reached.
    #[error("remote transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote key-value service answered with an unexpected status.
    #[error("remote returned status {status} for key '{key}'")]
    Status {
        /// Key being accessed.
        key: String,
        /// HTTP status code.
        status: u16,
    },

    /// The backend was used after `close()`.
    #[error("backend is closed")]
    Closed,
}

impl BackendError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BackendError::Io { .. } => "backend_io",
            BackendError::Codec { .. } => "backend_codec",
            BackendError::Transport(_) => "backend_transport",
            BackendError::Status { .. } => "backend_status",
            BackendError::Closed => "backend_closed",
        }
    }
}

/// Either half of a failed store call.
///
/// [`Store`](crate::Store) operations validate against the schema and then
/// touch the backend, so both failure kinds can surface from one call.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// The call violated the schema.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The key is not backed by a synced list on this backend.
    #[error("key '{key}' is not backed by a synced list")]
    NotSynced {
        /// The key that was requested via `Store::list`.
        key: String,
    },
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::Schema(e) => e.as_label(),
            StoreError::Backend(e) => e.as_label(),
            StoreError::NotSynced { .. } => "store_not_synced",
        }
    }
}

/// # Errors produced by registered callables.
///
/// Raised by worker and loop-task bodies. Always caught at the runner
/// boundary: a worker failure triggers the restart path, a loop-task or
/// post-loop-task failure skips that cycle. Never crashes the runner.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// Task execution failed; the task resumes on its next eligible pass.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Task observed the shutdown signal and exited cooperatively.
    #[error("shutdown observed")]
    Canceled,
}

impl TaskError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use magpie::TaskError;
    ///
    /// let err = TaskError::Fail { error: "boom".into() };
    /// assert_eq!(err.as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// True when the task ended because shutdown was requested.
    ///
    /// A graceful exit is reported as a stop, not a failure, and does not
    /// trigger the worker restart path.
    pub fn is_graceful(&self) -> bool {
        matches!(self, TaskError::Canceled)
    }
}

impl From<StoreError> for TaskError {
    fn from(e: StoreError) -> Self {
        TaskError::Fail {
            error: e.to_string(),
        }
    }
}

impl From<BackendError> for TaskError {
    fn from(e: BackendError) -> Self {
        TaskError::Fail {
            error: e.to_string(),
        }
    }
}

/// # Errors produced by the runtime itself.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some tasks remained stuck.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of workers and loop tasks that did not stop in time.
        stuck: Vec<String>,
    },

    /// OS signal listeners could not be installed.
    #[error("signal registration failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}
