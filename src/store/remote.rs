//! # Remote key-value backend.
//!
//! Persists each schema entry under its own key on a remote HTTP key-value
//! service. Keys are addressed as `<namespace:>name` and accessed at
//! `{base}/keys/{key}`:
//!
//! ```text
//! GET    /keys/<ns:>name   → 200 body = serialized Value | 404 absent
//! PUT    /keys/<ns:>name   → 2xx, body = serialized Value
//! DELETE /keys/<ns:>name   → 2xx or 404
//! ```
//!
//! Writes are immediate (no buffering), so `flush` is a no-op. List-kind
//! slots on this backend are proxied by a
//! [`SyncedList`](crate::store::SyncedList) so in-place mutation stays
//! durable without reassigning the attribute.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::BackendError;
use crate::store::{Backend, Value};

/// HTTP key-value backend with namespaced keys.
pub struct RemoteBackend {
    client: reqwest::Client,
    base_url: String,
    namespace: Option<String>,
    open: AtomicBool,
}

impl RemoteBackend {
    /// Creates a backend for the given service base URL, without a
    /// namespace prefix.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_namespace(base_url, None::<String>)
    }

    /// Creates a backend whose keys are prefixed `<namespace>:`.
    ///
    /// Namespacing lets several bots share one service without clashing.
    pub fn with_namespace(
        base_url: impl Into<String>,
        namespace: Option<impl Into<String>>,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            namespace: namespace.map(Into::into),
            open: AtomicBool::new(false),
        }
    }

    /// Full key for a schema entry name, including the namespace prefix.
    pub fn key_for(&self, name: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}:{name}"),
            None => name.to_string(),
        }
    }

    fn url_for(&self, name: &str) -> String {
        format!("{}/keys/{}", self.base_url, self.key_for(name))
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(BackendError::Closed)
        }
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    /// Probes the service with a read of an arbitrary key. Any response,
    /// including 404, proves the service is reachable; a transport error
    /// fails the open and is fatal at startup.
    async fn open(&self) -> Result<(), BackendError> {
        if self.open.load(Ordering::Acquire) {
            return Ok(());
        }
        let resp = self.client.get(self.url_for("__probe__")).send().await?;
        if !(resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND) {
            return Err(BackendError::Status {
                key: self.key_for("__probe__"),
                status: resp.status().as_u16(),
            });
        }
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }

    async fn flush(&self) -> Result<(), BackendError> {
        self.ensure_open()
    }

    async fn load(&self, key: &str) -> Result<Option<Value>, BackendError> {
        self.ensure_open()?;
        let resp = self.client.get(self.url_for(key)).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let bytes = resp.bytes().await?;
                let value =
                    serde_json::from_slice(&bytes).map_err(|source| BackendError::Codec {
                        key: self.key_for(key),
                        source,
                    })?;
                Ok(Some(value))
            }
            s => Err(BackendError::Status {
                key: self.key_for(key),
                status: s.as_u16(),
            }),
        }
    }

    async fn store(&self, key: &str, value: &Value) -> Result<(), BackendError> {
        self.ensure_open()?;
        let resp = self
            .client
            .put(self.url_for(key))
            .json(value)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(BackendError::Status {
                key: self.key_for(key),
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.ensure_open()?;
        let resp = self.client.delete(self.url_for(key)).send().await?;
        if !(resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND) {
            return Err(BackendError::Status {
                key: self.key_for(key),
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    fn wraps_lists(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn namespaced_keys_are_prefixed() {
        let backend = RemoteBackend::with_namespace("http://kv.local", Some("magpie"));
        assert_eq!(backend.key_for("mentions"), "magpie:mentions");

        let bare = RemoteBackend::new("http://kv.local/");
        assert_eq!(bare.key_for("mentions"), "mentions");
    }

    #[tokio::test]
    async fn load_treats_404_as_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/keys/__probe__"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/keys/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let backend = RemoteBackend::new(server.uri());
        backend.open().await.unwrap();
        assert_eq!(backend.load("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_then_load_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/keys/__probe__"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/keys/budget"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/keys/budget"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Int(42)))
            .mount(&server)
            .await;

        let backend = RemoteBackend::new(server.uri());
        backend.open().await.unwrap();
        backend.store("budget", &Value::Int(42)).await.unwrap();
        assert_eq!(backend.load("budget").await.unwrap(), Some(Value::Int(42)));
    }

    #[tokio::test]
    async fn unexpected_status_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/keys/__probe__"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/keys/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let backend = RemoteBackend::new(server.uri());
        backend.open().await.unwrap();
        let err = backend.load("broken").await.unwrap_err();
        assert_eq!(err.as_label(), "backend_status");
    }
}
