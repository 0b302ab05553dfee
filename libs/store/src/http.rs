//! HTTP implementation of the binding store.
//!
//! Speaks JSON to the placement API:
//! - `GET  /v1/namespaces/{ns}/bindings/{name}` — fetch one binding
//! - `PATCH` same path with an `If-Match` resource version — conditional
//!   replace of `spec.eviction_tasks`
//! - `GET  /v1/bindings?watch=true` — NDJSON stream of change events

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use fleet_api::{Binding, BindingKey, EvictionTask};
use futures_core::stream::BoxStream;
use futures_util::stream;
use futures_util::StreamExt;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::StoreError;
use crate::event::{BindingEvent, BindingEventStream};
use crate::store::BindingStore;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`BindingStore`] backed by the placement API.
pub struct HttpBindingStore {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpBindingStore {
    /// Create a store client against the given base URL.
    ///
    /// The client carries no global timeout because the watch response never
    /// terminates; unary requests get a per-request deadline instead.
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Override the per-request deadline for `get` and `patch`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn binding_url(&self, key: &BindingKey) -> String {
        format!(
            "{}/v1/namespaces/{}/bindings/{}",
            self.base_url, key.namespace, key.name
        )
    }
}

#[async_trait]
impl BindingStore for HttpBindingStore {
    async fn get(&self, key: &BindingKey) -> Result<Binding, StoreError> {
        let url = self.binding_url(key);
        debug!(url = %url, "Fetching binding");

        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(key.clone())),
            status if status.is_success() => Ok(response.json().await?),
            status => Err(StoreError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            }),
        }
    }

    async fn patch_eviction_tasks(
        &self,
        key: &BindingKey,
        expected_revision: u64,
        tasks: Vec<EvictionTask>,
    ) -> Result<Binding, StoreError> {
        let url = self.binding_url(key);
        debug!(
            url = %url,
            expected_revision,
            tasks = tasks.len(),
            "Patching eviction tasks"
        );

        let body = serde_json::json!({ "spec": { "eviction_tasks": tasks } });
        let response = self
            .client
            .patch(&url)
            .timeout(self.request_timeout)
            .header("If-Match", expected_revision.to_string())
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(key.clone())),
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => Err(StoreError::Conflict {
                key: key.clone(),
                expected: expected_revision,
            }),
            status if status.is_success() => Ok(response.json().await?),
            status => Err(StoreError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            }),
        }
    }

    async fn watch(&self) -> Result<BindingEventStream, StoreError> {
        let url = format!("{}/v1/bindings?watch=true", self.base_url);
        debug!(url = %url, "Opening watch stream");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        Ok(ndjson_events(response.bytes_stream().boxed()))
    }
}

struct LineState {
    chunks: BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>,
    buffer: BytesMut,
}

/// Split a byte stream into newline-delimited JSON events.
///
/// Ends when the underlying response body ends; a trailing partial line is
/// discarded (the subscriber re-lists via a fresh watch anyway).
fn ndjson_events(
    chunks: BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>,
) -> BindingEventStream {
    let state = LineState {
        chunks,
        buffer: BytesMut::new(),
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|&b| b == b'\n') {
                let line = state.buffer.split_to(pos + 1);
                let line = &line[..line.len() - 1];
                if line.is_empty() {
                    continue;
                }
                let item = serde_json::from_slice::<BindingEvent>(line).map_err(StoreError::from);
                return Some((item, state));
            }

            match state.chunks.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => return Some((Err(StoreError::Transport(err)), state)),
                None => return None,
            }
        }
    })
    .boxed()
}
