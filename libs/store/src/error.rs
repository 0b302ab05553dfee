//! Store error taxonomy.

use fleet_api::BindingKey;
use thiserror::Error;

/// Errors from store operations.
///
/// `NotFound` and `Conflict` carry control-flow meaning for the controller;
/// everything else is transient I/O and resolved by requeue-with-backoff.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The binding does not exist (or no longer exists).
    #[error("binding not found: {0}")]
    NotFound(BindingKey),

    /// A conditional write lost the race: the resource version it was based
    /// on is no longer current.
    #[error("conflict writing {key}: resource version {expected} is stale")]
    Conflict { key: BindingKey, expected: u64 },

    /// Transport-level failure reaching the store.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store returned a payload that does not decode.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The store answered with a status the client has no mapping for.
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// The watch stream ended; the caller should re-subscribe.
    #[error("watch stream closed")]
    WatchClosed,
}

impl StoreError {
    /// Whether this is the benign object-deleted case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this is a stale conditional write.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
