//! Network boundary for the record-fallback path
//!
//! Playback never touches the network. When a recording session falls
//! through on a miss, the request goes to a [`RequestExecutor`]; the
//! hyper-backed [`NetworkClient`] is the real implementation, and tests
//! inject fakes through the same seam.

mod client;

pub use client::NetworkClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::track::{Request, Response};

/// Transport-level failure reported by the external network collaborator.
/// Passed through verbatim to the caller's completion.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    /// What the collaborator reported
    pub message: String,
}

impl TransportError {
    /// Wrap a collaborator-reported failure
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Capability to execute a real HTTP request
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Execute `request` against the live network and materialize the
    /// response
    async fn execute(&self, request: &Request) -> Result<Response, TransportError>;
}
