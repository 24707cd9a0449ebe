//! HTTP client for executing live requests during recording

use std::time::Duration;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Method;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use super::{RequestExecutor, TransportError};
use crate::track::{Request, Response};

/// Real network client used when a recording session forwards a miss
pub struct NetworkClient {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl NetworkClient {
    /// Create a new network client
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build_http();

        Self { client }
    }
}

impl Default for NetworkClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestExecutor for NetworkClient {
    async fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        debug!("Forwarding {} to {}", request.method(), request.url());

        let method = request.method().parse::<Method>().map_err(|e| {
            TransportError::new(format!("invalid HTTP method '{}': {e}", request.method()))
        })?;

        let mut builder = hyper::Request::builder()
            .method(method)
            .uri(request.url().clone());
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }

        let body = request.body().cloned().unwrap_or_default();
        let http_request = builder
            .body(Full::new(body))
            .map_err(|e| TransportError::new(format!("failed to build request: {e}")))?;

        let response = self.client.request(http_request).await.map_err(|e| {
            warn!("Live request failed: {e}");
            TransportError::new(format!("request failed: {e}"))
        })?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or("<invalid>").to_string(),
                )
            })
            .collect();

        let body_bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| TransportError::new(format!("failed to read response body: {e}")))?
            .to_bytes();

        let mut captured =
            Response::new(request.url().clone(), status).with_headers(headers);
        if !body_bytes.is_empty() {
            captured = captured.with_body(body_bytes);
        }

        Ok(captured)
    }
}
