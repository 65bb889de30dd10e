// src/delivery/transport.rs
//! HTTP transport for event requests
//!
//! The scheduler only needs "send one request, resolve later". Responses and
//! dispatch failures stay on separate channels: any status the server
//! returns is `Ok(TransportResponse)`, while a request that never produced a
//! status (connect error, timeout, malformed URL) is `Err(TransportError)`.

use crate::delivery::request::PendingRequest;
use crate::utils::config::ServerConfig;
use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Response from the collection server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// A request that did not produce an HTTP status
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Connection or protocol failure
    #[error("Request dispatch failed: {0}")]
    Dispatch(String),

    /// No response within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The response body could not be read
    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// Sends a single request and resolves when it completes
///
/// Implementations must not block the caller; all work happens inside the
/// returned future.
pub trait Transport: Send + Sync {
    fn send(&self, request: PendingRequest) -> BoxFuture<'static, Result<TransportResponse, TransportError>>;
}

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound for a single request, including the body read
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ServerConfig> for TransportConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            request_timeout: server.request_timeout(),
        }
    }
}

/// hyper-based transport
///
/// `new` speaks plain HTTP; hosts that need TLS pass their own connector to
/// `with_connector`.
pub struct HttpTransport<C = HttpConnector> {
    config: TransportConfig,
    http_client: Client<C, Full<Bytes>>,
}

impl HttpTransport<HttpConnector> {
    /// Create a transport over the default HTTP connector
    pub fn new(config: TransportConfig) -> Self {
        let http_client = Client::builder(TokioExecutor::new()).build_http();

        Self { config, http_client }
    }
}

impl<C> HttpTransport<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    /// Create a transport over a caller-supplied connector
    pub fn with_connector(connector: C, config: TransportConfig) -> Self {
        let http_client = Client::builder(TokioExecutor::new()).build(connector);

        Self { config, http_client }
    }
}

impl<C> Transport for HttpTransport<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    fn send(&self, request: PendingRequest) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        let client = self.http_client.clone();
        let timeout = self.config.request_timeout;

        Box::pin(async move {
            let mut builder = Request::builder().method(Method::POST).uri(request.url.as_str());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            let http_request = builder
                .body(Full::new(Bytes::from(request.body)))
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

            debug!("POST {}", request.url);

            let exchange = async {
                let response = client
                    .request(http_request)
                    .await
                    .map_err(|e| TransportError::Dispatch(e.to_string()))?;

                let status = response.status().as_u16();
                let body = response
                    .into_body()
                    .collect()
                    .await
                    .map_err(|e| TransportError::Body(e.to_string()))?
                    .to_bytes();

                Ok::<_, TransportError>(TransportResponse {
                    status,
                    body: body.to_vec(),
                })
            };

            let response = tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| TransportError::Timeout(timeout))??;

            debug!("Response: {} ({} bytes)", response.status, response.body.len());
            Ok::<_, TransportError>(response)
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Reply, ScriptedTransport};
    use super::*;

    fn request() -> PendingRequest {
        PendingRequest {
            url: "http://127.0.0.1:9/analytics/events/add/".to_string(),
            headers: vec![("Authorization".to_string(), "Token t".to_string())],
            body: br#"{"name":"x"}"#.to_vec(),
        }
    }

    #[test]
    fn test_config_from_server() {
        let server = ServerConfig {
            request_timeout_secs: 3,
            ..Default::default()
        };
        assert_eq!(TransportConfig::from(&server).request_timeout, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_invalid_url_is_dispatch_side() {
        let transport = HttpTransport::new(TransportConfig::default());
        let mut bad = request();
        bad.url = "not a url".to_string();

        let result = transport.send(bad).await;
        assert!(matches!(result, Err(TransportError::InvalidRequest(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_transport() {
        let transport = ScriptedTransport::new(vec![Reply::Status(404)], Reply::Status(200));

        assert_eq!(transport.send(request()).await.unwrap().status, 404);
        assert_eq!(transport.send(request()).await.unwrap().status, 200);
        assert_eq!(transport.sent_names(), vec!["x", "x"]);
        assert_eq!(transport.max_in_flight(), 1);
    }
}
