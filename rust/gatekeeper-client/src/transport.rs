//! Delivery of encoded documents to a remote gatekeeper.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use thiserror::Error;

/// Content type of request and response documents.
pub const DOCUMENT_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A document could not be delivered, or no document came back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request did not complete.
    #[error("Gatekeeper request failed: {0}")]
    Request(String),

    /// The gatekeeper refused the caller's credentials.
    #[error("Gatekeeper rejected the client's credentials")]
    Unauthorized,

    /// The gatekeeper answered without a response document.
    #[error("Gatekeeper responded with HTTP {status} and no document")]
    Status {
        /// HTTP status code.
        status: u16,
    },
}

/// Carries one encoded request document to a gatekeeper and returns its
/// encoded response document.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `document` and wait for the answer.
    async fn exchange(&self, document: String) -> Result<String, TransportError>;
}

/// Credentials [`HttpTransport`] presents to the gatekeeper.
#[derive(Clone, Debug, Default)]
pub enum AuthMethod {
    /// Anonymous; the gatekeeper sees only the connection.
    #[default]
    None,

    /// Sent as an `Authorization: Bearer` header on each exchange.
    Bearer(String),
}

/// Where and how [`HttpTransport`] reaches the gatekeeper.
#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    /// Gatekeeper URL, path included.
    pub endpoint: String,

    /// Credentials for the gatekeeper itself.
    pub auth_method: AuthMethod,

    /// Per-exchange deadline in seconds; `None` waits indefinitely.
    pub timeout_seconds: Option<u64>,

    /// Headers added to every exchange, e.g. a session marker.
    pub headers: Vec<(String, String)>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/gatekeeper".to_string(),
            auth_method: AuthMethod::None,
            timeout_seconds: Some(30),
            headers: Vec::new(),
        }
    }
}

impl HttpTransportConfig {
    /// Reach the gatekeeper at `endpoint` with the default deadline.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Present `auth_method` on every exchange.
    pub fn with_auth(mut self, auth_method: AuthMethod) -> Self {
        self.auth_method = auth_method;
        self
    }

    /// Give up on an exchange after `seconds`.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Send `name: value` on every exchange.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Posts documents to a gatekeeper over HTTP.
///
/// Error statuses that still carry a response document (malformed request,
/// signing failure) are returned as documents, so the caller can read the
/// gatekeeper's error code.
///
/// ```no_run
/// use gatekeeper_client::{AuthMethod, HttpTransport, HttpTransportConfig, Reconciler, Resolver};
///
/// let config = HttpTransportConfig::new("https://gatekeeper.example.com/gatekeeper")
///     .with_auth(AuthMethod::Bearer("my-token".to_string()))
///     .with_timeout(60);
/// let reconciler = Reconciler::new(Resolver::remote(HttpTransport::new(config)));
/// ```
#[derive(Clone, Debug)]
pub struct HttpTransport {
    config: HttpTransportConfig,
    client: Client,
}

impl HttpTransport {
    /// Transport for `config`.
    pub fn new(config: HttpTransportConfig) -> Self {
        let builder = match config.timeout_seconds {
            Some(seconds) => Client::builder().timeout(Duration::from_secs(seconds)),
            None => Client::builder(),
        };
        let client = builder.build().unwrap_or_default();
        Self { config, client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(&self, document: String) -> Result<String, TransportError> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header(header::CONTENT_TYPE, DOCUMENT_CONTENT_TYPE)
            .body(document);
        if let AuthMethod::Bearer(token) = &self.config.auth_method {
            request = request.bearer_auth(token);
        }
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|error| TransportError::Request(error.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TransportError::Unauthorized);
        }

        let carries_document = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with(DOCUMENT_CONTENT_TYPE));
        if !status.is_success() && !carries_document {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|error| TransportError::Request(error.to_string()))
    }
}
