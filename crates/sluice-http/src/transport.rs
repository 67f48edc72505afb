//! Single-shot HTTP GET, with failures classified for the retry layer.

use std::time::Duration;

/// How a transport attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Could not establish a connection.
    Connect,
    /// The request or response timed out.
    Timeout,
    /// Sending the request failed after connecting.
    Request,
    /// The response body could not be read.
    Body,
    /// The client could not be built or the URL is unusable.
    Setup,
}

impl TransportErrorKind {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportErrorKind::Connect | TransportErrorKind::Timeout | TransportErrorKind::Request
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{kind:?} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_builder() {
            TransportErrorKind::Setup
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Request
        };
        Self::new(kind, err.to_string())
    }
}

/// One GET, no retries. The body is returned whatever the status code.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(&str) -> Result<Vec<u8>, TransportError> + Send + Sync,
{
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self(url)
    }
}

/// Blocking reqwest client.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sluice/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let response = self.client.get(url).send()?;
        tracing::debug!(status = %response.status(), "response received");
        Ok(response.bytes()?.to_vec())
    }
}
