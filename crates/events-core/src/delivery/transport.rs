//! Outbound delivery calls

use std::time::Duration;

use async_trait::async_trait;

/// Default bound on a single delivery call
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised before a response status is available
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The call did not complete within the per-attempt timeout
    #[error("request timed out")]
    Timeout,

    /// Connection, TLS, redirect or URL error
    #[error("request failed: {0}")]
    Request(String),
}

/// Performs one delivery call against an event target
///
/// Returns the response status code. Interpreting the status is up to the
/// caller.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn get(&self, target: &str) -> Result<u16, TransportError>;
}

/// [`DeliveryTransport`] issuing a plain `GET` with reqwest
///
/// No custom headers, body or signature are sent.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport whose calls are bounded by `timeout`
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DeliveryTransport for HttpTransport {
    async fn get(&self, target: &str) -> Result<u16, TransportError> {
        let response = self.client.get(target).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Request(e.to_string())
            }
        })?;

        Ok(response.status().as_u16())
    }
}
