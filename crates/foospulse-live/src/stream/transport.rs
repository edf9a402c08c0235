//! Event stream transport
//!
//! The connection manager only needs "give me the byte stream for this
//! token"; the HTTP implementation lives here so tests can swap in an
//! in-memory transport.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tracing::{debug, info};

use crate::error::StreamError;
use crate::models::ShareToken;
use crate::snapshot::live_url;

/// Raw chunks of an open event stream
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, StreamError>> + Send>>;

/// Something that can open a server-sent event stream for a match
#[async_trait]
pub trait EventTransport: Send + Sync + 'static {
    /// Open the stream; resolves once the server has accepted it
    async fn connect(&self, token: &ShareToken) -> Result<ByteStream, StreamError>;
}

/// SSE over HTTP (`GET /api/live/{token}/stream`)
pub struct HttpEventTransport {
    api_url: String,
    client: reqwest::Client,
}

impl HttpEventTransport {
    pub fn new(api_url: &str, connect_timeout: Duration) -> Result<Self, StreamError> {
        // No overall timeout: the response body is long-lived. Liveness is
        // enforced by the heartbeat window in the connection manager.
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            api_url: api_url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl EventTransport for HttpEventTransport {
    async fn connect(&self, token: &ShareToken) -> Result<ByteStream, StreamError> {
        let url = live_url(&self.api_url, token, true).map_err(StreamError::Transport)?;
        debug!(url = %url.path(), "Opening event stream");

        let response = self
            .client
            .get(url)
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .send()
            .await?;

        let status = response.status();
        match status.as_u16() {
            401 | 403 => return Err(StreamError::Unauthorized),
            404 => return Err(StreamError::NotFound),
            _ if !status.is_success() => return Err(StreamError::HttpStatus(status.as_u16())),
            _ => {}
        }

        info!("Event stream accepted");

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(StreamError::from));

        Ok(Box::pin(stream))
    }
}
