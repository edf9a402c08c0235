//! Stream connection manager
//!
//! Owns at most one event stream connection per subscription. Each
//! connection runs on its own reader task which parses SSE frames and
//! forwards them, in arrival order, as [`Delivery`] values tagged with the
//! connection they came from. The manager never reconnects on its own;
//! errors are forwarded and the connection ends.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::parser::SseParser;
use super::transport::EventTransport;
use crate::error::StreamError;
use crate::models::ShareToken;

/// Identifies one opened connection. Never reused within a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle and message signals from a connection
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    /// The server accepted the stream
    Open,
    /// A named event with its raw payload
    Message { event_type: String, data: String },
    /// The connection failed or ended; nothing further follows
    Error(StreamError),
}

/// A signal tagged with its connection
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub connection: ConnectionId,
    pub signal: StreamSignal,
}

/// Manages the single live connection of a subscription
pub struct ConnectionManager<T: EventTransport> {
    transport: Arc<T>,
    heartbeat_timeout: Duration,
    tx: mpsc::UnboundedSender<Delivery>,
    next_id: u64,
    current: Option<(ConnectionId, JoinHandle<()>)>,
}

impl<T: EventTransport> ConnectionManager<T> {
    /// Create a manager and the receiver its deliveries arrive on
    pub fn new(
        transport: Arc<T>,
        heartbeat_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = Self {
            transport,
            heartbeat_timeout,
            tx,
            next_id: 0,
            current: None,
        };
        (manager, rx)
    }

    /// Open a connection for `token`, tearing down any previous one first
    pub fn open(&mut self, token: &ShareToken) -> ConnectionId {
        self.close_all();

        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        debug!(connection = %id, "Opening stream connection");

        let task = tokio::spawn(read_connection(
            Arc::clone(&self.transport),
            token.clone(),
            id,
            self.heartbeat_timeout,
            self.tx.clone(),
        ));
        self.current = Some((id, task));
        id
    }

    /// Close `id` if it is the current connection
    pub fn close(&mut self, id: ConnectionId) -> bool {
        if self.is_current(id) {
            self.close_all();
            true
        } else {
            false
        }
    }

    /// Close whatever connection is open
    pub fn close_all(&mut self) {
        if let Some((id, task)) = self.current.take() {
            debug!(connection = %id, "Closing stream connection");
            task.abort();
        }
    }

    pub fn current(&self) -> Option<ConnectionId> {
        self.current.as_ref().map(|(id, _)| *id)
    }

    pub fn is_current(&self, id: ConnectionId) -> bool {
        self.current() == Some(id)
    }
}

impl<T: EventTransport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// Reader task for one connection
async fn read_connection<T: EventTransport>(
    transport: Arc<T>,
    token: ShareToken,
    id: ConnectionId,
    heartbeat_timeout: Duration,
    tx: mpsc::UnboundedSender<Delivery>,
) {
    let send = |signal: StreamSignal| {
        tx.send(Delivery {
            connection: id,
            signal,
        })
        .is_ok()
    };

    let mut stream = match tokio::time::timeout(heartbeat_timeout, transport.connect(&token)).await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!(connection = %id, error = %e, "Stream connect failed");
            send(StreamSignal::Error(e));
            return;
        }
        Err(_) => {
            warn!(connection = %id, "Stream connect timed out");
            send(StreamSignal::Error(StreamError::HeartbeatTimeout(
                heartbeat_timeout,
            )));
            return;
        }
    };

    info!(connection = %id, "Stream connected");
    if !send(StreamSignal::Open) {
        return;
    }

    let mut parser = SseParser::new();
    loop {
        let error = match tokio::time::timeout(heartbeat_timeout, stream.next()).await {
            Ok(Some(Ok(chunk))) => {
                for event in parser.feed(&chunk) {
                    let signal = StreamSignal::Message {
                        event_type: event.name().to_string(),
                        data: event.data,
                    };
                    if !send(signal) {
                        return;
                    }
                }
                continue;
            }
            Ok(Some(Err(e))) => e,
            Ok(None) => StreamError::Closed,
            Err(_) => StreamError::HeartbeatTimeout(heartbeat_timeout),
        };

        warn!(connection = %id, error = %error, "Stream connection lost");
        send(StreamSignal::Error(error));
        return;
    }
}
