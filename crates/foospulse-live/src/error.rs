//! Error types for live match synchronization
//!
//! Snapshot and stream failures are classified up front so the controller
//! can decide between retrying, resyncing and giving up.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by a snapshot fetch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Token invalid or expired
    #[error("Not authorized to view this match: {0}")]
    Auth(String),

    /// Match does not exist or was deleted
    #[error("Live match not found: {0}")]
    NotFound(String),

    /// Network or server hiccup, safe to retry
    #[error("Snapshot request failed: {0}")]
    Transient(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transient(err.to_string())
    }
}

/// Errors surfaced by an event stream connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Server rejected the token (401/403)
    #[error("Event stream rejected the share token")]
    Unauthorized,

    /// Server does not know the match (404)
    #[error("Event stream for this match was not found")]
    NotFound,

    /// Any other non-success status
    #[error("Event stream returned HTTP {0}")]
    HttpStatus(u16),

    /// Connect or read failure
    #[error("Event stream transport error: {0}")]
    Transport(String),

    /// Server ended the stream
    #[error("Event stream closed by server")]
    Closed,

    /// Nothing received within the liveness window
    #[error("No data on event stream for {0:?}")]
    HeartbeatTimeout(Duration),
}

impl StreamError {
    /// Fatal errors will not be fixed by reopening the stream.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StreamError::Unauthorized | StreamError::NotFound)
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

/// A known stream event whose payload could not be decoded
#[derive(Error, Debug)]
#[error("Malformed '{event_type}' payload: {source}")]
pub struct DecodeError {
    pub event_type: String,
    #[source]
    pub source: serde_json::Error,
}

/// Synchronization failures, as seen by the caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Match not found: {0}")]
    NotFound(String),

    #[error("Temporary failure: {0}")]
    Transient(String),

    /// An event referenced state that is not present locally
    #[error("Local state out of sync: event '{event_id}' is unknown")]
    Desync { event_id: String },
}

impl SyncError {
    /// Recoverable errors are repaired internally and never surfaced.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SyncError::Transient(_) | SyncError::Desync { .. })
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            SyncError::Auth(_) => Some("Ask for a fresh share link and open the match again."),
            SyncError::NotFound(_) => {
                Some("The match may have been finalized or deleted. Check the share link.")
            }
            _ => None,
        }
    }
}

impl From<FetchError> for SyncError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Auth(msg) => SyncError::Auth(msg),
            FetchError::NotFound(msg) => SyncError::NotFound(msg),
            FetchError::Transient(msg) => SyncError::Transient(msg),
        }
    }
}

/// Result type for snapshot fetches
pub type FetchResult<T> = Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_fetch_is_recoverable() {
        assert!(SyncError::from(FetchError::Transient("timeout".into())).is_recoverable());
        assert!(!SyncError::from(FetchError::Auth("expired".into())).is_recoverable());
        assert!(!SyncError::from(FetchError::NotFound("gone".into())).is_recoverable());
    }

    #[test]
    fn test_stream_error_fatal() {
        assert!(StreamError::Unauthorized.is_fatal());
        assert!(StreamError::NotFound.is_fatal());
        assert!(!StreamError::Closed.is_fatal());
        assert!(!StreamError::HttpStatus(502).is_fatal());
        assert!(!StreamError::HeartbeatTimeout(Duration::from_secs(45)).is_fatal());
    }

    #[test]
    fn test_sync_error_from_fetch() {
        let err: SyncError = FetchError::NotFound("Live match not found".into()).into();
        assert_eq!(err, SyncError::NotFound("Live match not found".into()));
        assert!(!err.is_recoverable());
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_desync_is_recoverable() {
        let err = SyncError::Desync {
            event_id: "e9".into(),
        };
        assert!(err.is_recoverable());
        assert!(err.recovery_suggestion().is_none());
        assert!(err.to_string().contains("e9"));
    }
}
