//! FoosPulse Live
//!
//! Client-side synchronization of a live foosball match: a point-in-time
//! snapshot combined with the server's event stream, kept consistent across
//! disconnects, reconnects and lost messages.
//!
//! # Architecture
//!
//! - **Snapshot**: authoritative full state, fetched over HTTP
//! - **Stream**: server-sent events, one connection per subscription
//! - **Reducer**: pure `(state, event) -> state` transitions
//! - **Controller**: one task per subscription that owns the state and
//!   decides when to reconnect and when to refetch
//!
//! Scores are never computed locally; every score-carrying event declares
//! absolute totals.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let fetcher = Arc::new(HttpSnapshotFetcher::from_config(&config)?);
//! let transport = Arc::new(HttpEventTransport::new(&config.api_url, config.connect_timeout())?);
//!
//! let mut live = LiveMatch::spawn(token, fetcher, transport, config.sync_settings());
//! while let Some(view) = live.changed().await {
//!     println!("{:?} {:?}", view.phase, view.state.map(|s| s.score()));
//! }
//! ```
//!
//! # Modules
//!
//! - `controller`: subscription lifecycle (main entry point)
//! - `reducer`: per-event semantics
//! - `stream`: SSE parsing, transport and connection management
//! - `snapshot`: snapshot fetcher and response envelope
//! - `models`: match state, players and events
//! - `config`: application configuration

pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod reducer;
pub mod snapshot;
pub mod stream;

#[cfg(test)]
mod testing;

pub use config::{Config, SyncSettings};
pub use controller::{LiveMatch, SyncPhase, SyncView};
pub use error::{DecodeError, FetchError, FetchResult, StreamError, SyncError};
pub use models::{
    EventType, MatchEvent, MatchMode, MatchState, MatchStatus, Player, Position, ShareToken, Team,
};
pub use reducer::{reduce, Reduction, ResyncReason, ScoreChange, ServerEvent};
pub use snapshot::{HttpSnapshotFetcher, SnapshotFetcher};
pub use stream::{EventTransport, HttpEventTransport};
