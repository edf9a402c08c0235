//! Test fixtures: sample match data and scripted in-memory collaborators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::error::{FetchError, FetchResult, StreamError};
use crate::models::{
    EventType, MatchEvent, MatchMode, MatchState, MatchStatus, Player, Position, ShareToken, Team,
};
use crate::snapshot::SnapshotFetcher;
use crate::stream::transport::{ByteStream, EventTransport};

pub fn event(id: &str, event_type: EventType) -> MatchEvent {
    MatchEvent {
        id: id.to_string(),
        event_type,
        team: Some(Team::A),
        by_player_id: Some("p1".to_string()),
        by_player_nickname: Some("Ana".to_string()),
        against_player_id: None,
        against_player_nickname: None,
        custom_type: None,
        metadata: None,
        recorded_at: Utc.with_ymd_and_hms(2024, 3, 1, 18, 30, 0).unwrap(),
        elapsed_seconds: Some(60),
        undone: false,
    }
}

/// Active 1v1 at 3-2 with events e1, e2, e3
pub fn sample_state() -> MatchState {
    MatchState {
        match_id: "tok123".to_string(),
        mode: MatchMode::OneVsOne,
        status: MatchStatus::Active,
        team_a_score: 3,
        team_b_score: 2,
        players: vec![
            Player {
                player_id: "p1".to_string(),
                display_name: "Ana".to_string(),
                team: Team::A,
                position: Position::Attack,
            },
            Player {
                player_id: "p2".to_string(),
                display_name: "Bo".to_string(),
                team: Team::B,
                position: Position::Defense,
            },
        ],
        events: vec![
            event("e1", EventType::Goal),
            event("e2", EventType::Goal),
            event("e3", EventType::Goal),
        ],
        started_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 18, 29, 0).unwrap()),
        connected: false,
        can_score: false,
    }
}

/// Encode one SSE frame
pub fn frame(event_type: &str, data: &str) -> Vec<u8> {
    format!("event: {}\ndata: {}\n\n", event_type, data).into_bytes()
}

// ── Transport ───────────────────────────────────────────────────

type Chunk = Option<Result<Vec<u8>, StreamError>>;

enum Connect {
    Stream(mpsc::UnboundedReceiver<Chunk>),
    Reject(StreamError),
}

/// Feeds one scripted stream. Dropping every handle ends the stream.
#[derive(Clone)]
pub struct StreamHandle {
    tx: mpsc::UnboundedSender<Chunk>,
}

impl StreamHandle {
    pub fn send(&self, bytes: Vec<u8>) {
        let _ = self.tx.send(Some(Ok(bytes)));
    }

    pub fn send_event(&self, event_type: &str, data: &str) {
        self.send(frame(event_type, data));
    }

    pub fn fail(&self, error: StreamError) {
        let _ = self.tx.send(Some(Err(error)));
    }

    /// End the stream as a server close would
    pub fn close(&self) {
        let _ = self.tx.send(None);
    }
}

/// Transport that hands out scripted streams in order.
///
/// Once the script runs out, connects succeed with a stream that never
/// yields anything.
#[derive(Default)]
pub struct MockTransport {
    script: StdMutex<VecDeque<Connect>>,
    connects: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_stream(&self) -> StreamHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script.lock().unwrap().push_back(Connect::Stream(rx));
        StreamHandle { tx }
    }

    pub fn push_reject(&self, error: StreamError) {
        self.script.lock().unwrap().push_back(Connect::Reject(error));
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventTransport for MockTransport {
    async fn connect(&self, _token: &ShareToken) -> Result<ByteStream, StreamError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();

        match next {
            Some(Connect::Stream(rx)) => {
                let stream = futures_util::stream::unfold(rx, |mut rx| async move {
                    match rx.recv().await {
                        Some(Some(item)) => Some((item, rx)),
                        _ => None,
                    }
                });
                Ok(Box::pin(stream))
            }
            Some(Connect::Reject(error)) => Err(error),
            None => Ok(Box::pin(futures_util::stream::pending::<
                Result<Vec<u8>, StreamError>,
            >())),
        }
    }
}

// ── Fetcher ─────────────────────────────────────────────────────

enum Response {
    Ready(FetchResult<MatchState>),
    Gated(oneshot::Receiver<FetchResult<MatchState>>),
}

/// Fetcher answering from a queue, then from the current "server truth"
#[derive(Default)]
pub struct MockFetcher {
    responses: StdMutex<VecDeque<Response>>,
    truth: StdMutex<Option<MatchState>>,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unscripted fetch with `state`
    pub fn with_truth(state: MatchState) -> Self {
        let fetcher = Self::default();
        fetcher.set_truth(state);
        fetcher
    }

    pub fn set_truth(&self, state: MatchState) {
        *self.truth.lock().unwrap() = Some(state);
    }

    pub fn push(&self, result: FetchResult<MatchState>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Response::Ready(result));
    }

    /// Queue a response that resolves only when the returned sender fires
    pub fn push_gated(&self) -> oneshot::Sender<FetchResult<MatchState>> {
        let (tx, rx) = oneshot::channel();
        self.responses
            .lock()
            .unwrap()
            .push_back(Response::Gated(rx));
        tx
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotFetcher for MockFetcher {
    async fn fetch(&self, _token: &ShareToken) -> FetchResult<MatchState> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().unwrap().pop_front();

        match next {
            Some(Response::Ready(result)) => result,
            Some(Response::Gated(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(FetchError::Transient("gate dropped".into()))),
            None => {
                let truth = self.truth.lock().unwrap().clone();
                truth.ok_or_else(|| FetchError::Transient("no scripted response".into()))
            }
        }
    }
}
