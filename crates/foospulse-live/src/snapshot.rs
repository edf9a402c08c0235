//! Snapshot fetcher
//!
//! One-shot, read-only request for the full state of a live match. The API
//! wraps every response in `{"data": ..., "error": ...}`; error responses
//! raised through FastAPI arrive nested under `detail`.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{FetchError, FetchResult};
use crate::models::{
    timestamp, MatchEvent, MatchMode, MatchState, MatchStatus, Player, Position, ShareToken, Team,
};

/// Fetches a complete point-in-time view of a match
///
/// Implementations must be side-effect free so they can be retried.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync + 'static {
    async fn fetch(&self, token: &ShareToken) -> FetchResult<MatchState>;
}

/// Snapshot fetcher for `GET /api/live/{token}`
pub struct HttpSnapshotFetcher {
    api_url: String,
    client: reqwest::Client,
}

impl HttpSnapshotFetcher {
    pub fn new(
        api_url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            api_url: api_url.to_string(),
            client,
        })
    }

    pub fn from_config(config: &Config) -> FetchResult<Self> {
        Self::new(
            &config.api_url,
            config.connect_timeout(),
            config.request_timeout(),
        )
    }
}

#[async_trait]
impl SnapshotFetcher for HttpSnapshotFetcher {
    async fn fetch(&self, token: &ShareToken) -> FetchResult<MatchState> {
        let url = live_url(&self.api_url, token, false).map_err(FetchError::Transient)?;
        debug!(url = %url.path(), "Fetching match snapshot");

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        decode_snapshot(status, &body)
    }
}

/// Build `{api_url}/api/live/{token}` (plus `/stream` for the event stream)
pub(crate) fn live_url(
    api_url: &str,
    token: &ShareToken,
    stream: bool,
) -> Result<reqwest::Url, String> {
    let mut url =
        reqwest::Url::parse(api_url).map_err(|e| format!("Invalid api_url '{}': {}", api_url, e))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| format!("api_url '{}' cannot be used as a base", api_url))?;
        segments.pop_if_empty().extend(["api", "live", token.as_str()]);
        if stream {
            segments.push("stream");
        }
    }
    Ok(url)
}

/// Error body of the uniform envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Detail { detail: Envelope<serde_json::Value> },
    Plain(Envelope<serde_json::Value>),
}

impl ErrorBody {
    fn into_error(self) -> Option<ApiError> {
        match self {
            ErrorBody::Detail { detail } => detail.error,
            ErrorBody::Plain(envelope) => envelope.error,
        }
    }
}

/// Public view of a live match as served by the API
#[derive(Debug, Deserialize)]
struct SnapshotPayload {
    share_token: String,
    mode: MatchMode,
    status: MatchStatus,
    team_a_score: i32,
    team_b_score: i32,
    #[serde(default)]
    players: Vec<PlayerPayload>,
    #[serde(default)]
    events: Vec<MatchEvent>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    can_score: bool,
}

#[derive(Debug, Deserialize)]
struct PlayerPayload {
    player_id: String,
    nickname: String,
    team: Team,
    position: Position,
}

impl From<SnapshotPayload> for MatchState {
    fn from(payload: SnapshotPayload) -> Self {
        let mut seen = HashSet::new();
        let players = payload
            .players
            .into_iter()
            .filter(|p| seen.insert(p.player_id.clone()))
            .map(|p| Player {
                player_id: p.player_id,
                display_name: p.nickname,
                team: p.team,
                position: p.position,
            })
            .collect();

        MatchState {
            match_id: payload.share_token,
            mode: payload.mode,
            status: payload.status,
            team_a_score: payload.team_a_score,
            team_b_score: payload.team_b_score,
            players,
            events: payload.events,
            started_at: payload.started_at,
            connected: false,
            can_score: payload.can_score,
        }
    }
}

/// Turn an HTTP status and body into a snapshot or a classified failure
pub fn decode_snapshot(status: u16, body: &str) -> FetchResult<MatchState> {
    if !(200..300).contains(&status) {
        let api_error = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(ErrorBody::into_error);
        return Err(classify(status, api_error));
    }

    let envelope: Envelope<SnapshotPayload> = serde_json::from_str(body).map_err(|e| {
        warn!(error = %e, "Snapshot body did not match the expected shape");
        FetchError::Transient(format!("Malformed snapshot response: {}", e))
    })?;

    if let Some(api_error) = envelope.error {
        return Err(classify(status, Some(api_error)));
    }

    envelope
        .data
        .map(MatchState::from)
        .ok_or_else(|| FetchError::Transient("Snapshot response carried no data".to_string()))
}

fn classify(status: u16, api_error: Option<ApiError>) -> FetchError {
    let message = api_error
        .as_ref()
        .map(|e| e.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status));

    match api_error.as_ref().map(|e| e.code.as_str()) {
        Some("UNAUTHORIZED") | Some("FORBIDDEN") => FetchError::Auth(message),
        // A token the server cannot parse addresses no match.
        Some("NOT_FOUND") | Some("VALIDATION_ERROR") => FetchError::NotFound(message),
        _ => match status {
            401 | 403 => FetchError::Auth(message),
            400 | 404 | 410 | 422 => FetchError::NotFound(message),
            _ => FetchError::Transient(message),
        },
    }
}
