//! Data models for live matches
//!
//! `MatchState` is the local projection of one live match. Its scores are
//! always the values the server last declared; nothing here derives a score
//! from the event log.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque share token addressing a live match.
///
/// The token is only ever propagated to the server, never parsed.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareToken(String);

impl ShareToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShareToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Keep tokens out of logs in full.
impl fmt::Debug for ShareToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "ShareToken({}…)", prefix)
    }
}

/// Team side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    A,
    B,
}

/// Table position of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Attack,
    Defense,
}

/// Match format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMode {
    #[serde(rename = "1v1")]
    OneVsOne,
    #[serde(rename = "2v2")]
    TwoVsTwo,
    #[serde(rename = "2v1")]
    TwoVsOne,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchMode::OneVsOne => "1v1",
            MatchMode::TwoVsTwo => "2v2",
            MatchMode::TwoVsOne => "2v1",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of a live match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Waiting,
    Active,
    Paused,
    Completed,
    Abandoned,
}

impl MatchStatus {
    /// Whether the match has ended (no further scoring expected)
    pub fn is_finished(&self) -> bool {
        matches!(self, MatchStatus::Completed | MatchStatus::Abandoned)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchStatus::Waiting => "waiting",
            MatchStatus::Active => "active",
            MatchStatus::Paused => "paused",
            MatchStatus::Completed => "completed",
            MatchStatus::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// Kind of a recorded match event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Goal,
    /// -1 for the team
    Gamellized,
    /// Ball above the bar, -3 for the team
    Lobbed,
    Timeout,
    Custom,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Goal => "goal",
            EventType::Gamellized => "gamellized",
            EventType::Lobbed => "lobbed",
            EventType::Timeout => "timeout",
            EventType::Custom => "custom",
        };
        f.write_str(s)
    }
}

/// A player taking part in the match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub player_id: String,
    pub display_name: String,
    pub team: Team,
    pub position: Position,
}

/// An event from the server's match log
///
/// Events are never edited locally except for the `undone` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvent {
    /// Server-assigned unique id
    pub id: String,
    pub event_type: EventType,
    pub team: Option<Team>,
    pub by_player_id: Option<String>,
    pub by_player_nickname: Option<String>,
    pub against_player_id: Option<String>,
    pub against_player_nickname: Option<String>,
    /// Only set for `EventType::Custom`
    pub custom_type: Option<String>,
    /// Opaque payload attached by the scorer
    pub metadata: Option<serde_json::Value>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub recorded_at: DateTime<Utc>,
    /// Seconds since the match started, when known
    pub elapsed_seconds: Option<u32>,
    #[serde(default)]
    pub undone: bool,
}

impl MatchEvent {
    /// Flip the undone flag. Returns false if it was already set.
    pub fn mark_undone(&mut self) -> bool {
        if self.undone {
            return false;
        }
        self.undone = true;
        true
    }
}

/// Local projection of one live match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchState {
    /// The share token the match is addressed by
    pub match_id: String,
    pub mode: MatchMode,
    pub status: MatchStatus,
    pub team_a_score: i32,
    pub team_b_score: i32,
    /// Unique per `player_id`, in server order
    pub players: Vec<Player>,
    /// Append-only, in server emission order
    pub events: Vec<MatchEvent>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub started_at: Option<DateTime<Utc>>,
    /// Liveness of the event stream (client-side only)
    #[serde(default)]
    pub connected: bool,
    /// Whether the current viewer may record events
    #[serde(default)]
    pub can_score: bool,
}

impl MatchState {
    /// Current score as `(team A, team B)`
    pub fn score(&self) -> (i32, i32) {
        (self.team_a_score, self.team_b_score)
    }

    /// Look up an event by id
    pub fn event(&self, id: &str) -> Option<&MatchEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    /// Events that have not been undone
    pub fn active_events(&self) -> impl Iterator<Item = &MatchEvent> {
        self.events.iter().filter(|e| !e.undone)
    }

    /// Players on one side, in roster order
    pub fn team(&self, team: Team) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(move |p| p.team == team)
    }
}

/// Server timestamps are RFC 3339, except that some are emitted without an
/// offset. Offset-less values are UTC.
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw))),
            None => Ok(None),
        }
    }
}
