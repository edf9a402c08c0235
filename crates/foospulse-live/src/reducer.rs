//! Event reducer
//!
//! Stateless mapping from `(state, server event)` to the next state. Every
//! named stream event decodes into one [`ServerEvent`] variant and every
//! variant is handled by the single `match` in [`reduce`], so a new event
//! type cannot be added without deciding its semantics.
//!
//! Scores carried by events are absolute totals declared by the server and
//! replace the local ones; replaying the same message is a no-op.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{DecodeError, SyncError};
use crate::models::{EventType, MatchState, MatchStatus, Team};

/// Score totals after a score-affecting event, plus who caused it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScoreChange {
    #[serde(default)]
    pub team: Option<Team>,
    #[serde(default)]
    pub by_player_id: Option<String>,
    #[serde(default)]
    pub by_player_nickname: Option<String>,
    pub team_a_score: i32,
    pub team_b_score: i32,
}

/// A decoded message from the event stream
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Lifecycle: the server accepted the subscription
    Connected,
    Goal(ScoreChange),
    Gamellized(ScoreChange),
    Lobbed(ScoreChange),
    /// Direct score correction by a scorer
    ScoreUpdate(ScoreChange),
    StatusChange {
        status: MatchStatus,
    },
    Undo {
        event_id: String,
        team_a_score: i32,
        team_b_score: i32,
    },
    Timeout {
        team: Option<Team>,
    },
    Custom {
        custom_type: Option<String>,
        metadata: Option<serde_json::Value>,
    },
    /// Liveness only
    Heartbeat,
}

#[derive(Deserialize)]
struct StatusPayload {
    status: MatchStatus,
}

#[derive(Deserialize)]
struct UndoPayload {
    event_id: String,
    team_a_score: i32,
    team_b_score: i32,
}

#[derive(Deserialize)]
struct TimeoutPayload {
    #[serde(default)]
    team: Option<Team>,
}

#[derive(Deserialize)]
struct CustomPayload {
    #[serde(default)]
    custom_type: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

impl ServerEvent {
    /// Decode a named stream event.
    ///
    /// Returns `Ok(None)` for event names this client does not know, which
    /// are ignored rather than treated as errors.
    pub fn decode(event_type: &str, data: &str) -> Result<Option<Self>, DecodeError> {
        let event = match event_type {
            "connected" => ServerEvent::Connected,
            "heartbeat" => ServerEvent::Heartbeat,
            "goal" => ServerEvent::Goal(payload(event_type, data)?),
            "gamellized" => ServerEvent::Gamellized(payload(event_type, data)?),
            "lobbed" => ServerEvent::Lobbed(payload(event_type, data)?),
            "score_update" => ServerEvent::ScoreUpdate(payload(event_type, data)?),
            "status_change" => {
                let p: StatusPayload = payload(event_type, data)?;
                ServerEvent::StatusChange { status: p.status }
            }
            "undo" => {
                let p: UndoPayload = payload(event_type, data)?;
                ServerEvent::Undo {
                    event_id: p.event_id,
                    team_a_score: p.team_a_score,
                    team_b_score: p.team_b_score,
                }
            }
            "timeout" => {
                let p: TimeoutPayload = payload(event_type, data)?;
                ServerEvent::Timeout { team: p.team }
            }
            "custom" => {
                let p: CustomPayload = payload(event_type, data)?;
                ServerEvent::Custom {
                    custom_type: p.custom_type,
                    metadata: p.metadata,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected => "connected",
            ServerEvent::Goal(_) => "goal",
            ServerEvent::Gamellized(_) => "gamellized",
            ServerEvent::Lobbed(_) => "lobbed",
            ServerEvent::ScoreUpdate(_) => "score_update",
            ServerEvent::StatusChange { .. } => "status_change",
            ServerEvent::Undo { .. } => "undo",
            ServerEvent::Timeout { .. } => "timeout",
            ServerEvent::Custom { .. } => "custom",
            ServerEvent::Heartbeat => "heartbeat",
        }
    }

    /// The score change carried by goal-like events
    pub fn score_change(&self) -> Option<&ScoreChange> {
        match self {
            ServerEvent::Goal(c)
            | ServerEvent::Gamellized(c)
            | ServerEvent::Lobbed(c)
            | ServerEvent::ScoreUpdate(c) => Some(c),
            _ => None,
        }
    }
}

fn payload<T: DeserializeOwned>(event_type: &str, data: &str) -> Result<T, DecodeError> {
    serde_json::from_str(data).map_err(|source| DecodeError {
        event_type: event_type.to_string(),
        source,
    })
}

/// Why an event could not be applied in place
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResyncReason {
    /// `timeout` / `custom`: the push payload does not describe the change
    OpaqueEvent(EventType),
    /// `undo` of an event that is not in the local log
    UnknownEvent { event_id: String },
    /// A known event type arrived with an undecodable payload
    MalformedPayload { event_type: String },
    /// The stream was reopened and the snapshot is refetched to close the gap
    Reconnect,
}

impl ResyncReason {
    /// The desync this reason represents, if any
    pub fn desync(&self) -> Option<SyncError> {
        match self {
            ResyncReason::UnknownEvent { event_id } => Some(SyncError::Desync {
                event_id: event_id.clone(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for ResyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResyncReason::OpaqueEvent(kind) => write!(f, "'{}' event has no usable diff", kind),
            ResyncReason::UnknownEvent { event_id } => {
                write!(f, "undo references unknown event '{}'", event_id)
            }
            ResyncReason::MalformedPayload { event_type } => {
                write!(f, "malformed '{}' payload", event_type)
            }
            ResyncReason::Reconnect => f.write_str("stream reconnected"),
        }
    }
}

/// Outcome of reducing one event
#[derive(Debug, Clone, PartialEq)]
pub enum Reduction {
    /// Replace the state wholesale
    Next(MatchState),
    /// The event does not change anything
    Unchanged,
    /// Refetch the snapshot instead of guessing
    Resync(ResyncReason),
}

/// Apply one server event to the current state.
pub fn reduce(state: &MatchState, event: &ServerEvent) -> Reduction {
    match event {
        ServerEvent::Connected => {
            if state.connected {
                return Reduction::Unchanged;
            }
            let mut next = state.clone();
            next.connected = true;
            Reduction::Next(next)
        }
        ServerEvent::Goal(change)
        | ServerEvent::Gamellized(change)
        | ServerEvent::Lobbed(change)
        | ServerEvent::ScoreUpdate(change) => {
            replace_scores(state, change.team_a_score, change.team_b_score)
        }
        ServerEvent::StatusChange { status } => {
            if state.status == *status {
                return Reduction::Unchanged;
            }
            let mut next = state.clone();
            next.status = *status;
            Reduction::Next(next)
        }
        ServerEvent::Undo {
            event_id,
            team_a_score,
            team_b_score,
        } => {
            let Some(index) = state.events.iter().position(|e| e.id == *event_id) else {
                return Reduction::Resync(ResyncReason::UnknownEvent {
                    event_id: event_id.clone(),
                });
            };

            let mut next = state.clone();
            let flipped = next.events[index].mark_undone();
            next.team_a_score = *team_a_score;
            next.team_b_score = *team_b_score;

            if !flipped && next.score() == state.score() {
                Reduction::Unchanged
            } else {
                Reduction::Next(next)
            }
        }
        ServerEvent::Timeout { .. } => Reduction::Resync(ResyncReason::OpaqueEvent(EventType::Timeout)),
        ServerEvent::Custom { .. } => Reduction::Resync(ResyncReason::OpaqueEvent(EventType::Custom)),
        ServerEvent::Heartbeat => Reduction::Unchanged,
    }
}

/// Reduce a message that was buffered while a fresh snapshot was loading.
///
/// Public snapshots omit undone events, so an `undo` for an event missing
/// from a fresh snapshot has usually been folded in already. Its absolute
/// scores are still applied (later buffered messages override them) but no
/// further resync is requested.
pub fn reduce_buffered(state: &MatchState, event: &ServerEvent) -> Reduction {
    match event {
        ServerEvent::Undo {
            event_id,
            team_a_score,
            team_b_score,
        } if state.event(event_id).is_none() => {
            replace_scores(state, *team_a_score, *team_b_score)
        }
        _ => reduce(state, event),
    }
}

fn replace_scores(state: &MatchState, team_a_score: i32, team_b_score: i32) -> Reduction {
    if state.score() == (team_a_score, team_b_score) {
        return Reduction::Unchanged;
    }
    let mut next = state.clone();
    next.team_a_score = team_a_score;
    next.team_b_score = team_b_score;
    Reduction::Next(next)
}
