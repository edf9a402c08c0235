//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use chrono::Local;
use serde_json::json;

use foospulse_live::{MatchEvent, MatchState, Position, SyncView, Team};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print a full match state
    pub fn print_state(&self, state: &MatchState) {
        match self.format {
            OutputFormat::Human => {
                println!("Match:    {} ({}, {})", state.match_id, state.mode, state.status);
                println!("Score:    {}", score_line(state));
                println!("Team A:   {}", roster(state, Team::A));
                println!("Team B:   {}", roster(state, Team::B));
                if let Some(started) = state.started_at {
                    println!(
                        "Started:  {}",
                        started.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                    );
                }

                if !state.events.is_empty() {
                    println!();
                    println!("── Events ({}) ──", state.events.len());
                    for event in &state.events {
                        println!("{}", event_line(event));
                    }
                }
            }
            OutputFormat::Json => match serde_json::to_string_pretty(state) {
                Ok(s) => println!("{}", s),
                Err(e) => eprintln!("Failed to encode match state: {}", e),
            },
            OutputFormat::Quiet => {
                println!("{}-{}", state.team_a_score, state.team_b_score);
            }
        }
    }

    /// Print one line per view change while watching
    pub fn print_view(&self, view: &SyncView) {
        match self.format {
            OutputFormat::Human => {
                let marker = if view.connected { "●" } else { "○" };
                match (&view.state, &view.error) {
                    (_, Some(err)) => println!("{} [{}] {}", marker, view.phase, err),
                    (Some(state), None) => println!(
                        "{} [{}] {}  {}  ({} events)",
                        marker,
                        view.phase,
                        score_line(state),
                        state.status,
                        state.active_events().count()
                    ),
                    (None, None) => println!("{} [{}]", marker, view.phase),
                }
            }
            OutputFormat::Json => {
                let value = json!({
                    "phase": view.phase.to_string(),
                    "connected": view.connected,
                    "state": view.state.as_deref(),
                    "error": view.error.as_ref().map(|e| e.to_string()),
                });
                println!("{}", value);
            }
            OutputFormat::Quiet => {
                if let Some(state) = &view.state {
                    println!("{}-{}", state.team_a_score, state.team_b_score);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a hint on stderr (suppressed in quiet mode)
    pub fn hint(&self, hint: &str) {
        if !self.is_quiet() {
            eprintln!("Hint: {}", hint);
        }
    }
}

fn score_line(state: &MatchState) -> String {
    format!("A {} - {} B", state.team_a_score, state.team_b_score)
}

fn roster(state: &MatchState, team: Team) -> String {
    let names: Vec<String> = state
        .team(team)
        .map(|p| {
            let position = match p.position {
                Position::Attack => "attack",
                Position::Defense => "defense",
            };
            format!("{} ({})", p.display_name, position)
        })
        .collect();
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

fn event_line(event: &MatchEvent) -> String {
    let clock = match event.elapsed_seconds {
        Some(secs) => format!("{:02}:{:02}", secs / 60, secs % 60),
        None => "--:--".to_string(),
    };
    let team = match event.team {
        Some(Team::A) => "A",
        Some(Team::B) => "B",
        None => "-",
    };

    let mut line = format!("[{}] {:<10} {}", clock, event.event_type.to_string(), team);
    if let Some(custom) = &event.custom_type {
        line.push_str(&format!("  {}", truncate(custom, 24)));
    }
    if let Some(by) = &event.by_player_nickname {
        line.push_str(&format!("  by {}", by));
    }
    if let Some(against) = &event.against_player_nickname {
        line.push_str(&format!("  against {}", against));
    }
    if event.undone {
        line.push_str("  (undone)");
    }
    line
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
