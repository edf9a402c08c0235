//! FoosPulse CLI
//!
//! Follow a live foosball match from the terminal.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use foospulse_live::{Config, ShareToken};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "foospulse")]
#[command(about = "FoosPulse - follow live foosball matches")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and print the current state of a match once
    Snapshot {
        /// Share token from the match link
        token: String,
    },
    /// Follow a match live until Ctrl-C
    Watch {
        /// Share token from the match link
        token: String,
        /// Refetch the snapshot on every reconnect
        #[arg(long)]
        resync_on_reconnect: bool,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (api_url, reconnect_delay_ms, heartbeat_timeout_secs, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands need neither logging nor an HTTP client
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(&key, &value, config_path, &output)
            }
        };
    }

    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config);

    match cli.command {
        Commands::Snapshot { token } => {
            commands::snapshot::run(ShareToken::new(token), &config, &output).await
        }
        Commands::Watch {
            token,
            resync_on_reconnect,
        } => {
            config.resync_on_reconnect |= resync_on_reconnect;
            commands::watch::run(ShareToken::new(token), &config, &output).await
        }
        Commands::Config { .. } => Ok(()),
    }
}

/// Enable tracing when FOOSPULSE_LOG is set
///
/// Logs go to `log_file` when configured, otherwise to stderr so they never
/// mix with command output.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("FOOSPULSE_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "foospulse_live={},foospulse_cli={}",
        log_level, log_level
    ));

    match &config.log_file {
        Some(log_path) => {
            let log_file = match File::create(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
                    return;
                }
            };

            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();

            info!("Logging initialized to {:?}", log_path);
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["foospulse", "watch", "abc123", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Watch {
                resync_on_reconnect: false,
                ..
            }
        ));
    }

    #[test]
    fn test_config_set_parses() {
        let cli = Cli::try_parse_from([
            "foospulse",
            "--config",
            "/tmp/fp.toml",
            "config",
            "set",
            "api_url",
            "https://pulse.example.com",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/fp.toml")));
        match cli.command {
            Commands::Config {
                command: Some(ConfigCommands::Set { key, value }),
            } => {
                assert_eq!(key, "api_url");
                assert_eq!(value, "https://pulse.example.com");
            }
            _ => panic!("expected config set"),
        }
    }
}
