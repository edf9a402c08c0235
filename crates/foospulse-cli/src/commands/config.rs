//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use foospulse_live::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to encode configuration")?
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.api_url);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  api_url:                {}", config.api_url);
            println!("  reconnect_delay_ms:     {}", config.reconnect_delay_ms);
            println!("  heartbeat_timeout_secs: {}", config.heartbeat_timeout_secs);
            println!("  connect_timeout_secs:   {}", config.connect_timeout_secs);
            println!("  request_timeout_secs:   {}", config.request_timeout_secs);
            println!("  resync_on_reconnect:    {}", config.resync_on_reconnect);
            println!(
                "  log_file:               {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: &str, value: &str, config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    config.set_value(key, value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}
