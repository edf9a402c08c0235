//! One-shot snapshot command

use anyhow::{Context, Result};
use tracing::debug;

use foospulse_live::{Config, HttpSnapshotFetcher, ShareToken, SnapshotFetcher, SyncError};

use crate::output::Output;

/// Fetch the match once and print it
pub async fn run(token: ShareToken, config: &Config, output: &Output) -> Result<()> {
    let fetcher =
        HttpSnapshotFetcher::from_config(config).context("Failed to create HTTP client")?;

    debug!(api_url = %config.api_url, "Fetching snapshot");
    match fetcher.fetch(&token).await {
        Ok(state) => {
            output.print_state(&state);
            Ok(())
        }
        Err(e) => {
            let err = SyncError::from(e);
            if let Some(hint) = err.recovery_suggestion() {
                output.hint(hint);
            }
            Err(err).context("Failed to fetch match")
        }
    }
}
