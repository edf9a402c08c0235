//! Live watch command

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use foospulse_live::{
    Config, HttpEventTransport, HttpSnapshotFetcher, LiveMatch, ShareToken, SyncPhase,
};

use crate::output::Output;

/// Follow the match until it finishes, Ctrl-C, or an unrecoverable failure
pub async fn run(token: ShareToken, config: &Config, output: &Output) -> Result<()> {
    let fetcher = Arc::new(
        HttpSnapshotFetcher::from_config(config).context("Failed to create HTTP client")?,
    );
    let transport = Arc::new(
        HttpEventTransport::new(&config.api_url, config.connect_timeout())
            .context("Failed to create stream client")?,
    );

    let mut live = LiveMatch::spawn(token, fetcher, transport, config.sync_settings());
    info!(subscription = live.subscription(), api_url = %config.api_url, "Watching match");
    output.print_view(&live.view());

    loop {
        tokio::select! {
            view = live.changed() => {
                let Some(view) = view else {
                    break;
                };
                output.print_view(&view);

                if view.phase == SyncPhase::Failed {
                    live.close();
                    let Some(err) = view.error else {
                        break;
                    };
                    if let Some(hint) = err.recovery_suggestion() {
                        output.hint(hint);
                    }
                    return Err(err).context("Live match sync failed");
                }

                let finished = view.phase == SyncPhase::Synced
                    && view.state.as_ref().map_or(false, |s| s.status.is_finished());
                if finished {
                    live.close();
                    output.message("Match finished.");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                live.close();
                output.message("Stopped watching.");
                break;
            }
        }
    }

    Ok(())
}
