use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::storage::Store;

/// Periodically deletes email verification tokens that can no longer be
/// consumed. Runs until `cancel` fires.
pub fn spawn_token_sweeper(
    store: Store,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(every_secs = every.as_secs(), "token sweeper started");
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("token sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match store.purge_stale_tokens(chrono::Utc::now()).await {
                        Ok(removed) => debug!(removed, "token sweep done"),
                        Err(e) => warn!(error = %e, "token sweep failed"),
                    }
                }
            }
        }
    })
}
