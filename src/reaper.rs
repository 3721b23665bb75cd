use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::store::Store;

/// Background task that periodically retires finished bookings.
/// Runs until `shutdown` is cancelled.
pub async fn run_reaper(store: Arc<Store>, every: Duration, shutdown: CancellationToken) {
    info!(every_secs = every.as_secs_f64(), "reaper started");
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                store.prune_all();
            }
            _ = shutdown.cancelled() => break,
        }
    }
    info!("reaper stopped");
}
