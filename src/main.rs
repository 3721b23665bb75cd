use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use slotbook::manifest::Manifest;
use slotbook::model::Booking;
use slotbook::Store;

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let metrics_port: Option<u16> = std::env::var("SLOTBOOK_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    slotbook::observability::init(metrics_port)?;

    let manifest_path = std::env::var("SLOTBOOK_MANIFEST").ok();
    let bookings_path = std::env::var("SLOTBOOK_BOOKINGS").ok();
    let prune_every: u64 = std::env::var("SLOTBOOK_PRUNE_EVERY_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(60);

    let store = Arc::new(Store::new());

    if let Some(path) = &manifest_path {
        let manifest: Manifest = read_json(Path::new(path))?;
        match store.replace_manifest(manifest) {
            Ok(stranded) => {
                for msg in stranded {
                    warn!("manifest: {msg}");
                }
            }
            Err(e) => {
                for msg in e.messages() {
                    tracing::error!("manifest: {msg}");
                }
                return Err(e.into());
            }
        }
        info!("manifest loaded from {path}");
    }

    if let Some(path) = &bookings_path {
        let bookings: BTreeMap<String, Booking> = read_json(Path::new(path))?;
        for msg in store.replace_bookings(bookings)? {
            warn!("bookings: {msg}");
        }
        info!("bookings loaded from {path}");
    }

    info!("slotbook running");
    info!("  manifest: {}", manifest_path.as_deref().unwrap_or("none"));
    info!("  prune every: {prune_every}s");
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let token = CancellationToken::new();
    let reaper = tokio::spawn(slotbook::reaper::run_reaper(
        store.clone(),
        Duration::from_secs(prune_every.max(1)),
        token.clone(),
    ));

    // Run until SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("shutdown signal received");
    token.cancel();
    reaper.await?;

    let status = store.status_admin();
    info!(
        bookings = status.bookings,
        old_bookings = status.old_bookings,
        users = status.users,
        "slotbook stopped"
    );
    Ok(())
}
