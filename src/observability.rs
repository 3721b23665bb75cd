use std::net::SocketAddr;

// ── Booking flow ────────────────────────────────────────────────

/// Counter: bookings accepted.
pub const BOOKINGS_MADE_TOTAL: &str = "slotbook_bookings_made_total";

/// Counter: booking requests refused. Labels: reason.
pub const BOOKINGS_REFUSED_TOTAL: &str = "slotbook_bookings_refused_total";

/// Counter: bookings cancelled by their owner.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "slotbook_bookings_cancelled_total";

// ── Housekeeping ────────────────────────────────────────────────

/// Counter: bookings retired plus diary entries cleared by pruning.
pub const ENTRIES_PRUNED_TOTAL: &str = "slotbook_entries_pruned_total";

/// Gauge: live bookings held by the store.
pub const BOOKINGS_LIVE: &str = "slotbook_bookings_live";

/// Gauge: users known to the store.
pub const USERS: &str = "slotbook_users";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
