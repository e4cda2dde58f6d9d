use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings accepted.
pub const BOOKINGS_CREATED_TOTAL: &str = "slotbook_bookings_created_total";

/// Counter: create requests rejected because the slot was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "slotbook_booking_conflicts_total";

/// Counter: status changes applied. Labels: to.
pub const TRANSITIONS_TOTAL: &str = "slotbook_transitions_total";

/// Histogram: engine operation latency in seconds. Labels: op, outcome.
pub const OPERATION_DURATION_SECONDS: &str = "slotbook_operation_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: ledger lock waits that hit the store timeout.
pub const STORE_TIMEOUTS_TOTAL: &str = "slotbook_store_timeouts_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotbook_wal_flush_batch_size";

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .try_init();
}

/// Install Prometheus metrics exporter on the given port, normally
/// `Config::metrics_port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Record one engine operation's latency and outcome.
pub(crate) fn record_operation<T>(
    op: &'static str,
    started: std::time::Instant,
    result: &Result<T, crate::engine::BookingError>,
) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op, "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_without_port_is_noop() {
        assert!(init(None).is_ok());
    }

    #[test]
    fn init_tracing_twice() {
        init_tracing();
        init_tracing();
    }
}
