//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define relay metrics (sessions, bytes, chunks, errors, backpressure)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `relay_sessions_total` (counter): finished sessions by outcome
//! - `relay_session_errors_total` (counter): failed sessions by error kind
//! - `relay_bytes_total` (counter): payload bytes by direction
//! - `relay_chunks_total` (counter): data chunks by direction
//! - `relay_backpressure_pauses_total` (counter): upstream read pauses
//! - `relay_active_sessions` (gauge): sessions currently running
//! - `relay_session_duration_seconds` (histogram): time from accept to response
//!
//! # Design Decisions
//! - Label values are static strings; no per-connection cardinality
//! - Helpers wrap the macros so call sites stay one line

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::error::ErrorKind;
use crate::session::SessionSummary;

/// Install the Prometheus recorder and serve it on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    ::metrics::describe_counter!("relay_sessions_total", "Finished relay sessions by outcome");
    ::metrics::describe_counter!("relay_session_errors_total", "Failed relay sessions by error kind");
    ::metrics::describe_counter!("relay_bytes_total", "Payload bytes relayed by direction");
    ::metrics::describe_counter!("relay_chunks_total", "Chunks relayed by direction");
    ::metrics::describe_counter!("relay_backpressure_pauses_total", "Upstream read pauses");
    ::metrics::describe_gauge!("relay_active_sessions", "Sessions currently running");
    ::metrics::describe_histogram!("relay_session_duration_seconds", "Session duration in seconds");

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn session_started() {
    ::metrics::gauge!("relay_active_sessions").increment(1.0);
}

/// Record the end of a session. `outcome` is "completed", "rejected" or "failed".
pub fn session_finished(outcome: &'static str, started: Instant) {
    ::metrics::gauge!("relay_active_sessions").decrement(1.0);
    ::metrics::counter!("relay_sessions_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("relay_session_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn session_error(kind: ErrorKind) {
    ::metrics::counter!("relay_session_errors_total", "kind" => kind.as_str()).increment(1);
}

/// Fold a session's counters into the totals.
pub fn record_summary(summary: &SessionSummary) {
    ::metrics::counter!("relay_bytes_total", "direction" => "inbound").increment(summary.payload_in);
    ::metrics::counter!("relay_bytes_total", "direction" => "outbound").increment(summary.payload_out);
    ::metrics::counter!("relay_chunks_total", "direction" => "inbound").increment(summary.chunks_in);
    ::metrics::counter!("relay_chunks_total", "direction" => "outbound").increment(summary.chunks_out);
    if summary.backpressure_pauses > 0 {
        ::metrics::counter!("relay_backpressure_pauses_total").increment(summary.backpressure_pauses);
    }
}
