//! Prometheus Metrics Module
//!
//! Exposes sync-core metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Messages**: Frames received, decode failures, batches flushed
//! - **Connections**: Connection status, transport errors, reconnect attempts
//! - **Reconcilers**: REST fetch failures and resyncs per feed
//! - **Jobs**: Poll attempts and job outcomes
//!
//! # Integration
//!
//! When a metrics port is configured the exporter serves `/metrics` on it;
//! otherwise the recorder is installed and metrics are only reachable
//! through [`get_metrics_handle`].

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::{Channel, ConnectionStatus};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics installation error.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be built.
    #[error("failed to build Prometheus exporter: {0}")]
    Build(#[from] BuildError),
    /// Another global recorder is already installed.
    #[error("a global metrics recorder is already installed")]
    RecorderInstalled,
}

/// Install the Prometheus recorder, serving `/metrics` on `listen` if given.
///
/// Calling this again returns the existing handle. Must be called from
/// within a tokio runtime when `listen` is set.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or another recorder
/// is already installed.
pub fn init_metrics(listen: Option<SocketAddr>) -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let builder = PrometheusBuilder::new();
    let handle = match listen {
        Some(addr) => {
            let (recorder, exporter) = builder.with_http_listener(addr).build()?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder).map_err(|_| MetricsError::RecorderInstalled)?;
            tokio::spawn(exporter);
            handle
        }
        None => builder.install_recorder()?,
    };

    register_metrics();
    let _ = PROMETHEUS_HANDLE.set(handle.clone());
    Ok(handle)
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "dashboard_sync_messages_received_total",
        "Total decoded messages received per channel and type"
    );
    describe_counter!(
        "dashboard_sync_decode_errors_total",
        "Total frames dropped because they failed to decode"
    );
    describe_counter!(
        "dashboard_sync_batches_flushed_total",
        "Total message batches flushed"
    );
    describe_histogram!(
        "dashboard_sync_batch_size",
        "Messages per flushed batch"
    );

    describe_gauge!(
        "dashboard_sync_connection_status",
        "1 when the channel connection is open, 0 otherwise"
    );
    describe_counter!(
        "dashboard_sync_transport_errors_total",
        "Total transport-level errors"
    );
    describe_counter!(
        "dashboard_sync_reconnects_total",
        "Total reconnection attempts"
    );

    describe_counter!(
        "dashboard_sync_fetch_errors_total",
        "Total failed REST fetches per resource"
    );
    describe_counter!(
        "dashboard_sync_resyncs_total",
        "Total REST resyncs per feed"
    );

    describe_counter!(
        "dashboard_sync_poll_attempts_total",
        "Total job status fetches"
    );
    describe_counter!(
        "dashboard_sync_jobs_total",
        "Total polled jobs by outcome"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a decoded message.
pub fn record_message_received(channel: Channel, message_type: &str) {
    counter!(
        "dashboard_sync_messages_received_total",
        "channel" => channel.as_str(),
        "message_type" => message_type.to_string()
    )
    .increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_error(channel: Channel) {
    counter!(
        "dashboard_sync_decode_errors_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Record a flushed batch.
pub fn record_batch_flushed(channel: Channel, size: usize) {
    counter!(
        "dashboard_sync_batches_flushed_total",
        "channel" => channel.as_str()
    )
    .increment(1);
    #[allow(clippy::cast_precision_loss)]
    let size = size as f64;
    histogram!(
        "dashboard_sync_batch_size",
        "channel" => channel.as_str()
    )
    .record(size);
}

/// Update the connection status gauge.
pub fn set_connection_status(channel: Channel, status: ConnectionStatus) {
    gauge!(
        "dashboard_sync_connection_status",
        "channel" => channel.as_str()
    )
    .set(if status.is_connected() { 1.0 } else { 0.0 });
}

/// Record a transport-level error.
pub fn record_transport_error(channel: Channel) {
    counter!(
        "dashboard_sync_transport_errors_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect(channel: Channel) {
    counter!(
        "dashboard_sync_reconnects_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Record a failed REST fetch.
pub fn record_fetch_error(resource: &'static str) {
    counter!(
        "dashboard_sync_fetch_errors_total",
        "resource" => resource
    )
    .increment(1);
}

/// Record a REST resync.
pub fn record_resync(feed: &'static str) {
    counter!(
        "dashboard_sync_resyncs_total",
        "feed" => feed
    )
    .increment(1);
}

/// Record a job status fetch.
pub fn record_poll_attempt() {
    counter!("dashboard_sync_poll_attempts_total").increment(1);
}

/// Record how a polled job ended.
pub fn record_job_outcome(outcome: &'static str) {
    counter!(
        "dashboard_sync_jobs_total",
        "outcome" => outcome
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
