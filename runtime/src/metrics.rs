//! Prometheus metrics for the check-in workflow.
//!
//! Covers:
//! - Verdicts and evaluation latency
//! - Scan session frames and camera failures
//! - Audit sink failures
//! - Bulk import outcomes
//! - Dashboard change feed
//!
//! # Example
//!
//! ```rust,no_run
//! use checkin_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Why the Prometheus exporter could not start.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Bad bucket layout or listener address
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Another global recorder is already set
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Serves `/metrics` in the Prometheus text format.
///
/// Installs the global recorder and serves `/metrics` on `addr`.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Exporter bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and spawn the HTTP listener.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the exporter cannot be built and
    /// [`MetricsError::Install`] if another recorder is already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        metrics::set_global_recorder(recorder).map_err(|e| MetricsError::Install(e.to_string()))?;

        // The exporter's error type carries no Display or Debug
        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });

        tracing::info!(addr = %self.addr, "Metrics available at http://{}/metrics", self.addr);
        self.handle = Some(handle);
        Ok(())
    }

    /// Recorder handle, set by a successful `start`.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }
}

/// Describe every check-in metric to the installed recorder.
pub fn register_metrics() {
    // Store
    describe_counter!("checkin_store_actions_total", "Total number of actions reduced by stores");
    describe_counter!(
        "checkin_store_effects_total",
        "Total number of effects started, labelled by kind"
    );

    // Verifier
    describe_counter!(
        "checkin_verdicts_total",
        "Total number of verdicts produced, labelled by verdict"
    );
    describe_histogram!(
        "checkin_evaluate_duration_seconds",
        "Time taken to evaluate one scanned code"
    );
    describe_counter!(
        "checkin_audit_failures_total",
        "Total number of audit records that could not be written"
    );

    // Scan session
    describe_counter!(
        "checkin_frames_decoded_total",
        "Total number of decoded frames delivered to the session"
    );
    describe_counter!(
        "checkin_frames_ignored_total",
        "Total number of decoded frames dropped while a verdict was pending"
    );
    describe_counter!(
        "checkin_camera_failures_total",
        "Total number of decoder start failures"
    );
    describe_gauge!(
        "checkin_session_scanning",
        "Whether the scan session is active (0 or 1)"
    );

    // Import
    describe_counter!(
        "checkin_import_rows_total",
        "Total number of bulk import rows, labelled by status"
    );

    // Dashboard
    describe_counter!(
        "checkin_dashboard_changes_total",
        "Total number of ticket changes applied to the dashboard"
    );
    describe_gauge!(
        "checkin_dashboard_checked_in",
        "Checked-in tickets in the current dashboard snapshot"
    );
}

/// Verifier metrics recorder.
pub struct VerifierMetrics;

impl VerifierMetrics {
    /// Record one evaluation.
    pub fn record_verdict(verdict: &'static str, duration: Duration) {
        counter!("checkin_verdicts_total", "verdict" => verdict).increment(1);
        histogram!("checkin_evaluate_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an audit sink failure.
    pub fn record_audit_failure() {
        counter!("checkin_audit_failures_total").increment(1);
    }
}

/// Scan session metrics recorder.
pub struct SessionMetrics;

impl SessionMetrics {
    /// Record a frame accepted for evaluation.
    pub fn record_frame() {
        counter!("checkin_frames_decoded_total").increment(1);
    }

    /// Record a frame dropped while processing.
    pub fn record_ignored_frame() {
        counter!("checkin_frames_ignored_total").increment(1);
    }

    /// Record a decoder start failure.
    pub fn record_camera_failure() {
        counter!("checkin_camera_failures_total").increment(1);
    }

    /// Record whether the session is scanning.
    pub fn record_scanning(scanning: bool) {
        gauge!("checkin_session_scanning").set(if scanning { 1.0 } else { 0.0 });
    }
}

/// Import metrics recorder.
pub struct ImportMetrics;

impl ImportMetrics {
    /// Record rows by status (`inserted`, `rejected`, `failed`).
    #[allow(clippy::cast_possible_truncation)] // row counts fit in u64
    pub fn record_rows(status: &'static str, count: usize) {
        counter!("checkin_import_rows_total", "status" => status).increment(count as u64);
    }
}

/// Dashboard metrics recorder.
pub struct DashboardMetrics;

impl DashboardMetrics {
    /// Record an applied change and the resulting checked-in count.
    #[allow(clippy::cast_precision_loss)] // attendee counts are far below 2^52
    pub fn record_change(checked_in: usize) {
        counter!("checkin_dashboard_changes_total").increment(1);
        gauge!("checkin_dashboard_checked_in").set(checked_in as f64);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
    }

    #[test]
    fn recorders_are_noops_without_exporter() {
        register_metrics();
        VerifierMetrics::record_verdict("valid", Duration::from_millis(3));
        VerifierMetrics::record_audit_failure();
        SessionMetrics::record_frame();
        SessionMetrics::record_ignored_frame();
        SessionMetrics::record_scanning(true);
        ImportMetrics::record_rows("inserted", 4);
        DashboardMetrics::record_change(2);
    }
}
