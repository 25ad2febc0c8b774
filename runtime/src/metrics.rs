//! Prometheus metrics for observability and monitoring.
//!
//! This module installs the global Prometheus recorder and describes the
//! store's own metrics:
//! - Actions reduced and rejected
//! - Effects spawned, by type
//! - Time spent in the reducer critical section
//!
//! Domain crates record their metrics through the re-exported macros.
//! The recorder only renders text; exposing it over HTTP is up to the host.
//!
//! # Example
//!
//! ```rust,no_run
//! use agent_relay_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//!
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

// Re-export metrics macros for use in other crates
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Process-wide Prometheus recorder.
///
/// Owns the render handle when this instance installed the recorder.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Create a recorder that has not been installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe the store metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// A recorder that is already installed (e.g., by another test) is not an
    /// error: metrics keep flowing to it and [`render`](Self::render) returns `None`.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                describe_store_metrics();
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    describe_store_metrics();
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Describe the store metrics on the installed recorder.
fn describe_store_metrics() {
    describe_counter!(
        "relay_store_actions_total",
        "Total number of actions reduced by the store"
    );
    describe_counter!(
        "relay_store_rejected_actions_total",
        "Total number of actions rejected because the store was closed"
    );
    describe_counter!(
        "relay_store_effects_total",
        "Total number of effects spawned, by type"
    );
    describe_counter!("relay_store_closed_total", "Total number of stores closed");
    describe_histogram!(
        "relay_store_reducer_duration_seconds",
        "Time spent inside the reducer critical section"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recorder_creation() {
        let recorder = MetricsRecorder::new();
        assert!(recorder.handle().is_none());
        assert!(recorder.render().is_none());
    }

    #[test]
    fn test_metrics_recorder_install_is_repeatable() {
        let mut first = MetricsRecorder::new();
        assert!(first.install().is_ok());

        // A second install must not fail even though the recorder exists
        let mut second = MetricsRecorder::default();
        assert!(second.install().is_ok());
        assert!(second.render().is_none());
    }
}
