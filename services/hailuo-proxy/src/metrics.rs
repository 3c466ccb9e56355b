//! Prometheus metrics exposition
//!
//! The pool and session table emit through the `metrics` facade:
//!
//! - `token_renewals_total` (counter): label `outcome` (success | failure)
//! - `token_renewal_duration_seconds` (histogram)
//! - `token_pool_size` (gauge)
//! - `token_persist_failures_total` (counter)
//! - `session_bindings` (gauge)
//!
//! This module installs the recorder those calls land in.

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Bucket boundaries for renewal call latency. The upper bound sits at the
/// renewal timeout.
const RENEWAL_DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("token_renewal_duration_seconds".to_string()),
        RENEWAL_DURATION_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `token_renewal_duration_seconds` gets explicit buckets so it renders as a
/// Prometheus histogram (`_bucket` lines) instead of a summary.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}
