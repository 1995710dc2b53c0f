//! Prometheus recorder setup.

use jwks_auth::metrics::METRIC_PREFIX;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// JWKS fetch latency buckets (seconds). Fetches are bounded by the
/// configured fetch timeout, 10 s by default.
const JWKS_FETCH_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Install the global Prometheus recorder.
///
/// Returns the handle `/metrics` renders from. Fails if a recorder is
/// already installed in this process.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix(format!("{METRIC_PREFIX}jwks_fetch")),
            JWKS_FETCH_BUCKETS,
        )
        .map_err(|e| format!("Failed to set JWKS fetch buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}
