//! Metrics emitted by the authentication engine.
//!
//! Recorded through the `metrics` facade; the host installs the recorder.
//! Without one, recording is a no-op.
//!
//! # Cardinality
//!
//! All labels are bounded:
//! - `status`: `success` or a `KeyFetchError::kind()` value (6 values)
//! - `result` (key lookups): `hit`, `miss`, `stale`
//! - `result` (authentications): `success` or an `AuthError::kind()` value (12 values)

use metrics::{counter, histogram};
use std::time::Duration;

/// Prefix shared by every metric name; hosts use it to configure histogram buckets.
pub const METRIC_PREFIX: &str = "jwks_auth_";

/// Record a JWKS fetch.
///
/// Metric: `jwks_auth_jwks_fetch_total`, `jwks_auth_jwks_fetch_duration_seconds`
/// Labels: `status`
pub fn record_jwks_fetch(status: &'static str, duration: Duration) {
    histogram!("jwks_auth_jwks_fetch_duration_seconds").record(duration.as_secs_f64());
    counter!("jwks_auth_jwks_fetch_total", "status" => status).increment(1);
}

/// Record a key cache lookup outcome.
///
/// Metric: `jwks_auth_key_lookups_total`
/// Labels: `result` (`hit`, `miss`, `stale`)
pub fn record_key_lookup(result: &'static str) {
    counter!("jwks_auth_key_lookups_total", "result" => result).increment(1);
}

/// Record an authentication outcome.
///
/// Metric: `jwks_auth_authentications_total`
/// Labels: `result`
pub fn record_authentication(result: &'static str) {
    counter!("jwks_auth_authentications_total", "result" => result).increment(1);
}
