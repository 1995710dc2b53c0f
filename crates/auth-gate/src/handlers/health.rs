//! Liveness handler.

use tracing::instrument;

/// Handler for GET /health
///
/// Public and independent of the identity provider: never touches the key
/// cache.
#[instrument(skip_all, name = "auth_gate.health.check")]
pub async fn health_check() -> &'static str {
    "OK"
}
