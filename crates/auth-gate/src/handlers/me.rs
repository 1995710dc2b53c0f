//! Current caller handler.
//!
//! Echoes the claims the auth middleware validated for this request.

use axum::{Extension, Json};
use jwks_auth::ValidatedClaims;
use tracing::instrument;

/// Handler for GET /api/v1/me
///
/// Requires the auth middleware.
///
/// ## Response
///
/// ```json
/// {
///   "claims": { "iss": "https://idp.example.com/", "sub": "user-123", "exp": 1234567890 },
///   "key_id": "key-2024-01",
///   "algorithm": "RS256"
/// }
/// ```
#[instrument(skip_all, name = "auth_gate.handlers.me")]
pub async fn get_me(Extension(validated): Extension<ValidatedClaims>) -> Json<ValidatedClaims> {
    tracing::debug!(
        target: "auth_gate.handlers.me",
        kid = %validated.key_id,
        "Returning validated claims"
    );

    Json(validated)
}
