//! Auth gate error responses.
//!
//! Every authentication failure maps to 401 Unauthorized. The client sees the
//! engine's stable `code` and its client-safe message; upstream fetch details
//! are logged server-side only.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use jwks_auth::AuthError;
use serde::Serialize;

/// `WWW-Authenticate` challenge for requests that carried no usable token.
const BEARER_CHALLENGE: &str = "Bearer realm=\"auth-gate\"";

/// `WWW-Authenticate` challenge for requests whose token was rejected.
const INVALID_TOKEN_CHALLENGE: &str = "Bearer realm=\"auth-gate\", error=\"invalid_token\"";

/// An authentication failure ready to be sent to the client.
#[derive(Debug)]
pub struct AuthRejection(pub AuthError);

impl From<AuthError> for AuthRejection {
    fn from(error: AuthError) -> Self {
        Self(error)
    }
}

/// Body of every 401 response.
///
/// `code` is omitted when the failure has none (missing header).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnauthorizedBody {
    pub error: &'static str,
    pub message: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl From<&AuthError> for UnauthorizedBody {
    fn from(error: &AuthError) -> Self {
        Self {
            error: "Unauthorized",
            message: error.to_string(),
            status_code: StatusCode::UNAUTHORIZED.as_u16(),
            code: error.code(),
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let AuthRejection(error) = self;

        if let AuthError::KeyProviderUnavailable(cause) = &error {
            tracing::warn!(
                target: "auth_gate.errors",
                error = %cause,
                "Rejecting request: signing keys unavailable"
            );
        }

        let challenge = if error.is_token_defect() {
            INVALID_TOKEN_CHALLENGE
        } else {
            BEARER_CHALLENGE
        };

        let mut response =
            (StatusCode::UNAUTHORIZED, Json(UnauthorizedBody::from(&error))).into_response();

        if let Ok(header_value) = challenge.parse() {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, header_value);
        }

        response
    }
}
