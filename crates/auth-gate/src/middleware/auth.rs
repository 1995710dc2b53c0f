//! Authentication middleware for protected routes.
//!
//! Hands the raw `Authorization` header to the `Authenticator` and injects
//! the validated claims into request extensions.

use crate::errors::AuthRejection;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::IntoResponse,
};
use jwks_auth::{AuthError, Authenticator, TokenDefect, ValidatedClaims};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Token authenticator with its JWKS key cache.
    pub authenticator: Arc<Authenticator>,
}

impl AuthState {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }
}

/// Guard that admits only requests carrying a valid bearer token.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - 401 Unauthorized with a JSON body and `WWW-Authenticate` header on any failure
/// - Otherwise continues to the handler with `ValidatedClaims` in extensions
#[instrument(skip(state, req, next), name = "auth_gate.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, AuthRejection> {
    let validated = match req.headers().get(header::AUTHORIZATION) {
        None => state.authenticator.authenticate_now(None).await,
        Some(value) => match value.to_str() {
            Ok(value) => state.authenticator.authenticate_now(Some(value)).await,
            Err(_) => {
                tracing::debug!(
                    target: "auth_gate.middleware.auth",
                    "Authorization header is not visible ASCII"
                );
                Err(AuthError::MalformedToken(TokenDefect::NotBearerScheme))
            }
        },
    }?;

    req.extensions_mut().insert(validated);

    Ok(next.run(req).await)
}

/// Extension trait for extracting validated claims from a request.
pub trait ClaimsExt {
    /// Returns `None` if the auth middleware did not run for this request.
    fn validated_claims(&self) -> Option<&ValidatedClaims>;
}

impl<B> ClaimsExt for axum::extract::Request<B> {
    fn validated_claims(&self) -> Option<&ValidatedClaims> {
        self.extensions().get::<ValidatedClaims>()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use auth_test_utils::{MockJwksServer, TestKeypair, TestTokenBuilder, TEST_ISSUER};
    use axum::{
        body::Body,
        http::{HeaderValue, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use jwks_auth::{Algorithm, ValidationPolicy};
    use tower::ServiceExt;

    async fn claims_sub(req: Request) -> String {
        req.validated_claims()
            .and_then(|v| v.claims.sub.clone())
            .unwrap_or_default()
    }

    async fn app() -> (MockJwksServer, TestKeypair, Router) {
        let jwks = MockJwksServer::start().await;
        let keypair = TestKeypair::new(3, "mw-key");
        jwks.serve_keys(&[keypair.jwk_json()]).await;

        let policy = ValidationPolicy::new(&jwks.jwks_url(), TEST_ISSUER)
            .unwrap()
            .with_algorithms(vec![Algorithm::EdDSA])
            .unwrap();
        let state = Arc::new(AuthState::new(Arc::new(Authenticator::new(policy))));

        let router = Router::new()
            .route("/protected", get(claims_sub))
            .route_layer(middleware::from_fn_with_state(state, require_auth));
        (jwks, keypair, router)
    }

    #[test]
    fn test_auth_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AuthState>();
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler_with_claims() {
        let (_jwks, keypair, router) = app().await;
        let token = keypair.sign_token(&TestTokenBuilder::new().for_user("carol").build());

        let request = Request::builder()
            .uri("/protected")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(body.as_ref(), b"carol");
    }

    #[tokio::test]
    async fn test_missing_header_rejected() {
        let (jwks, _keypair, router) = app().await;

        let request = Request::builder()
            .uri("/protected")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(jwks.request_count().await, 0);
    }

    #[tokio::test]
    async fn test_non_ascii_header_is_malformed() {
        let (jwks, _keypair, router) = app().await;

        let mut request = Request::builder()
            .uri("/protected")
            .body(Body::empty())
            .unwrap();
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_bytes(b"Bearer \xfftoken").unwrap(),
        );
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(jwks.request_count().await, 0);
    }
}
