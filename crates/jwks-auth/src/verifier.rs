//! Token verification orchestrator.
//!
//! Drives a bearer token through
//! `Start -> HeaderPresent -> Parsed -> KeyResolved -> SignatureVerified -> ClaimsVerified`.
//! A failure at any stage is terminal for the request; nothing is retried
//! here beyond the key cache's single refresh-on-miss.
//!
//! # Security
//!
//! - The algorithm is checked against the allow-list BEFORE key lookup, so
//!   `alg: none` or `HS256` tokens never trigger a JWKS fetch
//! - Claims are only inspected after the signature verifies

use crate::claims::{validate_claims, Claims};
use crate::error::AuthError;
use crate::key_cache::KeyCache;
use crate::metrics;
use crate::policy::ValidationPolicy;
use crate::signature::{resolve_algorithm, verify_signature};
use crate::token::parse_authorization_header;
use jsonwebtoken::Algorithm;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// Verification progress, used to label rejections in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStage {
    Start,
    HeaderPresent,
    Parsed,
    KeyResolved,
    SignatureVerified,
    ClaimsVerified,
}

impl VerificationStage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStage::Start => "start",
            VerificationStage::HeaderPresent => "header_present",
            VerificationStage::Parsed => "parsed",
            VerificationStage::KeyResolved => "key_resolved",
            VerificationStage::SignatureVerified => "signature_verified",
            VerificationStage::ClaimsVerified => "claims_verified",
        }
    }
}

impl fmt::Display for VerificationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successfully authenticated token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedClaims {
    /// The token payload.
    pub claims: Claims,

    /// `kid` of the key that verified the signature.
    pub key_id: String,

    pub algorithm: Algorithm,
}

/// Authenticates bearer tokens against a JWKS-backed key cache.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Authenticator {
    policy: ValidationPolicy,
    keys: Arc<KeyCache>,
}

impl Authenticator {
    /// Create an authenticator with its own key cache.
    #[must_use]
    pub fn new(policy: ValidationPolicy) -> Self {
        let keys = Arc::new(KeyCache::new(&policy));
        Self { policy, keys }
    }

    /// Create an authenticator that shares an existing key cache.
    #[must_use]
    pub fn with_key_cache(policy: ValidationPolicy, keys: Arc<KeyCache>) -> Self {
        Self { policy, keys }
    }

    #[must_use]
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    #[must_use]
    pub fn key_cache(&self) -> &Arc<KeyCache> {
        &self.keys
    }

    /// Authenticate an `Authorization` header value at time `now` (Unix
    /// epoch seconds). `None` means the header was absent.
    ///
    /// # Errors
    ///
    /// Returns exactly one `AuthError` describing why the request is rejected.
    #[instrument(skip_all)]
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
        now: i64,
    ) -> Result<ValidatedClaims, AuthError> {
        let result = self.verify(authorization, now).await;

        match &result {
            Ok(validated) => {
                tracing::debug!(
                    target: "jwks_auth.verifier",
                    kid = %validated.key_id,
                    stage = %VerificationStage::ClaimsVerified,
                    "Token validated successfully"
                );
                metrics::record_authentication("success");
            }
            Err(e) => metrics::record_authentication(e.kind()),
        }

        result
    }

    /// Authenticate against the current wall-clock time.
    ///
    /// # Errors
    ///
    /// See [`Authenticator::authenticate`].
    pub async fn authenticate_now(
        &self,
        authorization: Option<&str>,
    ) -> Result<ValidatedClaims, AuthError> {
        self.authenticate(authorization, chrono::Utc::now().timestamp())
            .await
    }

    async fn verify(
        &self,
        authorization: Option<&str>,
        now: i64,
    ) -> Result<ValidatedClaims, AuthError> {
        let header = authorization
            .ok_or_else(|| reject(VerificationStage::Start, AuthError::MissingAuthorizationHeader))?;

        let parsed = parse_authorization_header(Some(header))
            .map_err(|e| reject(VerificationStage::HeaderPresent, e))?;

        let algorithm = resolve_algorithm(&parsed.header.alg, &self.policy)
            .map_err(|e| reject(VerificationStage::Parsed, e))?;

        let jwk = self
            .keys
            .get_key(&parsed.header.kid)
            .await
            .map_err(|e| reject(VerificationStage::Parsed, e.into()))?;

        verify_signature(
            parsed.signing_input(),
            parsed.encoded_signature(),
            &jwk,
            algorithm,
        )
        .map_err(|e| reject(VerificationStage::KeyResolved, e))?;

        validate_claims(&parsed.claims, &self.policy, now)
            .map_err(|e| reject(VerificationStage::SignatureVerified, e))?;

        Ok(ValidatedClaims {
            claims: parsed.claims,
            key_id: parsed.header.kid,
            algorithm,
        })
    }
}

fn reject(stage: VerificationStage, error: AuthError) -> AuthError {
    tracing::debug!(
        target: "jwks_auth.verifier",
        stage = %stage,
        reason = error.kind(),
        "Token rejected"
    );
    error
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::TokenDefect;
    use auth_test_utils::{forge_token, MockJwksServer, TestKeypair, TestTokenBuilder, TEST_ISSUER};
    use serde_json::json;

    async fn setup() -> (MockJwksServer, TestKeypair, Authenticator) {
        let jwks = MockJwksServer::start().await;
        let keypair = TestKeypair::new(1, "ed-1");
        jwks.serve_keys(&[keypair.jwk_json()]).await;

        let policy = ValidationPolicy::new(&jwks.jwks_url(), TEST_ISSUER)
            .unwrap()
            .with_algorithms(vec![Algorithm::EdDSA])
            .unwrap();
        (jwks, keypair, Authenticator::new(policy))
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(VerificationStage::Start.to_string(), "start");
        assert_eq!(
            VerificationStage::SignatureVerified.as_str(),
            "signature_verified"
        );
    }

    #[tokio::test]
    async fn test_success_reports_key_and_algorithm() {
        let (_jwks, keypair, authenticator) = setup().await;
        let token = keypair.sign_token(&TestTokenBuilder::new().build());

        let validated = authenticator
            .authenticate_now(Some(&format!("Bearer {token}")))
            .await
            .unwrap();
        assert_eq!(validated.key_id, "ed-1");
        assert_eq!(validated.algorithm, Algorithm::EdDSA);
    }

    #[tokio::test]
    async fn test_missing_header_does_not_fetch() {
        let (jwks, _keypair, authenticator) = setup().await;

        let err = authenticator.authenticate(None, 0).await.unwrap_err();
        assert_eq!(err, AuthError::MissingAuthorizationHeader);
        assert_eq!(jwks.request_count().await, 0);
    }

    #[tokio::test]
    async fn test_disallowed_algorithm_does_not_fetch() {
        let (jwks, _keypair, authenticator) = setup().await;
        let token = forge_token(
            &json!({"alg": "none", "kid": "ed-1"}),
            &TestTokenBuilder::new().build(),
            b"",
        );

        let err = authenticator
            .authenticate_now(Some(&format!("Bearer {token}")))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedAlgorithm { alg } if alg == "none"));
        assert_eq!(jwks.request_count().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_token_does_not_fetch() {
        let (jwks, _keypair, authenticator) = setup().await;

        let err = authenticator
            .authenticate_now(Some("Bearer a.b.c"))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::MalformedToken(TokenDefect::InvalidHeader));
        assert_eq!(jwks.request_count().await, 0);
    }

    #[tokio::test]
    async fn test_claims_checked_at_given_time() {
        let (_jwks, keypair, authenticator) = setup().await;
        let claims = TestTokenBuilder::new()
            .expires_at(1_000)
            .issued_at(500)
            .build();
        let header = format!("Bearer {}", keypair.sign_token(&claims));

        assert!(authenticator.authenticate(Some(&header), 999).await.is_ok());
        assert_eq!(
            authenticator
                .authenticate(Some(&header), 1_000)
                .await
                .unwrap_err(),
            AuthError::TokenExpired { exp: 1_000 }
        );
    }
}
