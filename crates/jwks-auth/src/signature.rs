//! Signature verification.
//!
//! The algorithm is taken from the token header but must be on the policy
//! allow-list and must match the key's type. Verification never falls back
//! to another algorithm.

use crate::error::AuthError;
use crate::jwk::{algorithm_name, Jwk};
use crate::policy::ValidationPolicy;
use jsonwebtoken::Algorithm;
use std::str::FromStr;

/// Resolve a header `alg` against the policy allow-list.
///
/// Called before key lookup so a disallowed algorithm never causes a JWKS
/// fetch.
///
/// # Errors
///
/// Returns `AuthError::UnsupportedAlgorithm` for unknown names (including
/// `none`) and for known algorithms outside the allow-list.
pub fn resolve_algorithm(alg: &str, policy: &ValidationPolicy) -> Result<Algorithm, AuthError> {
    match Algorithm::from_str(alg) {
        Ok(algorithm) if policy.algorithms().contains(&algorithm) => Ok(algorithm),
        _ => {
            tracing::debug!(
                target: "jwks_auth.signature",
                alg = %alg,
                "Token rejected: algorithm not allowed"
            );
            Err(AuthError::UnsupportedAlgorithm {
                alg: alg.to_string(),
            })
        }
    }
}

/// Verify `encoded_signature` over `signing_input` with `jwk`.
///
/// # Errors
///
/// Returns `AuthError::SignatureInvalid` if the key cannot be used with
/// `algorithm` or the signature does not verify.
pub fn verify_signature(
    signing_input: &[u8],
    encoded_signature: &str,
    jwk: &Jwk,
    algorithm: Algorithm,
) -> Result<(), AuthError> {
    if !jwk.is_compatible_with(algorithm) {
        tracing::debug!(
            target: "jwks_auth.signature",
            kid = %jwk.kid,
            kty = %jwk.kty,
            alg = algorithm_name(algorithm),
            "Token rejected: key type does not match algorithm"
        );
        return Err(AuthError::SignatureInvalid);
    }

    let Some(key) = jwk.decoding_key() else {
        return Err(AuthError::SignatureInvalid);
    };

    match jsonwebtoken::crypto::verify(encoded_signature, signing_input, &key, algorithm) {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::debug!(
                target: "jwks_auth.signature",
                kid = %jwk.kid,
                alg = algorithm_name(algorithm),
                "Token rejected: signature mismatch"
            );
            Err(AuthError::SignatureInvalid)
        }
        Err(e) => {
            tracing::debug!(
                target: "jwks_auth.signature",
                kid = %jwk.kid,
                error = %e,
                "Token rejected: signature verification error"
            );
            Err(AuthError::SignatureInvalid)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::token::parse_token;
    use auth_test_utils::{RsaTestKey, TestKeypair, TestTokenBuilder};

    fn policy(algorithms: Vec<Algorithm>) -> ValidationPolicy {
        ValidationPolicy::new("https://idp.example.com/jwks.json", "issuer")
            .unwrap()
            .with_algorithms(algorithms)
            .unwrap()
    }

    fn jwk(value: serde_json::Value) -> Jwk {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_resolve_algorithm_allow_list() {
        let policy = policy(vec![Algorithm::RS256, Algorithm::EdDSA]);

        assert_eq!(resolve_algorithm("RS256", &policy).unwrap(), Algorithm::RS256);
        assert_eq!(resolve_algorithm("EdDSA", &policy).unwrap(), Algorithm::EdDSA);

        for alg in ["none", "HS256", "ES256", "rs256", ""] {
            assert!(
                matches!(
                    resolve_algorithm(alg, &policy),
                    Err(AuthError::UnsupportedAlgorithm { .. })
                ),
                "alg {alg:?} must be rejected"
            );
        }
    }

    #[test]
    fn test_valid_ed25519_signature() {
        let keypair = TestKeypair::new(1, "ed-1");
        let token = keypair.sign_token(&TestTokenBuilder::new().build());
        let parsed = parse_token(&token).unwrap();

        let result = verify_signature(
            parsed.signing_input(),
            parsed.encoded_signature(),
            &jwk(keypair.jwk_json()),
            Algorithm::EdDSA,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_valid_rsa_signature() {
        let key = RsaTestKey::new("rsa-1");
        let token = key.sign_token(&TestTokenBuilder::new().build());
        let parsed = parse_token(&token).unwrap();

        let result = verify_signature(
            parsed.signing_input(),
            parsed.encoded_signature(),
            &jwk(key.jwk_json()),
            Algorithm::RS256,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let signer = TestKeypair::new(1, "ed-1");
        let other = TestKeypair::new(2, "ed-1");
        let token = signer.sign_token(&TestTokenBuilder::new().build());
        let parsed = parse_token(&token).unwrap();

        let result = verify_signature(
            parsed.signing_input(),
            parsed.encoded_signature(),
            &jwk(other.jwk_json()),
            Algorithm::EdDSA,
        );
        assert_eq!(result.unwrap_err(), AuthError::SignatureInvalid);
    }

    #[test]
    fn test_modified_signing_input_rejected() {
        let key = RsaTestKey::new("rsa-1");
        let token = key.sign_token(&TestTokenBuilder::new().build());
        let parsed = parse_token(&token).unwrap();

        let mut input = parsed.signing_input().to_vec();
        input.push(b'x');
        let result = verify_signature(
            &input,
            parsed.encoded_signature(),
            &jwk(key.jwk_json()),
            Algorithm::RS256,
        );
        assert_eq!(result.unwrap_err(), AuthError::SignatureInvalid);
    }

    #[test]
    fn test_key_type_must_match_algorithm() {
        // An RSA key cannot verify an EdDSA token, and vice versa
        let keypair = TestKeypair::new(1, "shared");
        let rsa = RsaTestKey::new("shared");
        let token = keypair.sign_token(&TestTokenBuilder::new().build());
        let parsed = parse_token(&token).unwrap();

        let result = verify_signature(
            parsed.signing_input(),
            parsed.encoded_signature(),
            &jwk(rsa.jwk_json()),
            Algorithm::EdDSA,
        );
        assert_eq!(result.unwrap_err(), AuthError::SignatureInvalid);
    }

    #[test]
    fn test_declared_jwk_alg_must_match() {
        let key = RsaTestKey::new("rsa-1");
        let token = key.sign_token(&TestTokenBuilder::new().build());
        let parsed = parse_token(&token).unwrap();

        // JWK says RS256; a token claiming PS256 must not be checked with it
        let result = verify_signature(
            parsed.signing_input(),
            parsed.encoded_signature(),
            &jwk(key.jwk_json()),
            Algorithm::PS256,
        );
        assert_eq!(result.unwrap_err(), AuthError::SignatureInvalid);
    }

    #[test]
    fn test_empty_signature_rejected() {
        let key = RsaTestKey::new("rsa-1");
        let token = key.sign_token(&TestTokenBuilder::new().build());
        let parsed = parse_token(&token).unwrap();

        let result = verify_signature(
            parsed.signing_input(),
            "",
            &jwk(key.jwk_json()),
            Algorithm::RS256,
        );
        assert_eq!(result.unwrap_err(), AuthError::SignatureInvalid);
    }
}
