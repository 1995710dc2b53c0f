//! Token claims and their validation against a `ValidationPolicy`.
//!
//! Validation is pure: it takes the current time as an argument and performs
//! no I/O, so boundary conditions are tested without wall-clock dependence.
//!
//! Check order (first failure wins):
//! 1. Required claims present
//! 2. `exp` still in the future (with tolerance)
//! 3. `nbf` and `iat` not in the future (with tolerance)
//! 4. `iss` equals the expected issuer
//! 5. `aud` matches one of the expected audiences (when configured)

use crate::error::AuthError;
use crate::policy::ValidationPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The `aud` claim: a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// Whether `value` is (one of) the audience(s).
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == value,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == value),
        }
    }
}

/// Token payload.
///
/// Registered claims are typed; everything else is kept verbatim in `extra`
/// so that serializing a `Claims` reproduces the token payload.
///
/// # Security
///
/// The `sub` field is redacted in Debug output to prevent accidental logging
/// of user identifiers.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Subject - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Expiration timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Custom claims.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("iss", &self.iss)
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iat", &self.iat)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Claims {
    /// Whether the named claim is present, registered or custom.
    #[must_use]
    pub fn has_claim(&self, name: &str) -> bool {
        match name {
            "iss" => self.iss.is_some(),
            "sub" => self.sub.is_some(),
            "aud" => self.aud.is_some(),
            "exp" => self.exp.is_some(),
            "nbf" => self.nbf.is_some(),
            "iat" => self.iat.is_some(),
            other => self.extra.contains_key(other),
        }
    }

    /// Look up a custom claim.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }
}

/// Validate claims against the policy at time `now` (Unix epoch seconds).
///
/// # Errors
///
/// Returns the first failing check as an `AuthError`.
pub fn validate_claims(
    claims: &Claims,
    policy: &ValidationPolicy,
    now: i64,
) -> Result<(), AuthError> {
    if let Some(missing) = policy
        .required_claims()
        .iter()
        .find(|name| !claims.has_claim(name))
    {
        tracing::debug!(target: "jwks_auth.claims", claim = %missing, "Token rejected: required claim missing");
        return Err(AuthError::MissingRequiredClaim {
            claim: missing.clone(),
        });
    }

    let tolerance = policy.clock_tolerance_secs();

    if let Some(exp) = claims.exp {
        if exp <= now.saturating_sub(tolerance) {
            tracing::debug!(
                target: "jwks_auth.claims",
                exp = exp,
                now = now,
                tolerance_secs = tolerance,
                "Token rejected: expired"
            );
            return Err(AuthError::TokenExpired { exp });
        }
    }

    let latest_allowed = now.saturating_add(tolerance);

    if let Some(nbf) = claims.nbf {
        if nbf > latest_allowed {
            tracing::debug!(
                target: "jwks_auth.claims",
                nbf = nbf,
                now = now,
                tolerance_secs = tolerance,
                "Token rejected: not yet valid"
            );
            return Err(AuthError::TokenNotYetValid);
        }
    }

    if let Some(iat) = claims.iat {
        if iat > latest_allowed {
            tracing::debug!(
                target: "jwks_auth.claims",
                iat = iat,
                now = now,
                max_allowed = latest_allowed,
                "Token rejected: iat too far in the future"
            );
            return Err(AuthError::TokenNotYetValid);
        }
    }

    if claims.iss.as_deref() != Some(policy.issuer()) {
        tracing::debug!(
            target: "jwks_auth.claims",
            iss = ?claims.iss,
            expected = %policy.issuer(),
            "Token rejected: issuer mismatch"
        );
        return Err(AuthError::IssuerMismatch);
    }

    let audiences = policy.audiences();
    if !audiences.is_empty() {
        let matched = claims
            .aud
            .as_ref()
            .is_some_and(|aud| audiences.iter().any(|expected| aud.contains(expected)));
        if !matched {
            tracing::debug!(
                target: "jwks_auth.claims",
                aud = ?claims.aud,
                "Token rejected: audience mismatch"
            );
            return Err(AuthError::AudienceMismatch);
        }
    }

    Ok(())
}
