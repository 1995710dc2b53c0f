//! JSON Web Keys and the immutable key set snapshot.
//!
//! A `KeySet` is built once from a fetched JWKS document and never mutated;
//! the key cache replaces it wholesale on refresh.

use crate::error::KeyFetchError;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lower bound applied to a JWKS response's `Cache-Control: max-age`.
pub const MIN_MAX_AGE: Duration = Duration::from_secs(30);

/// Upper bound applied to a JWKS response's `Cache-Control: max-age`.
pub const MAX_MAX_AGE: Duration = Duration::from_secs(3600);

/// JSON Web Key from the JWKS endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: String,

    /// Algorithm the key is intended for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// Curve name for EC and OKP keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl Jwk {
    /// Whether this key may verify tokens signed with `alg`.
    ///
    /// The key type must belong to the algorithm's family, EC keys must be on
    /// the algorithm's curve, and a declared `alg` must match exactly.
    #[must_use]
    pub fn is_compatible_with(&self, alg: Algorithm) -> bool {
        if let Some(key_alg) = &self.alg {
            if key_alg != algorithm_name(alg) {
                return false;
            }
        }

        match alg {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => self.kty == "RSA",
            Algorithm::ES256 => self.kty == "EC" && self.crv.as_deref() == Some("P-256"),
            Algorithm::ES384 => self.kty == "EC" && self.crv.as_deref() == Some("P-384"),
            Algorithm::EdDSA => self.kty == "OKP" && self.crv.as_deref() == Some("Ed25519"),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => false,
        }
    }

    /// Build the verification key from this JWK's public material.
    ///
    /// Returns `None` if required components are missing or not decodable.
    #[must_use]
    pub fn decoding_key(&self) -> Option<DecodingKey> {
        let key = match self.kty.as_str() {
            "RSA" => DecodingKey::from_rsa_components(self.n.as_deref()?, self.e.as_deref()?),
            "EC" => DecodingKey::from_ec_components(self.x.as_deref()?, self.y.as_deref()?),
            "OKP" => DecodingKey::from_ed_components(self.x.as_deref()?),
            _ => return None,
        };

        key.map_err(|e| {
            tracing::warn!(target: "jwks_auth.jwk", kid = %self.kid, error = %e, "JWK key material is invalid");
        })
        .ok()
    }

    fn is_signing_key(&self) -> bool {
        self.key_use.as_deref().map_or(true, |u| u == "sig")
    }
}

/// Canonical JOSE name of an algorithm.
#[must_use]
pub fn algorithm_name(alg: Algorithm) -> &'static str {
    match alg {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::EdDSA => "EdDSA",
    }
}

/// Raw JWKS document. Keys stay untyped so one bad entry cannot poison the set.
#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<serde_json::Value>,
}

/// Immutable snapshot of a fetched JWKS.
#[derive(Debug)]
pub struct KeySet {
    /// Keys in document order.
    keys: Vec<Arc<Jwk>>,

    /// Map of key ID to JWK.
    by_kid: HashMap<String, Arc<Jwk>>,

    /// When the document was fetched.
    fetched_at: Instant,

    /// When this snapshot stops being fresh.
    expires_at: Instant,

    /// Whether an unknown `kid` caused this fetch.
    miss_triggered: bool,
}

impl KeySet {
    /// Build a key set from fetched keys.
    ///
    /// Keys without a `kid`, keys not meant for signatures and duplicates of
    /// an earlier `kid` are dropped.
    #[must_use]
    pub fn new(keys: Vec<Jwk>, fetched_at: Instant, freshness: Duration) -> Self {
        let mut ordered = Vec::with_capacity(keys.len());
        let mut by_kid = HashMap::with_capacity(keys.len());

        for key in keys {
            if key.kid.is_empty() {
                tracing::warn!(target: "jwks_auth.jwk", kty = %key.kty, "Skipping JWK without kid");
                continue;
            }
            if !key.is_signing_key() {
                tracing::debug!(target: "jwks_auth.jwk", kid = %key.kid, "Skipping non-signing JWK");
                continue;
            }
            if by_kid.contains_key(&key.kid) {
                tracing::warn!(target: "jwks_auth.jwk", kid = %key.kid, "Skipping duplicate JWK kid");
                continue;
            }

            let key = Arc::new(key);
            by_kid.insert(key.kid.clone(), Arc::clone(&key));
            ordered.push(key);
        }

        Self {
            keys: ordered,
            by_kid,
            fetched_at,
            expires_at: fetched_at + freshness,
            miss_triggered: false,
        }
    }

    /// Mark this snapshot as fetched because of an unknown `kid`.
    #[must_use]
    pub fn into_miss_triggered(mut self) -> Self {
        self.miss_triggered = true;
        self
    }

    /// Parse a JWKS document body.
    ///
    /// # Errors
    ///
    /// Returns `KeyFetchError::MalformedDocument` if the body is not JSON or
    /// has no `keys` array. Individual keys that fail to parse are skipped.
    pub fn from_document(
        body: &[u8],
        fetched_at: Instant,
        freshness: Duration,
    ) -> Result<Self, KeyFetchError> {
        let document: JwksDocument = serde_json::from_slice(body)
            .map_err(|e| KeyFetchError::MalformedDocument(e.to_string()))?;

        let keys = document
            .keys
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<Jwk>(value) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(target: "jwks_auth.jwk", error = %e, "Skipping unparseable JWK");
                    None
                }
            })
            .collect();

        Ok(Self::new(keys, fetched_at, freshness))
    }

    /// Look up a key by ID.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&Arc<Jwk>> {
        self.by_kid.get(kid)
    }

    /// Keys in document order.
    #[must_use]
    pub fn keys(&self) -> &[Arc<Jwk>] {
        &self.keys
    }

    /// Key IDs in document order.
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|key| key.kid.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Whether the snapshot is still within its freshness window.
    #[must_use]
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// Whether an unknown `kid` caused this fetch.
    #[must_use]
    pub fn is_miss_triggered(&self) -> bool {
        self.miss_triggered
    }

    /// Whether the snapshot is old enough that a miss may trigger a refetch.
    #[must_use]
    pub fn cooldown_elapsed(&self, now: Instant, cooldown: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) >= cooldown
    }

    /// Whether a miss on this snapshot may refetch.
    ///
    /// The cooldown only separates consecutive miss-triggered fetches; the
    /// first unknown `kid` after a regular fetch always refetches.
    #[must_use]
    pub fn allows_miss_refresh(&self, now: Instant, cooldown: Duration) -> bool {
        !self.miss_triggered || self.cooldown_elapsed(now, cooldown)
    }
}

/// Extract `max-age` from a `Cache-Control` header value, clamped to
/// `[MIN_MAX_AGE, MAX_MAX_AGE]`.
///
/// `no-cache`/`no-store` are treated as the minimum so that a misbehaving
/// provider cannot force a fetch per request.
#[must_use]
pub fn parse_max_age(cache_control: &str) -> Option<Duration> {
    let mut max_age = None;

    for directive in cache_control.split(',').map(str::trim) {
        let lower = directive.to_ascii_lowercase();
        if lower == "no-cache" || lower == "no-store" {
            return Some(MIN_MAX_AGE);
        }
        if let Some(value) = lower.strip_prefix("max-age=") {
            if let Ok(seconds) = value.trim_matches('"').parse::<u64>() {
                max_age = Some(Duration::from_secs(seconds));
            }
        }
    }

    max_age.map(|age| age.clamp(MIN_MAX_AGE, MAX_MAX_AGE))
}
