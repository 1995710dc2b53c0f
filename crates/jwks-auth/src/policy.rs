//! Validation policy for incoming tokens.
//!
//! A `ValidationPolicy` is built once at startup and shared immutably by the
//! key cache and the verifier.

use crate::error::PolicyError;
use jsonwebtoken::Algorithm;
use reqwest::{Client, Url};
use std::time::Duration;

/// Default JWKS freshness window (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default minimum spacing between consecutive refetches triggered by unknown `kid`s.
pub const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_secs(30);

/// Default JWKS request timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default clock tolerance for `exp`/`nbf`/`iat` checks.
pub const DEFAULT_CLOCK_TOLERANCE: Duration = Duration::ZERO;

/// Maximum allowed clock tolerance (10 minutes).
pub const MAX_CLOCK_TOLERANCE: Duration = Duration::from_secs(600);

/// Token validation policy.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    /// Exact value the `iss` claim must carry.
    pub(crate) issuer: String,
    /// JWKS endpoint of the identity provider.
    pub(crate) jwks_url: Url,
    /// Acceptable audiences; empty means `aud` is not checked.
    pub(crate) audiences: Vec<String>,
    pub(crate) clock_tolerance: Duration,
    /// Signing algorithms a token may declare.
    pub(crate) algorithms: Vec<Algorithm>,
    /// Claims that must be present in every token.
    pub(crate) required_claims: Vec<String>,
    pub(crate) cache_ttl: Duration,
    pub(crate) refresh_cooldown: Duration,
    pub(crate) fetch_timeout: Duration,
    /// Optional custom HTTP client for fetching the JWKS.
    /// If not provided, a client honouring `fetch_timeout` is created.
    pub(crate) http_client: Option<Client>,
}

impl ValidationPolicy {
    /// Create a policy for the given JWKS endpoint and expected issuer.
    ///
    /// Defaults: `RS256` only, no audience check, zero clock tolerance,
    /// 5 minute cache TTL, 30 second refresh cooldown, 10 second fetch timeout.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::InvalidJwksUrl` if the URL is not an absolute
    /// `http`/`https` URL, or `PolicyError::EmptyIssuer` for a blank issuer.
    pub fn new(jwks_url: &str, issuer: impl Into<String>) -> Result<Self, PolicyError> {
        let jwks_url =
            Url::parse(jwks_url).map_err(|e| PolicyError::InvalidJwksUrl(e.to_string()))?;
        if !matches!(jwks_url.scheme(), "http" | "https") {
            return Err(PolicyError::InvalidJwksUrl(format!(
                "unsupported scheme '{}'",
                jwks_url.scheme()
            )));
        }

        let issuer = issuer.into();
        if issuer.trim().is_empty() {
            return Err(PolicyError::EmptyIssuer);
        }

        Ok(Self {
            issuer,
            jwks_url,
            audiences: Vec::new(),
            clock_tolerance: DEFAULT_CLOCK_TOLERANCE,
            algorithms: vec![Algorithm::RS256],
            required_claims: Vec::new(),
            cache_ttl: DEFAULT_CACHE_TTL,
            refresh_cooldown: DEFAULT_REFRESH_COOLDOWN,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            http_client: None,
        })
    }

    /// Add an acceptable audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audiences.push(audience.into());
        self
    }

    /// Replace the acceptable audiences. The token's `aud` must match at least one.
    #[must_use]
    pub fn with_audiences(mut self, audiences: Vec<String>) -> Self {
        self.audiences = audiences;
        self
    }

    /// Set the leeway applied to `exp`, `nbf` and `iat`.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::ClockToleranceTooLarge` above `MAX_CLOCK_TOLERANCE`.
    pub fn with_clock_tolerance(mut self, tolerance: Duration) -> Result<Self, PolicyError> {
        if tolerance > MAX_CLOCK_TOLERANCE {
            return Err(PolicyError::ClockToleranceTooLarge {
                seconds: tolerance.as_secs(),
                max_seconds: MAX_CLOCK_TOLERANCE.as_secs(),
            });
        }
        self.clock_tolerance = tolerance;
        Ok(self)
    }

    /// Set the algorithm allow-list.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::NoAlgorithms` for an empty list and
    /// `PolicyError::SymmetricAlgorithm` for any `HS*` algorithm.
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Result<Self, PolicyError> {
        if algorithms.is_empty() {
            return Err(PolicyError::NoAlgorithms);
        }
        if let Some(alg) = algorithms.iter().find(|alg| is_symmetric(**alg)) {
            return Err(PolicyError::SymmetricAlgorithm(format!("{alg:?}")));
        }
        self.algorithms = algorithms;
        Ok(self)
    }

    /// Mark claims as required.
    #[must_use]
    pub fn with_required_claims(mut self, claims: Vec<String>) -> Self {
        self.required_claims = claims;
        self
    }

    /// Set the JWKS freshness window used when the response carries no `max-age`.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::ZeroCacheTtl` for a zero duration.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Result<Self, PolicyError> {
        if ttl.is_zero() {
            return Err(PolicyError::ZeroCacheTtl);
        }
        self.cache_ttl = ttl;
        Ok(self)
    }

    /// Set the minimum spacing between consecutive refetches triggered by
    /// unknown `kid`s. The first miss after a regular fetch always refetches.
    #[must_use]
    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    /// Set the JWKS request timeout.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::ZeroFetchTimeout` for a zero duration.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Result<Self, PolicyError> {
        if timeout.is_zero() {
            return Err(PolicyError::ZeroFetchTimeout);
        }
        self.fetch_timeout = timeout;
        Ok(self)
    }

    /// Set a custom HTTP client. Its own timeout settings take precedence.
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn jwks_url(&self) -> &Url {
        &self.jwks_url
    }

    #[must_use]
    pub fn audiences(&self) -> &[String] {
        &self.audiences
    }

    #[must_use]
    pub fn clock_tolerance(&self) -> Duration {
        self.clock_tolerance
    }

    #[must_use]
    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    #[must_use]
    pub fn required_claims(&self) -> &[String] {
        &self.required_claims
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    #[must_use]
    pub fn refresh_cooldown(&self) -> Duration {
        self.refresh_cooldown
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Clock tolerance in whole seconds, for comparisons against `NumericDate` claims.
    pub(crate) fn clock_tolerance_secs(&self) -> i64 {
        // Bounded by MAX_CLOCK_TOLERANCE (600 seconds), well within i64 range
        i64::try_from(self.clock_tolerance.as_secs()).unwrap_or(i64::MAX)
    }
}

fn is_symmetric(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}
