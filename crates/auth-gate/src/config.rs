//! Auth gate configuration.
//!
//! Configuration is loaded from environment variables and turned into the
//! engine's `ValidationPolicy` at startup.

use jwks_auth::policy::{
    DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT, DEFAULT_REFRESH_COOLDOWN, MAX_CLOCK_TOLERANCE,
};
use jwks_auth::{Algorithm, PolicyError, ValidationPolicy};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Auth gate configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity provider JWKS endpoint.
    pub jwks_url: String,

    /// Expected `iss` claim value.
    pub issuer: String,

    /// Acceptable `aud` values; empty disables the audience check.
    pub audiences: Vec<String>,

    /// Leeway for `exp`/`nbf`/`iat` in seconds (default: 0).
    pub clock_tolerance_seconds: u64,

    /// Allowed signing algorithms (default: RS256).
    pub algorithms: Vec<Algorithm>,

    /// Claims every token must carry.
    pub required_claims: Vec<String>,

    /// JWKS freshness window when the provider sends no `max-age` (default: 300).
    pub jwks_cache_ttl_seconds: u64,

    /// Minimum spacing between miss-triggered JWKS refetches (default: 30).
    pub jwks_refresh_cooldown_seconds: u64,

    /// JWKS request timeout (default: 10).
    pub jwks_fetch_timeout_seconds: u64,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Graceful shutdown drain period in seconds (default: 0).
    pub drain_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid clock tolerance configuration: {0}")]
    InvalidClockTolerance(String),

    #[error("Invalid algorithm configuration: {0}")]
    InvalidAlgorithms(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid validation policy: {0}")]
    Policy(#[from] PolicyError),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let jwks_url = required(vars, "JWKS_URL")?;
        let issuer = required(vars, "JWT_ISSUER")?;

        let audiences = vars
            .get("JWT_AUDIENCE")
            .map(|value| comma_list(value))
            .unwrap_or_default();

        let clock_tolerance_seconds = match vars.get("JWT_CLOCK_TOLERANCE_SECONDS") {
            Some(value_str) => {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidClockTolerance(format!(
                        "JWT_CLOCK_TOLERANCE_SECONDS must be a non-negative integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value > MAX_CLOCK_TOLERANCE.as_secs() {
                    return Err(ConfigError::InvalidClockTolerance(format!(
                        "JWT_CLOCK_TOLERANCE_SECONDS must not exceed {} seconds, got {}",
                        MAX_CLOCK_TOLERANCE.as_secs(),
                        value
                    )));
                }

                value
            }
            None => 0,
        };

        let algorithms = match vars.get("JWT_ALGORITHMS") {
            Some(value) => parse_algorithms(value)?,
            None => vec![Algorithm::RS256],
        };

        let required_claims = vars
            .get("JWT_REQUIRED_CLAIMS")
            .map(|value| comma_list(value))
            .unwrap_or_default();

        let jwks_cache_ttl_seconds =
            parse_seconds(vars, "JWKS_CACHE_TTL_SECONDS", DEFAULT_CACHE_TTL, false)?;
        let jwks_refresh_cooldown_seconds = parse_seconds(
            vars,
            "JWKS_REFRESH_COOLDOWN_SECONDS",
            DEFAULT_REFRESH_COOLDOWN,
            true,
        )?;
        let jwks_fetch_timeout_seconds =
            parse_seconds(vars, "JWKS_FETCH_TIMEOUT_SECONDS", DEFAULT_FETCH_TIMEOUT, false)?;
        let drain_seconds = parse_seconds(vars, "AUTH_GATE_DRAIN_SECONDS", Duration::ZERO, true)?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        bind_address.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidBindAddress(format!("'{}': {}", bind_address, e))
        })?;

        let config = Config {
            jwks_url,
            issuer,
            audiences,
            clock_tolerance_seconds,
            algorithms,
            required_claims,
            jwks_cache_ttl_seconds,
            jwks_refresh_cooldown_seconds,
            jwks_fetch_timeout_seconds,
            bind_address,
            drain_seconds,
        };

        // Surface URL, issuer and algorithm problems at load time
        config.validation_policy()?;

        Ok(config)
    }

    /// Build the engine policy from this configuration.
    pub fn validation_policy(&self) -> Result<ValidationPolicy, ConfigError> {
        let policy = ValidationPolicy::new(&self.jwks_url, self.issuer.clone())?
            .with_audiences(self.audiences.clone())
            .with_clock_tolerance(Duration::from_secs(self.clock_tolerance_seconds))?
            .with_algorithms(self.algorithms.clone())?
            .with_required_claims(self.required_claims.clone())
            .with_cache_ttl(Duration::from_secs(self.jwks_cache_ttl_seconds))?
            .with_refresh_cooldown(Duration::from_secs(self.jwks_refresh_cooldown_seconds))
            .with_fetch_timeout(Duration::from_secs(self.jwks_fetch_timeout_seconds))?;
        Ok(policy)
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_algorithms(value: &str) -> Result<Vec<Algorithm>, ConfigError> {
    comma_list(value)
        .iter()
        .map(|name| {
            Algorithm::from_str(name).map_err(|_| {
                ConfigError::InvalidAlgorithms(format!(
                    "JWT_ALGORITHMS contains unknown algorithm '{}'",
                    name
                ))
            })
        })
        .collect()
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: Duration,
    allow_zero: bool,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default.as_secs());
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{} must be a non-negative integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value == 0 && !allow_zero {
        return Err(ConfigError::InvalidDuration(format!(
            "{} must be greater than 0",
            name
        )));
    }

    Ok(value)
}
