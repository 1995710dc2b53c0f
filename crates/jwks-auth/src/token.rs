//! Bearer token parsing.
//!
//! Turns a raw `Authorization` header value into a `ParsedToken`. Parsing is
//! purely syntactic: no key lookup, signature check or claim validation
//! happens here.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE any decoding (DoS prevention)
//! - Every structural failure names its defect but never echoes token content

use crate::claims::Claims;
use crate::error::{AuthError, TokenDefect};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical JWTs are well under 2KB; anything larger is rejected before base64
/// decoding or JSON parsing allocates buffers for it.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Authorization scheme accepted for bearer tokens (case-insensitive).
pub const BEARER_SCHEME: &str = "Bearer";

/// JOSE header fields needed for verification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Declared signing algorithm, as written by the issuer.
    pub alg: String,

    /// Key ID used to select the verification key.
    pub kid: String,

    #[serde(default)]
    pub typ: Option<String>,
}

/// Header shape used while parsing, before the `kid` requirement is applied.
#[derive(Deserialize)]
struct RawHeader {
    alg: String,
    #[serde(default)]
    kid: Option<serde_json::Value>,
    #[serde(default)]
    typ: Option<String>,
}

/// A syntactically valid compact JWS.
///
/// Produced fresh per request; never cached.
#[derive(Debug, Clone)]
pub struct ParsedToken {
    pub header: TokenHeader,

    pub claims: Claims,

    /// Exact `header.payload` bytes the signature covers.
    signing_input: String,

    /// Signature segment as transmitted (base64url).
    encoded_signature: String,

    /// Decoded signature bytes.
    signature: Vec<u8>,
}

impl ParsedToken {
    #[must_use]
    pub fn signing_input(&self) -> &[u8] {
        self.signing_input.as_bytes()
    }

    #[must_use]
    pub fn encoded_signature(&self) -> &str {
        &self.encoded_signature
    }

    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

/// Parse an `Authorization` header value.
///
/// `None` means the header was absent.
///
/// # Errors
///
/// Returns `AuthError::MissingAuthorizationHeader` if the header is absent and
/// `AuthError::MalformedToken` naming the defect for any structural problem.
pub fn parse_authorization_header(header: Option<&str>) -> Result<ParsedToken, AuthError> {
    let header = header.ok_or(AuthError::MissingAuthorizationHeader)?;
    let token = extract_bearer_token(header)?;
    Ok(parse_token(token)?)
}

/// Strip the `Bearer` scheme from a header value.
///
/// # Errors
///
/// Returns `TokenDefect::NotBearerScheme` for any other scheme and
/// `TokenDefect::WrongSegmentCount` for an empty credential.
pub fn extract_bearer_token(header: &str) -> Result<&str, TokenDefect> {
    let header = header.trim_start();
    let (scheme, credential) = header
        .split_once(' ')
        .unwrap_or((header.trim_end(), ""));

    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        tracing::debug!(target: "jwks_auth.token", "Authorization header uses a non-Bearer scheme");
        return Err(TokenDefect::NotBearerScheme);
    }

    let credential = credential.trim();
    if credential.is_empty() {
        tracing::debug!(target: "jwks_auth.token", "Authorization header has no credential");
        return Err(TokenDefect::WrongSegmentCount);
    }

    Ok(credential)
}

/// Parse a compact-serialized JWS into header, claims and signature.
///
/// # Errors
///
/// Returns the first `TokenDefect` found, checking size, segment count,
/// header, payload and signature in that order.
pub fn parse_token(token: &str) -> Result<ParsedToken, TokenDefect> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "jwks_auth.token",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(TokenDefect::TooLarge);
    }

    // JWT format: header.payload.signature
    let mut segments = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        tracing::debug!(
            target: "jwks_auth.token",
            segments = token.split('.').count(),
            "Token rejected: invalid JWT format"
        );
        return Err(TokenDefect::WrongSegmentCount);
    };

    let header = decode_header(header_b64)?;
    let claims = decode_claims(payload_b64)?;

    let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|e| {
        tracing::debug!(target: "jwks_auth.token", error = %e, "Failed to decode JWT signature base64");
        TokenDefect::InvalidSignatureEncoding
    })?;

    Ok(ParsedToken {
        header,
        claims,
        signing_input: format!("{header_b64}.{payload_b64}"),
        encoded_signature: signature_b64.to_string(),
        signature,
    })
}

fn decode_header(segment: &str) -> Result<TokenHeader, TokenDefect> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "jwks_auth.token", error = %e, "Failed to decode JWT header base64");
        TokenDefect::InvalidHeader
    })?;

    let raw: RawHeader = serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "jwks_auth.token", error = %e, "Failed to parse JWT header JSON");
        TokenDefect::InvalidHeader
    })?;

    // kid must be a non-empty string
    let kid = match raw.kid {
        Some(serde_json::Value::String(kid)) if !kid.is_empty() => kid,
        _ => {
            tracing::debug!(target: "jwks_auth.token", "JWT header has no usable kid");
            return Err(TokenDefect::MissingKeyId);
        }
    };

    Ok(TokenHeader {
        alg: raw.alg,
        kid,
        typ: raw.typ,
    })
}

fn decode_claims(segment: &str) -> Result<Claims, TokenDefect> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "jwks_auth.token", error = %e, "Failed to decode JWT payload base64");
        TokenDefect::InvalidPayload
    })?;

    let payload: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&bytes)
        .map_err(|e| {
            tracing::debug!(target: "jwks_auth.token", error = %e, "Failed to parse JWT payload JSON");
            TokenDefect::InvalidPayload
        })?;

    serde_json::from_value(serde_json::Value::Object(payload)).map_err(|e| {
        tracing::debug!(target: "jwks_auth.token", error = %e, "JWT payload has mistyped registered claims");
        TokenDefect::InvalidRegisteredClaim
    })
}
