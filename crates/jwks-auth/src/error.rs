//! Error types for bearer token authentication.
//!
//! `AuthError` is the closed set of reasons a request can be rejected. Every
//! variant carries a client-safe `Display` message, a stable machine code and
//! a bounded metric label, so hosts can map rejections exhaustively without
//! inspecting strings.
//!
//! Supporting errors:
//! - `TokenDefect` - the specific structural defect behind `MalformedToken`
//! - `KeyFetchError` - why a JWKS fetch failed (cloneable for shared refreshes)
//! - `KeyLookupError` - the key cache contract (`KeyNotFound` / unavailable)
//! - `PolicyError` - invalid validation policy settings

use thiserror::Error;

/// Structural defects detected while parsing a bearer token.
///
/// The `Display` text names the defect precisely; it is embedded in the
/// `MalformedToken` message returned to clients.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenDefect {
    #[error("The Authorization header must use the Bearer scheme.")]
    NotBearerScheme,

    #[error("The token exceeds the maximum allowed size.")]
    TooLarge,

    #[error("The token is malformed.")]
    WrongSegmentCount,

    #[error("The token header is not a valid base64url serialized JSON.")]
    InvalidHeader,

    #[error("The token payload is not a valid base64url serialized JSON.")]
    InvalidPayload,

    #[error("The token signature is not a valid base64url string.")]
    InvalidSignatureEncoding,

    #[error("The token header does not contain a key identifier.")]
    MissingKeyId,

    #[error("The token payload contains a registered claim of the wrong type.")]
    InvalidRegisteredClaim,
}

/// Reasons a bearer token is rejected.
///
/// Mutually exclusive; the orchestrator returns exactly one per request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization` header on the request.
    #[error("Missing Authorization HTTP header.")]
    MissingAuthorizationHeader,

    /// The header or token is structurally invalid.
    #[error("Authorization token is invalid: {0}")]
    MalformedToken(TokenDefect),

    /// The token's `alg` is not in the policy allow-list.
    #[error("Authorization token is invalid: The token algorithm is not allowed.")]
    UnsupportedAlgorithm { alg: String },

    /// The signature does not verify against the resolved key.
    #[error("Authorization token is invalid: The token signature is invalid.")]
    SignatureInvalid,

    /// No key with the token's `kid` exists, even after a refresh.
    #[error("Untrusted authorization token: no signing key matches the token key identifier.")]
    KeyNotFound { kid: String },

    /// The JWKS endpoint could not be reached and no usable key is cached.
    #[error("Unable to retrieve the signing keys from the identity provider.")]
    KeyProviderUnavailable(KeyFetchError),

    #[error("Authorization token expired.")]
    TokenExpired { exp: i64 },

    #[error("Authorization token is not yet valid.")]
    TokenNotYetValid,

    #[error("Authorization token is invalid: The iss claim value is not allowed.")]
    IssuerMismatch,

    #[error("Authorization token is invalid: The aud claim value is not allowed.")]
    AudienceMismatch,

    /// A claim the policy marks as required is absent.
    #[error("Authorization token is invalid: The {claim} claim is required.")]
    MissingRequiredClaim { claim: String },
}

impl AuthError {
    /// Stable machine-readable code for response bodies.
    ///
    /// The missing-header rejection has no token to describe and carries no
    /// code.
    #[must_use]
    pub fn code(&self) -> Option<&'static str> {
        let code = match self {
            AuthError::MissingAuthorizationHeader => return None,
            AuthError::MalformedToken(_) => "AUTHORIZATION_TOKEN_INVALID",
            AuthError::UnsupportedAlgorithm { .. } => "AUTHORIZATION_TOKEN_UNSUPPORTED_ALGORITHM",
            AuthError::SignatureInvalid => "AUTHORIZATION_TOKEN_SIGNATURE_INVALID",
            AuthError::KeyNotFound { .. } => "AUTHORIZATION_TOKEN_UNTRUSTED",
            AuthError::KeyProviderUnavailable(_) => "AUTHORIZATION_KEYS_UNAVAILABLE",
            AuthError::TokenExpired { .. } => "AUTHORIZATION_TOKEN_EXPIRED",
            AuthError::TokenNotYetValid => "AUTHORIZATION_TOKEN_INACTIVE",
            AuthError::IssuerMismatch => "AUTHORIZATION_TOKEN_ISSUER_MISMATCH",
            AuthError::AudienceMismatch => "AUTHORIZATION_TOKEN_AUDIENCE_MISMATCH",
            AuthError::MissingRequiredClaim { .. } => "AUTHORIZATION_TOKEN_CLAIM_MISSING",
        };
        Some(code)
    }

    /// Bounded label used for metrics and structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingAuthorizationHeader => "missing_authorization_header",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::UnsupportedAlgorithm { .. } => "unsupported_algorithm",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::KeyNotFound { .. } => "key_not_found",
            AuthError::KeyProviderUnavailable(_) => "key_provider_unavailable",
            AuthError::TokenExpired { .. } => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::MissingRequiredClaim { .. } => "missing_required_claim",
        }
    }

    /// Whether the rejection describes a defective token (as opposed to a
    /// missing header or an unavailable key provider).
    #[must_use]
    pub fn is_token_defect(&self) -> bool {
        !matches!(
            self,
            AuthError::MissingAuthorizationHeader | AuthError::KeyProviderUnavailable(_)
        )
    }
}

impl From<TokenDefect> for AuthError {
    fn from(defect: TokenDefect) -> Self {
        AuthError::MalformedToken(defect)
    }
}

/// Errors that can occur while fetching the JWKS document.
///
/// Cloneable so that every caller attached to a shared refresh observes the
/// same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyFetchError {
    #[error("JWKS request failed: {0}")]
    Transport(String),

    #[error("JWKS endpoint returned HTTP {0}")]
    Status(u16),

    #[error("JWKS document exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("JWKS document is malformed: {0}")]
    MalformedDocument(String),

    #[error("JWKS refresh task failed: {0}")]
    TaskFailed(String),
}

impl KeyFetchError {
    /// Bounded label used for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            KeyFetchError::Transport(_) => "transport",
            KeyFetchError::Status(_) => "status",
            KeyFetchError::BodyTooLarge { .. } => "body_too_large",
            KeyFetchError::MalformedDocument(_) => "malformed_document",
            KeyFetchError::TaskFailed(_) => "task_failed",
        }
    }
}

/// Failure of a key cache lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyLookupError {
    #[error("no signing key with kid {kid}")]
    KeyNotFound { kid: String },

    #[error("signing keys unavailable: {0}")]
    Unavailable(#[from] KeyFetchError),
}

impl From<KeyLookupError> for AuthError {
    fn from(err: KeyLookupError) -> Self {
        match err {
            KeyLookupError::KeyNotFound { kid } => AuthError::KeyNotFound { kid },
            KeyLookupError::Unavailable(e) => AuthError::KeyProviderUnavailable(e),
        }
    }
}

/// Invalid validation policy settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("JWKS URL is invalid: {0}")]
    InvalidJwksUrl(String),

    #[error("Expected issuer must not be empty")]
    EmptyIssuer,

    #[error("At least one signing algorithm must be allowed")]
    NoAlgorithms,

    #[error("Symmetric algorithm {0} cannot be verified with published keys")]
    SymmetricAlgorithm(String),

    #[error("Clock tolerance must not exceed {max_seconds} seconds, got {seconds}")]
    ClockToleranceTooLarge { seconds: u64, max_seconds: u64 },

    #[error("JWKS cache TTL must be greater than zero")]
    ZeroCacheTtl,

    #[error("JWKS fetch timeout must be greater than zero")]
    ZeroFetchTimeout,
}
