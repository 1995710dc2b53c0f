//! JWKS-backed bearer token authentication.
//!
//! Verifies JWTs against public keys published by an identity provider's
//! JWKS endpoint. Framework-free: hosts call [`Authenticator::authenticate`]
//! with the raw `Authorization` header value and map the typed
//! [`AuthError`] to their own response.
//!
//! # Modules
//!
//! - `key_cache` - JWKS fetching, caching and single-flight refresh
//! - `token` - bearer header and compact JWS parsing
//! - `signature` - algorithm allow-list and signature checks
//! - `claims` - registered claim validation
//! - `verifier` - the orchestrator tying the above together
//!
//! # Example
//!
//! ```rust,ignore
//! let policy = ValidationPolicy::new("https://idp.example.com/.well-known/jwks.json", "https://idp.example.com/")?
//!     .with_audience("https://api.example.com");
//! let authenticator = Authenticator::new(policy);
//!
//! match authenticator.authenticate_now(header_value).await {
//!     Ok(validated) => { /* proceed with validated.claims */ }
//!     Err(rejection) => { /* 401 with rejection.code() and rejection.to_string() */ }
//! }
//! ```

pub mod claims;
pub mod error;
pub mod jwk;
pub mod key_cache;
pub mod metrics;
pub mod policy;
pub mod signature;
pub mod token;
pub mod verifier;

pub use claims::{Audience, Claims};
pub use error::{AuthError, KeyFetchError, KeyLookupError, PolicyError, TokenDefect};
pub use jsonwebtoken::Algorithm;
pub use jwk::{Jwk, KeySet};
pub use key_cache::KeyCache;
pub use policy::ValidationPolicy;
pub use verifier::{Authenticator, ValidatedClaims, VerificationStage};
