//! # Auth Test Utilities
//!
//! Shared test utilities for the JWKS authentication crates.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (Ed25519 keypairs from seeds, a fixed RSA key)
//! - Test data builders (`TestTokenBuilder`, `forge_token`)
//! - A mock JWKS endpoint (`MockJwksServer`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let keypair = TestKeypair::new(1, "key-1");
//!     let jwks = MockJwksServer::start().await;
//!     jwks.serve_keys(&[keypair.jwk_json()]).await;
//!
//!     let token = keypair.sign_token(&TestTokenBuilder::new().for_user("alice").build());
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_server;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_server::*;
pub use token_builders::*;
