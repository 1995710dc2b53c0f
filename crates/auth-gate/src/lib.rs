//! Auth Gate
//!
//! Axum host for the `jwks-auth` engine: every protected route sits behind a
//! bearer token guard that verifies JWTs against the identity provider's
//! JWKS and answers failures with a 401 JSON body.
//!
//! # Modules
//!
//! - `config` - environment configuration and policy construction
//! - `errors` - 401 response mapping
//! - `middleware` - the `require_auth` guard
//! - `handlers` / `routes` - HTTP surface
//! - `observability` - Prometheus recorder

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
