//! Middleware for the auth gate.
//!
//! # Components
//!
//! - `auth` - Bearer token guard for protected routes

pub mod auth;

pub use auth::{require_auth, AuthState, ClaimsExt};
