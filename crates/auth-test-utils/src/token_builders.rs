//! Builder patterns for test data construction
//!
//! Provides fluent APIs for creating test token claims and hand-crafted
//! (unsigned or deliberately broken) tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Issuer used by default in test tokens.
pub const TEST_ISSUER: &str = "https://idp.test.local/";

/// Audience used by default in test tokens.
pub const TEST_AUDIENCE: &str = "https://api.test.local";

/// Builder for creating test JWT claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_user("alice")
///     .claim("scope", "read:messages")
///     .expires_in(3600)
///     .build();
/// let token = keypair.sign_token(&claims);
/// ```
pub struct TestTokenBuilder {
    iss: Option<String>,
    sub: String,
    aud: Option<Value>,
    exp: Option<i64>,
    nbf: Option<i64>,
    iat: Option<i64>,
    extra: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new builder: test issuer and audience, valid for one hour.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            iss: Some(TEST_ISSUER.to_string()),
            sub: "test-subject".to_string(),
            aud: Some(json!(TEST_AUDIENCE)),
            exp: Some((now + Duration::seconds(3600)).timestamp()),
            nbf: None,
            iat: Some(now.timestamp()),
            extra: Map::new(),
        }
    }

    pub fn issuer(mut self, issuer: &str) -> Self {
        self.iss = Some(issuer.to_string());
        self
    }

    pub fn without_issuer(mut self) -> Self {
        self.iss = None;
        self
    }

    /// Set the subject (user/service)
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    pub fn audience(mut self, audience: &str) -> Self {
        self.aud = Some(json!(audience));
        self
    }

    /// Set `aud` to an array of audiences
    pub fn audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = Some(json!(audiences));
        self
    }

    pub fn without_audience(mut self) -> Self {
        self.aud = None;
        self
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set an absolute expiration timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = Some(timestamp);
        self
    }

    /// Expired one hour ago, issued two hours ago
    pub fn expired(mut self) -> Self {
        let now = Utc::now();
        self.exp = Some((now - Duration::seconds(3600)).timestamp());
        self.iat = Some((now - Duration::seconds(7200)).timestamp());
        self
    }

    pub fn without_expiry(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = Some(timestamp);
        self
    }

    /// Add a custom claim
    pub fn claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(name.to_string(), value.into());
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = Map::new();
        if let Some(iss) = self.iss {
            claims.insert("iss".to_string(), json!(iss));
        }
        claims.insert("sub".to_string(), json!(self.sub));
        if let Some(aud) = self.aud {
            claims.insert("aud".to_string(), aud);
        }
        for (name, value) in [("exp", self.exp), ("nbf", self.nbf), ("iat", self.iat)] {
            if let Some(value) = value {
                claims.insert(name.to_string(), json!(value));
            }
        }
        claims.extend(self.extra);
        Value::Object(claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble a compact token from arbitrary header and payload JSON and raw
/// signature bytes. Nothing is signed; use it for `alg: none`, wrong-key and
/// tampered-token cases.
pub fn forge_token(header: &Value, payload: &Value, signature: &[u8]) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string()),
        URL_SAFE_NO_PAD.encode(signature)
    )
}

/// Replace the payload of a signed token, keeping its header and signature.
pub fn tamper_payload(token: &str, payload: &Value) -> String {
    let mut segments = token.split('.');
    let header = segments.next().unwrap_or_default();
    let _payload = segments.next();
    let signature = segments.next().unwrap_or_default();
    format!(
        "{header}.{}.{signature}",
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creates_valid_claims() {
        let claims = TestTokenBuilder::new()
            .for_user("alice")
            .claim("scope", "read")
            .build();

        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["iss"], TEST_ISSUER);
        assert_eq!(claims["aud"], TEST_AUDIENCE);
        assert_eq!(claims["scope"], "read");
        assert!(claims["exp"].as_i64().unwrap() > Utc::now().timestamp());
    }

    #[test]
    fn test_builder_omits_removed_claims() {
        let claims = TestTokenBuilder::new()
            .without_issuer()
            .without_audience()
            .without_expiry()
            .build();
        let object = claims.as_object().unwrap();
        assert!(!object.contains_key("iss"));
        assert!(!object.contains_key("aud"));
        assert!(!object.contains_key("exp"));
        assert!(!object.contains_key("nbf"));
    }

    #[test]
    fn test_forge_token_segments() {
        let token = forge_token(&json!({"alg": "none"}), &json!({"sub": "x"}), b"");
        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2], "");
    }

    #[test]
    fn test_tamper_payload_keeps_signature() {
        let token = forge_token(&json!({"alg": "RS256"}), &json!({"sub": "a"}), b"sig");
        let tampered = tamper_payload(&token, &json!({"sub": "b"}));
        assert_eq!(token.rsplit('.').next(), tampered.rsplit('.').next());
        assert_ne!(token, tampered);
    }
}
