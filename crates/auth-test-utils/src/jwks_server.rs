//! Mock identity provider JWKS endpoint
//!
//! Wraps a `wiremock::MockServer` serving `/.well-known/jwks.json`. Every
//! `serve_*` call replaces whatever the endpoint served before.

use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::crypto_fixtures::jwks_document;

/// Path the mock serves the key set on.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

pub struct MockJwksServer {
    server: MockServer,
}

impl MockJwksServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full JWKS URL of this mock.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    /// Serve the given JWKs.
    pub async fn serve_keys(&self, keys: &[serde_json::Value]) {
        self.serve(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .await;
    }

    /// Serve the given JWKs with a `Cache-Control` header.
    pub async fn serve_keys_with_cache_control(
        &self,
        keys: &[serde_json::Value],
        cache_control: &str,
    ) {
        self.serve(
            ResponseTemplate::new(200)
                .insert_header("Cache-Control", cache_control)
                .set_body_json(jwks_document(keys)),
        )
        .await;
    }

    /// Serve the given JWKs after a delay (for single-flight tests).
    pub async fn serve_keys_with_delay(&self, keys: &[serde_json::Value], delay: Duration) {
        self.serve(
            ResponseTemplate::new(200)
                .set_delay(delay)
                .set_body_json(jwks_document(keys)),
        )
        .await;
    }

    /// Serve the given JWKs and verify on drop that exactly `times` requests arrived.
    pub async fn serve_keys_expecting(&self, keys: &[serde_json::Value], times: u64) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Respond with a bare status code.
    pub async fn serve_status(&self, status: u16) {
        self.serve(ResponseTemplate::new(status)).await;
    }

    /// Respond with a bare status code after a delay (for shared-failure tests).
    pub async fn serve_status_with_delay(&self, status: u16, delay: Duration) {
        self.serve(ResponseTemplate::new(status).set_delay(delay))
            .await;
    }

    /// Respond 200 with a raw (possibly malformed) body.
    pub async fn serve_raw(&self, body: &str) {
        self.serve(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/json")
                .set_body_string(body),
        )
        .await;
    }

    /// Number of JWKS requests received so far.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.iter().filter(|r| r.url.path() == JWKS_PATH).count())
            .unwrap_or(0)
    }

    /// Drop all mocks and recorded requests.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    async fn serve(&self, response: ResponseTemplate) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }
}
