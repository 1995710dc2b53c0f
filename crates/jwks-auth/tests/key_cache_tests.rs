//! Key cache integration tests.
//!
//! Exercises fetching, refresh triggers, single-flight coalescing and the
//! stale-but-available policy against a mocked JWKS endpoint.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use auth_test_utils::{MockJwksServer, RsaTestKey, TestKeypair};
use futures::future::join_all;
use jwks_auth::{KeyCache, KeyFetchError, KeyLookupError, ValidationPolicy};
use std::sync::Arc;
use std::time::Duration;

fn policy(jwks: &MockJwksServer) -> ValidationPolicy {
    ValidationPolicy::new(&jwks.jwks_url(), "https://idp.test.local/").unwrap()
}

fn key(seed: u8, kid: &str) -> serde_json::Value {
    TestKeypair::new(seed, kid).jwk_json()
}

#[tokio::test]
async fn test_repeated_lookups_fetch_once() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_keys_expecting(&[key(1, "k1"), key(2, "k2")], 1)
        .await;
    let cache = KeyCache::new(&policy(&jwks));

    let first = cache.get_key("k1").await.unwrap();
    let second = cache.get_key("k1").await.unwrap();
    let other = cache.get_key("k2").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(other.kid, "k2");
    assert_eq!(jwks.request_count().await, 1);
}

#[tokio::test]
async fn test_unknown_kid_triggers_exactly_one_refresh() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_keys(&[key(1, "k1")]).await;
    let cache = KeyCache::new(&policy(&jwks));

    cache.get_key("k1").await.unwrap();
    assert_eq!(jwks.request_count().await, 1);

    let err = cache.get_key("unknown").await.unwrap_err();
    assert_eq!(
        err,
        KeyLookupError::KeyNotFound {
            kid: "unknown".to_string()
        }
    );
    assert_eq!(jwks.request_count().await, 2, "one refresh, no retry loop");
}

#[tokio::test]
async fn test_refresh_cooldown_suppresses_miss_refetch() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_keys(&[key(1, "k1")]).await;
    let cache = KeyCache::new(&policy(&jwks));

    cache.get_key("k1").await.unwrap();
    for i in 0..5 {
        assert!(matches!(
            cache.get_key(&format!("random-kid-{i}")).await,
            Err(KeyLookupError::KeyNotFound { .. })
        ));
    }

    // The first miss refetches; the rest fall inside the cooldown
    assert_eq!(jwks.request_count().await, 2);
}

#[tokio::test]
async fn test_miss_after_cooldown_refetches_again() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_keys(&[key(1, "k1")]).await;
    let cache = KeyCache::new(
        &policy(&jwks).with_refresh_cooldown(Duration::from_millis(100)),
    );

    cache.get_key("k1").await.unwrap();
    assert!(cache.get_key("unknown").await.is_err());
    assert!(cache.get_key("unknown").await.is_err());
    assert_eq!(jwks.request_count().await, 2);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(cache.get_key("unknown").await.is_err());
    assert_eq!(jwks.request_count().await, 3);
}

#[tokio::test]
async fn test_key_rotation_picked_up_on_miss() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_keys(&[key(1, "old")]).await;
    let cache = KeyCache::new(&policy(&jwks));

    cache.get_key("old").await.unwrap();

    // Provider rotates: new key published, old key retired
    jwks.serve_keys(&[key(2, "new")]).await;

    let rotated = cache.get_key("new").await.unwrap();
    assert_eq!(rotated.kid, "new");
    assert_eq!(jwks.request_count().await, 1, "one fetch since rotation");

    assert!(matches!(
        cache.get_key("old").await,
        Err(KeyLookupError::KeyNotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lookups_share_one_fetch() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_keys_with_delay(&[key(1, "k1")], Duration::from_millis(200))
        .await;
    let cache = Arc::new(KeyCache::new(&policy(&jwks)));

    let lookups = (0..50).map(|_| {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_key("k1").await })
    });
    let results = join_all(lookups).await;

    for result in results {
        assert_eq!(result.unwrap().unwrap().kid, "k1");
    }
    assert_eq!(jwks.request_count().await, 1, "single-flight refresh");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_share_one_fetch() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_status_with_delay(503, Duration::from_millis(200))
        .await;
    let cache = Arc::new(KeyCache::new(&policy(&jwks)));

    let lookups = (0..20).map(|_| {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_key("k1").await })
    });
    let results = join_all(lookups).await;

    for result in results {
        assert_eq!(
            result.unwrap().unwrap_err(),
            KeyLookupError::Unavailable(KeyFetchError::Status(503))
        );
    }
    assert_eq!(jwks.request_count().await, 1, "failure shared by all callers");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_on_fresh_set_share_one_fetch() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_keys(&[key(1, "old")]).await;
    let cache = Arc::new(KeyCache::new(&policy(&jwks)));
    cache.get_key("old").await.unwrap();

    // Rotation lands; request counting restarts with the new mock
    jwks.serve_keys_with_delay(&[key(1, "old"), key(2, "new")], Duration::from_millis(200))
        .await;

    let lookups = (0..30).map(|_| {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_key("new").await })
    });
    let results = join_all(lookups).await;

    for result in results {
        assert_eq!(result.unwrap().unwrap().kid, "new");
    }
    assert_eq!(jwks.request_count().await, 1, "single miss-triggered refresh");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lookups_on_expired_set_share_one_fetch() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_keys(&[key(1, "k1")]).await;
    let cache = Arc::new(KeyCache::new(
        &policy(&jwks)
            .with_cache_ttl(Duration::from_millis(100))
            .unwrap(),
    ));
    let before = cache.get_key("k1").await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    jwks.serve_keys_with_delay(&[key(1, "k1")], Duration::from_millis(200))
        .await;

    let lookups = (0..30).map(|_| {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get_key("k1").await })
    });
    let results = join_all(lookups).await;

    for result in results {
        let key = result.unwrap().unwrap();
        assert!(!Arc::ptr_eq(&key, &before), "served from the refreshed set");
    }
    assert_eq!(jwks.request_count().await, 1, "single expiry-triggered refresh");
}

#[tokio::test]
async fn test_first_fetch_failure_fails_closed_then_recovers() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_status(503).await;
    let cache = KeyCache::new(&policy(&jwks));

    let err = cache.get_key("k1").await.unwrap_err();
    assert_eq!(err, KeyLookupError::Unavailable(KeyFetchError::Status(503)));
    assert!(cache.snapshot().is_none());

    // Provider comes back
    jwks.serve_keys(&[key(1, "k1")]).await;
    assert_eq!(cache.get_key("k1").await.unwrap().kid, "k1");
}

#[tokio::test]
async fn test_expired_set_served_stale_when_refresh_fails() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_keys(&[key(1, "k1")]).await;
    let cache = KeyCache::new(
        &policy(&jwks)
            .with_cache_ttl(Duration::from_millis(100))
            .unwrap(),
    );

    cache.get_key("k1").await.unwrap();

    jwks.serve_status(500).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Known kid: stale key served, fetch failure hidden
    assert_eq!(cache.get_key("k1").await.unwrap().kid, "k1");
    assert!(jwks.request_count().await >= 1, "refresh was attempted");

    // Unknown kid: fetch failure surfaces
    assert_eq!(
        cache.get_key("k2").await.unwrap_err(),
        KeyLookupError::Unavailable(KeyFetchError::Status(500))
    );

    // The failed refresh did not evict the set
    assert!(cache.snapshot().unwrap().get("k1").is_some());
}

#[tokio::test]
async fn test_expired_set_replaced_when_refresh_succeeds() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_keys(&[key(1, "k1")]).await;
    let cache = KeyCache::new(
        &policy(&jwks)
            .with_cache_ttl(Duration::from_millis(100))
            .unwrap(),
    );

    let before = cache.get_key("k1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let after = cache.get_key("k1").await.unwrap();

    assert!(!Arc::ptr_eq(&before, &after), "set was refetched");
    assert_eq!(jwks.request_count().await, 2);
}

#[tokio::test]
async fn test_invalidate_disables_stale_fallback() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_keys(&[key(1, "k1")]).await;
    let cache = KeyCache::new(&policy(&jwks));

    cache.get_key("k1").await.unwrap();
    jwks.serve_status(500).await;
    cache.invalidate();
    assert!(cache.snapshot().is_none());

    assert_eq!(
        cache.get_key("k1").await.unwrap_err(),
        KeyLookupError::Unavailable(KeyFetchError::Status(500))
    );
}

#[tokio::test]
async fn test_fresh_set_miss_with_failed_refresh_is_unavailable() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_keys(&[key(1, "k1")]).await;
    let cache = KeyCache::new(&policy(&jwks));

    cache.get_key("k1").await.unwrap();
    jwks.serve_status(502).await;

    assert_eq!(
        cache.get_key("k2").await.unwrap_err(),
        KeyLookupError::Unavailable(KeyFetchError::Status(502))
    );
    // Known keys keep resolving from the fresh set
    assert_eq!(cache.get_key("k1").await.unwrap().kid, "k1");
}

#[tokio::test]
async fn test_malformed_document_is_unavailable() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_raw("this is not json").await;
    let cache = KeyCache::new(&policy(&jwks));

    assert!(matches!(
        cache.get_key("k1").await,
        Err(KeyLookupError::Unavailable(
            KeyFetchError::MalformedDocument(_)
        ))
    ));
}

#[tokio::test]
async fn test_bad_entries_skipped() {
    let jwks = MockJwksServer::start().await;
    let good = RsaTestKey::new("rsa-1").jwk_json();
    let duplicate = key(9, "rsa-1");
    let body = serde_json::json!({
        "keys": [
            "not-an-object",
            {"kid": "no-kty"},
            {"kty": "RSA", "n": "AQAB", "e": "AQAB"},
            {"kty": "RSA", "kid": "enc-key", "use": "enc", "n": "AQAB", "e": "AQAB"},
            good,
            duplicate,
        ]
    });
    jwks.serve_raw(&body.to_string()).await;
    let cache = KeyCache::new(&policy(&jwks));

    let set = cache.refresh().await.unwrap();
    assert_eq!(set.key_ids().collect::<Vec<_>>(), vec!["rsa-1"]);
    assert_eq!(cache.get_key("rsa-1").await.unwrap().kty, "RSA");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_lookup_still_populates_cache() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_keys_with_delay(&[key(1, "k1")], Duration::from_millis(200))
        .await;
    let cache = KeyCache::new(&policy(&jwks));

    // Caller gives up long before the fetch completes
    let abandoned = tokio::time::timeout(Duration::from_millis(20), cache.get_key("k1")).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(cache.snapshot().is_some(), "in-flight refresh completed");

    cache.get_key("k1").await.unwrap();
    assert_eq!(jwks.request_count().await, 1);
}
