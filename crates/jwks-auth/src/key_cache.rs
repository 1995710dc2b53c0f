//! JWKS key cache.
//!
//! Fetches the identity provider's JWKS, indexes keys by `kid` and decides
//! when to refetch.
//!
//! # Concurrency
//!
//! - The current `KeySet` sits behind an `ArcSwapOption`; lookups never take a
//!   lock and refreshes replace the whole snapshot at once.
//! - Refreshes are single-flight: the first caller spawns the fetch and
//!   publishes a shared handle, later callers await the same handle.
//! - The fetch runs in its own task and stores its result itself, so it
//!   completes and populates the cache even if every waiting caller is
//!   dropped.
//!
//! # Failure policy
//!
//! - Never fetched (or invalidated) and the fetch fails: fail closed.
//! - Expired and the refresh fails: known `kid`s are served from the stale
//!   set, unknown `kid`s surface the fetch failure.
//! - A failed fetch never evicts the current set.

use crate::error::{KeyFetchError, KeyLookupError};
use crate::jwk::{parse_max_age, Jwk, KeySet};
use crate::metrics;
use crate::policy::ValidationPolicy;
use arc_swap::ArcSwapOption;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::{Client, Url};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::instrument;

/// Maximum accepted JWKS document size (64 KiB).
pub const MAX_JWKS_BODY_BYTES: usize = 64 * 1024;

type FetchResult = Result<Arc<KeySet>, KeyFetchError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshTrigger {
    /// Caller asked for a fetch; always fetches unless one is in flight.
    Explicit,
    /// The set was missing or past its freshness window.
    Expired,
    /// A fresh set lacked the requested `kid`.
    UnknownKid,
}

/// A refresh in progress, tagged so only its own task clears it.
struct Flight {
    id: u64,
    fetch: SharedFetch,
}

/// State shared with spawned fetch tasks.
struct CacheState {
    jwks_url: Url,
    http_client: Client,
    cache_ttl: Duration,
    current: ArcSwapOption<KeySet>,
    in_flight: Mutex<Option<Flight>>,
    next_flight_id: AtomicU64,
}

/// Cache of the identity provider's signing keys.
pub struct KeyCache {
    state: Arc<CacheState>,
    refresh_cooldown: Duration,
}

impl KeyCache {
    /// Create an empty cache for the policy's JWKS endpoint. Nothing is
    /// fetched until the first lookup.
    pub fn new(policy: &ValidationPolicy) -> Self {
        let http_client = policy.http_client.clone().unwrap_or_else(|| {
            Client::builder()
                .timeout(policy.fetch_timeout())
                .build()
                .unwrap_or_else(|e| {
                    tracing::warn!(target: "jwks_auth.cache", error = %e, "Failed to build HTTP client with custom config, using defaults");
                    Client::new()
                })
        });

        Self {
            state: Arc::new(CacheState {
                jwks_url: policy.jwks_url().clone(),
                http_client,
                cache_ttl: policy.cache_ttl(),
                current: ArcSwapOption::empty(),
                in_flight: Mutex::new(None),
                next_flight_id: AtomicU64::new(0),
            }),
            refresh_cooldown: policy.refresh_cooldown(),
        }
    }

    /// Resolve a key by ID.
    ///
    /// Performs at most one refresh: when the set is missing or expired, or
    /// when `kid` is unknown. The refresh cooldown only suppresses a miss
    /// refresh if the current set was itself fetched for a miss.
    ///
    /// # Errors
    ///
    /// - `KeyLookupError::KeyNotFound` if `kid` is absent from a usable set
    /// - `KeyLookupError::Unavailable` if a needed fetch failed and no usable
    ///   key is cached
    #[instrument(skip_all, fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Arc<Jwk>, KeyLookupError> {
        let now = Instant::now();
        let current = self.state.current.load_full();

        if let Some(set) = current.as_ref().filter(|set| set.is_fresh(now)) {
            if let Some(key) = set.get(kid) {
                tracing::debug!(target: "jwks_auth.cache", kid = %kid, "JWKS cache hit");
                metrics::record_key_lookup("hit");
                return Ok(Arc::clone(key));
            }

            if !set.allows_miss_refresh(now, self.refresh_cooldown) {
                tracing::debug!(
                    target: "jwks_auth.cache",
                    kid = %kid,
                    "Key not found in JWKS cache, refresh cooldown active"
                );
                metrics::record_key_lookup("miss");
                return Err(KeyLookupError::KeyNotFound {
                    kid: kid.to_string(),
                });
            }

            tracing::debug!(target: "jwks_auth.cache", kid = %kid, "Key not found in JWKS cache, refreshing");
            let refreshed = self
                .refresh_since(Some(set), RefreshTrigger::UnknownKid)
                .await?;
            return lookup_after_refresh(&refreshed, kid);
        }

        match self
            .refresh_since(current.as_ref(), RefreshTrigger::Expired)
            .await
        {
            Ok(refreshed) => lookup_after_refresh(&refreshed, kid),
            Err(e) => match current.as_ref().and_then(|stale| stale.get(kid)) {
                Some(key) => {
                    tracing::warn!(
                        target: "jwks_auth.cache",
                        kid = %kid,
                        error = %e,
                        "JWKS refresh failed, serving key from stale set"
                    );
                    metrics::record_key_lookup("stale");
                    Ok(Arc::clone(key))
                }
                None => {
                    metrics::record_key_lookup("miss");
                    Err(KeyLookupError::Unavailable(e))
                }
            },
        }
    }

    /// Fetch the JWKS now, or join the fetch already in progress.
    ///
    /// # Errors
    ///
    /// Returns the `KeyFetchError` of the (shared) fetch. The current set is
    /// left untouched on failure.
    pub async fn refresh(&self) -> Result<Arc<KeySet>, KeyFetchError> {
        self.refresh_since(None, RefreshTrigger::Explicit).await
    }

    /// Refresh on behalf of a caller that observed `seen` as the current set.
    ///
    /// Joins an in-flight fetch if there is one. Otherwise, unless the
    /// trigger is explicit, a set stored after `seen` is returned as is so
    /// callers that raced a completed fetch do not start another.
    async fn refresh_since(
        &self,
        seen: Option<&Arc<KeySet>>,
        trigger: RefreshTrigger,
    ) -> Result<Arc<KeySet>, KeyFetchError> {
        let fetch = {
            let mut slot = self.state.in_flight.lock().await;
            match slot.as_ref() {
                Some(flight) if flight.fetch.peek().is_none() => {
                    tracing::debug!(target: "jwks_auth.cache", "Joining in-flight JWKS refresh");
                    flight.fetch.clone()
                }
                _ => {
                    if trigger != RefreshTrigger::Explicit {
                        if let Some(latest) = self.state.current.load_full() {
                            if !seen.is_some_and(|seen| Arc::ptr_eq(seen, &latest)) {
                                tracing::debug!(
                                    target: "jwks_auth.cache",
                                    "Key set replaced since lookup, skipping fetch"
                                );
                                return Ok(latest);
                            }
                        }
                    }

                    let id = self.state.next_flight_id.fetch_add(1, Ordering::Relaxed);
                    let fetch = self.start_fetch(id, trigger);
                    *slot = Some(Flight {
                        id,
                        fetch: fetch.clone(),
                    });
                    fetch
                }
            }
        };

        fetch.await
    }

    /// Drop the current key set. The next lookup refetches and, if that
    /// fails, gets no stale fallback.
    pub fn invalidate(&self) {
        tracing::info!(target: "jwks_auth.cache", "JWKS cache invalidated");
        self.state.current.store(None);
    }

    /// Current key set, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<KeySet>> {
        self.state.current.load_full()
    }

    /// Spawn the fetch task. Must be called with `in_flight` locked.
    fn start_fetch(&self, id: u64, trigger: RefreshTrigger) -> SharedFetch {
        let state = Arc::clone(&self.state);
        let miss_triggered = trigger == RefreshTrigger::UnknownKid;
        let handle = tokio::spawn(async move {
            let result = state.fetch_and_store(miss_triggered).await;

            // The spawner still holds the lock until the slot is set
            let mut slot = state.in_flight.lock().await;
            if slot.as_ref().is_some_and(|flight| flight.id == id) {
                *slot = None;
            }

            result
        });

        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(KeyFetchError::TaskFailed(e.to_string())))
        }
        .boxed()
        .shared()
    }
}

impl CacheState {
    async fn fetch_and_store(&self, miss_triggered: bool) -> FetchResult {
        let start = Instant::now();
        let result = self.fetch().await.map(|set| {
            if miss_triggered {
                Arc::new(set.into_miss_triggered())
            } else {
                Arc::new(set)
            }
        });
        let duration = start.elapsed();

        match &result {
            Ok(set) => {
                metrics::record_jwks_fetch("success", duration);
                self.current.store(Some(Arc::clone(set)));
                tracing::info!(
                    target: "jwks_auth.cache",
                    key_count = set.len(),
                    miss_triggered,
                    freshness_secs = set.expires_at().saturating_duration_since(set.fetched_at()).as_secs(),
                    "JWKS cache refreshed"
                );
            }
            Err(e) => {
                metrics::record_jwks_fetch(e.kind(), duration);
                tracing::error!(target: "jwks_auth.cache", error = %e, "Failed to refresh JWKS");
            }
        }

        result
    }

    async fn fetch(&self) -> Result<KeySet, KeyFetchError> {
        tracing::debug!(target: "jwks_auth.cache", url = %self.jwks_url, "Fetching JWKS");

        let mut response = self
            .http_client
            .get(self.jwks_url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| KeyFetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(target: "jwks_auth.cache", status = %status, "JWKS endpoint returned error");
            return Err(KeyFetchError::Status(status.as_u16()));
        }

        let freshness = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(self.cache_ttl);

        let too_large = KeyFetchError::BodyTooLarge {
            limit: MAX_JWKS_BODY_BYTES,
        };

        if response
            .content_length()
            .is_some_and(|len| len > MAX_JWKS_BODY_BYTES as u64)
        {
            return Err(too_large);
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| KeyFetchError::Transport(e.to_string()))?
        {
            if body.len().saturating_add(chunk.len()) > MAX_JWKS_BODY_BYTES {
                return Err(too_large);
            }
            body.extend_from_slice(&chunk);
        }

        KeySet::from_document(&body, Instant::now(), freshness)
    }
}

fn lookup_after_refresh(set: &KeySet, kid: &str) -> Result<Arc<Jwk>, KeyLookupError> {
    match set.get(kid) {
        Some(key) => {
            metrics::record_key_lookup("hit");
            Ok(Arc::clone(key))
        }
        None => {
            tracing::debug!(target: "jwks_auth.cache", kid = %kid, "Key not found in JWKS after refresh");
            metrics::record_key_lookup("miss");
            Err(KeyLookupError::KeyNotFound {
                kid: kid.to_string(),
            })
        }
    }
}
