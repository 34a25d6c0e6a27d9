//! Fingerprint-keyed cache front with intra-process single-flight
//! coalescing. Cross-process coalescing is intentionally absent; the
//! backend TTL absorbs the rare double compute.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use esg_core::{CacheBackend, EsgError, EsgResult};

/// Backend operations are bounded; a slow cache reads as a miss.
const CACHE_OP_TIMEOUT: Duration = Duration::from_millis(200);

pub struct AnalysisCache {
    backend: Arc<dyn CacheBackend>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
    default_ttl: Duration,
}

impl AnalysisCache {
    pub fn new(backend: Arc<dyn CacheBackend>, default_ttl: Duration) -> Self {
        Self {
            backend,
            inflight: DashMap::new(),
            default_ttl,
        }
    }

    pub fn key(fingerprint: &str) -> String {
        format!("analysis:{}", fingerprint)
    }

    pub async fn ping(&self) -> EsgResult<()> {
        self.backend.ping().await
    }

    async fn backend_get(&self, key: &str) -> EsgResult<Option<String>> {
        tokio::time::timeout(CACHE_OP_TIMEOUT, self.backend.get(key))
            .await
            .map_err(|_| EsgError::CacheUnavailable {
                reason: "get timed out".to_string(),
            })?
    }

    async fn backend_put(&self, key: &str, value: &str, ttl: Duration) -> EsgResult<()> {
        tokio::time::timeout(CACHE_OP_TIMEOUT, self.backend.put(key, value, ttl))
            .await
            .map_err(|_| EsgError::CacheUnavailable {
                reason: "put timed out".to_string(),
            })?
    }

    /// Best-effort read: backend failures log a warning and read as a miss.
    pub async fn get<T: DeserializeOwned>(&self, fingerprint: &str) -> Option<T> {
        match self.backend_get(&Self::key(fingerprint)).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(%fingerprint, error = %err, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(%fingerprint, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Best-effort write with the default TTL unless overridden.
    pub async fn put<T: Serialize>(&self, fingerprint: &str, value: &T, ttl: Option<Duration>) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(%fingerprint, error = %err, "cache value serialization failed");
                return;
            }
        };
        let ttl = ttl.unwrap_or(self.default_ttl);
        if let Err(err) = self.backend_put(&Self::key(fingerprint), &raw, ttl).await {
            tracing::warn!(%fingerprint, error = %err, "cache write failed");
        }
    }

    /// At most one concurrent `compute` per fingerprint in this process;
    /// other callers wait and then observe the first caller's cached
    /// result. Returns the value and whether it came from cache.
    pub async fn compute_or_load<T, F, Fut>(
        &self,
        fingerprint: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> EsgResult<(T, bool)>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = EsgResult<T>>,
    {
        if let Some(found) = self.get::<T>(fingerprint).await {
            return Ok((found, true));
        }

        let gate = self
            .inflight
            .entry(fingerprint.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _held = gate.lock().await;

        // The winner of the race populated the cache while we waited.
        if let Some(found) = self.get::<T>(fingerprint).await {
            return Ok((found, true));
        }

        let result = compute().await;
        if let Ok(value) = &result {
            self.put(fingerprint, value, ttl).await;
        }
        // Entry removal is safe: concurrent waiters still hold the Arc and
        // serialize on the same mutex before re-checking the cache.
        self.inflight.remove(fingerprint);

        result.map(|value| (value, false))
    }
}
