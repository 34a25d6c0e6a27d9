//! Redis cache backend over a shared connection manager. All failures map
//! to the cache-unavailable error the orchestrator downgrades to a local
//! compute.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

use esg_core::{CacheBackend, EsgError, EsgResult};

pub struct RedisCache {
    manager: ConnectionManager,
}

fn unavailable(operation: &str, err: redis::RedisError) -> EsgError {
    EsgError::CacheUnavailable {
        reason: format!("{}: {}", operation, err),
    }
}

impl RedisCache {
    /// Connects to a `redis://` or `rediss://` endpoint.
    pub async fn connect(url: &str) -> EsgResult<Self> {
        let client = redis::Client::open(url).map_err(|e| unavailable("open", e))?;
        let manager = client
            .get_tokio_connection_manager()
            .await
            .map_err(|e| unavailable("connect", e))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> EsgResult<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(|e| unavailable("get", e))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> EsgResult<()> {
        let mut conn = self.manager.clone();
        let ttl_secs = ttl.as_secs().max(1) as usize;
        conn.set_ex(key, value, ttl_secs)
            .await
            .map_err(|e| unavailable("set_ex", e))
    }

    async fn ping(&self) -> EsgResult<()> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| unavailable("ping", e))
    }
}
