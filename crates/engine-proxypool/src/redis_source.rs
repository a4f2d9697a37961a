//! Redis-backed proxy source: "removed from the Redis sorted set, which is
//! the canonical pool" (spec.md §4.3).

use async_trait::async_trait;
use engine_protocol::error::ProxyError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::ProxySource;

pub struct RedisProxySource {
    conn: ConnectionManager,
    key: String,
}

impl RedisProxySource {
    pub async fn connect(redis_url: &str, pool_key: &str) -> Result<Self, ProxyError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| ProxyError::SourceUnavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| ProxyError::SourceUnavailable(e.to_string()))?;
        Ok(Self {
            conn,
            key: pool_key.to_string(),
        })
    }
}

#[async_trait]
impl ProxySource for RedisProxySource {
    async fn fetch(&self, count: usize) -> Result<Vec<String>, ProxyError> {
        let mut conn = self.conn.clone();
        // Highest-scoring (healthiest) proxies first.
        let proxies: Vec<String> = conn
            .zrevrange(&self.key, 0, count.saturating_sub(1) as isize)
            .await
            .map_err(|e| ProxyError::SourceUnavailable(e.to_string()))?;
        Ok(proxies)
    }

    async fn remove(&self, proxy_url: &str) -> Result<(), ProxyError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .zrem(&self.key, proxy_url)
            .await
            .map_err(|e| ProxyError::SourceUnavailable(e.to_string()))?;
        Ok(())
    }
}
