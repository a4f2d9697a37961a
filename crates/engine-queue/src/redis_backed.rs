//! Redis-backed queue (spec.md §4.2/§6): sorted set `{spider}:requests`
//! keyed by member = serialized request, score = negative priority (so
//! `ZPOPMIN` yields the highest-priority request first).

use std::sync::Arc;

use async_trait::async_trait;
use engine_protocol::error::QueueError;
use engine_protocol::Request;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::serializer::RequestSerializer;
use crate::RequestQueue;

/// FIFO tie-break within equal priority is approximated by folding the
/// monotonic `sequence` into the score's fractional part, since Redis sorted
/// sets only order by a single `f64` score.
fn score_for(priority: i64, sequence: u64) -> f64 {
    let fractional = (sequence as f64) / (u32::MAX as f64 + 1.0);
    -(priority as f64) + fractional
}

pub struct RedisQueue {
    conn: ConnectionManager,
    key: String,
    serializer: Arc<dyn RequestSerializer>,
}

impl RedisQueue {
    pub async fn connect(
        redis_url: &str,
        spider_name: &str,
        serializer: Arc<dyn RequestSerializer>,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;
        Ok(Self {
            conn,
            key: format!("{spider_name}:requests"),
            serializer,
        })
    }
}

#[async_trait]
impl RequestQueue for RedisQueue {
    async fn push(&self, request: Request) -> Result<(), QueueError> {
        let score = score_for(request.priority, request.sequence);
        let payload = self.serializer.serialize(&request)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .zadd(&self.key, payload, score)
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn pop(&self) -> Result<Option<Request>, QueueError> {
        let mut conn = self.conn.clone();
        let popped: Vec<(Vec<u8>, f64)> = conn
            .zpopmin(&self.key, 1)
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;

        match popped.into_iter().next() {
            Some((payload, _score)) => Ok(Some(self.serializer.deserialize(&payload)?)),
            None => Ok(None),
        }
    }

    async fn size(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let count: u64 = conn
            .zcard(&self.key)
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;
        Ok(count)
    }

    async fn clear(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(&self.key)
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        Ok(())
    }
}
