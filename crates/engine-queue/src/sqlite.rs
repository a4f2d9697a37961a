//! Disk-backed queue over SQLite (spec.md §4.2: "survives restart inside one
//! host"). The claim pattern is the teacher's
//! `casparian_sentinel::db::queue::JobQueue::pop_job`: find the
//! highest-priority queued row, then atomically claim it with a
//! conditional `UPDATE ... WHERE id = ? AND status = 'QUEUED'`, so a
//! concurrent claimant racing on the same row sees zero rows affected
//! instead of double-claiming it.

use std::sync::Arc;

use async_trait::async_trait;
use engine_protocol::error::QueueError;
use engine_protocol::Request;
use sqlx::{Pool, Row, Sqlite};
use tracing::info;

use crate::serializer::RequestSerializer;
use crate::RequestQueue;

pub struct SqliteQueue {
    pool: Pool<Sqlite>,
    serializer: Arc<dyn RequestSerializer>,
}

impl SqliteQueue {
    pub async fn open(url: &str, serializer: Arc<dyn RequestSerializer>) -> Result<Self, QueueError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS engine_request_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                priority INTEGER NOT NULL,
                sequence INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'QUEUED',
                payload BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;

        Ok(Self { pool, serializer })
    }

    /// Drop any persisted rows (spec.md §6: `SCHEDULER_FLUSH_ON_START`).
    pub async fn flush(&self) -> Result<(), QueueError> {
        self.clear().await
    }
}

#[async_trait]
impl RequestQueue for SqliteQueue {
    async fn push(&self, request: Request) -> Result<(), QueueError> {
        let payload = self.serializer.serialize(&request)?;
        sqlx::query(
            "INSERT INTO engine_request_queue (priority, sequence, payload) VALUES (?, ?, ?)",
        )
        .bind(request.priority)
        .bind(request.sequence as i64)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn pop(&self) -> Result<Option<Request>, QueueError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;

        let row_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM engine_request_queue
            WHERE status = 'QUEUED'
            ORDER BY priority DESC, sequence ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;

        let Some(row_id) = row_id else {
            tx.commit().await.ok();
            return Ok(None);
        };

        let rows_affected = sqlx::query(
            "UPDATE engine_request_queue SET status = 'CLAIMED' WHERE id = ? AND status = 'QUEUED'",
        )
        .bind(row_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?
        .rows_affected();

        if rows_affected == 0 {
            // Raced with another claimant; caller can retry on its next tick.
            tx.commit().await.ok();
            return Ok(None);
        }

        let payload: Vec<u8> = sqlx::query("SELECT payload FROM engine_request_queue WHERE id = ?")
            .bind(row_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?
            .try_get("payload")
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;

        sqlx::query("DELETE FROM engine_request_queue WHERE id = ?")
            .bind(row_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;

        let request = self.serializer.deserialize(&payload)?;
        info!(request.sequence = request.sequence, "claimed request from disk queue");
        Ok(Some(request))
    }

    async fn size(&self) -> Result<u64, QueueError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM engine_request_queue WHERE status = 'QUEUED'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;
        Ok(count as u64)
    }

    async fn clear(&self) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM engine_request_queue")
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::JsonSerializer;
    use engine_protocol::Method;

    fn request(priority: i64, sequence: u64) -> Request {
        Request::new(url::Url::parse("http://x/").unwrap(), sequence)
            .method(Method::Get)
            .priority(priority)
            .build()
    }

    #[tokio::test]
    async fn pops_highest_priority_first() {
        let queue = SqliteQueue::open("sqlite::memory:", Arc::new(JsonSerializer))
            .await
            .unwrap();

        queue.push(request(0, 0)).await.unwrap();
        queue.push(request(10, 1)).await.unwrap();
        queue.push(request(5, 2)).await.unwrap();

        let popped = queue.pop().await.unwrap().unwrap();
        assert_eq!(popped.priority, 10);
    }

    #[tokio::test]
    async fn pop_on_empty_queue_returns_none() {
        let queue = SqliteQueue::open("sqlite::memory:", Arc::new(JsonSerializer))
            .await
            .unwrap();
        assert!(queue.pop().await.unwrap().is_none());
    }
}
