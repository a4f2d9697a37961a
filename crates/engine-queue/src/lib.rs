//! Pluggable priority request queue (spec.md §4.2).

pub mod amqp;
pub mod memory;
pub mod redis_backed;
pub mod serializer;
pub mod sqlite;

use async_trait::async_trait;
use engine_protocol::error::QueueError;
use engine_protocol::Request;

/// Contract shared by every queue backend (spec.md §4.2). A **max-priority**
/// queue keyed by `request.priority`, FIFO tie-broken.
#[async_trait]
pub trait RequestQueue: Send + Sync {
    async fn push(&self, request: Request) -> Result<(), QueueError>;

    /// Returns `None` when the queue is currently empty. Implementations
    /// backed by a shared queue must be non-blocking (spec.md §4.6 — the
    /// engine's idle detection depends on distinguishing "empty now" from
    /// "will never be non-empty").
    async fn pop(&self) -> Result<Option<Request>, QueueError>;

    /// Advisory and eventually consistent for shared backends (spec.md
    /// §4.2).
    async fn size(&self) -> Result<u64, QueueError>;

    async fn clear(&self) -> Result<(), QueueError>;

    async fn close(&self) -> Result<(), QueueError>;
}

#[cfg(test)]
mod contract_tests {
    //! Shared test suite invoked against every in-process backend, so a new
    //! backend is checked for spec.md §8's invariant 5 (priority ordering)
    //! and basic push/pop/size/clear semantics without duplicating the
    //! assertions per module.
    use super::*;
    use crate::memory::MemoryQueue;
    use engine_protocol::Method;

    fn request(priority: i64, sequence: u64) -> Request {
        Request::new(url::Url::parse("http://x/").unwrap(), sequence)
            .method(Method::Get)
            .priority(priority)
            .build()
    }

    async fn assert_priority_then_fifo_ordering(queue: &dyn RequestQueue) {
        queue.push(request(0, 0)).await.unwrap();
        queue.push(request(10, 1)).await.unwrap();
        queue.push(request(-5, 2)).await.unwrap();
        queue.push(request(10, 3)).await.unwrap();

        let first = queue.pop().await.unwrap().unwrap();
        assert_eq!(first.priority, 10);
        assert_eq!(first.sequence, 1, "equal priority ties break FIFO");

        let second = queue.pop().await.unwrap().unwrap();
        assert_eq!(second.priority, 10);
        assert_eq!(second.sequence, 3);

        let third = queue.pop().await.unwrap().unwrap();
        assert_eq!(third.priority, 0);

        let fourth = queue.pop().await.unwrap().unwrap();
        assert_eq!(fourth.priority, -5);

        assert!(queue.pop().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_queue_orders_by_priority_then_fifo() {
        let queue = MemoryQueue::new();
        assert_priority_then_fifo_ordering(&queue).await;
    }

    #[tokio::test]
    async fn size_and_clear() {
        let queue = MemoryQueue::new();
        queue.push(request(0, 0)).await.unwrap();
        queue.push(request(1, 1)).await.unwrap();
        assert_eq!(queue.size().await.unwrap(), 2);

        queue.clear().await.unwrap();
        assert_eq!(queue.size().await.unwrap(), 0);
        assert!(queue.pop().await.unwrap().is_none());
    }
}
