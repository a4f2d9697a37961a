//! Scheduler component (spec.md §4.6): the only component the engine talks
//! to for queue operations, bridging the request queue and the fingerprint
//! filter.

pub mod stats;

use std::sync::Arc;

use engine_dupefilter::{FingerprintFilter, ReleaseReason};
use engine_protocol::error::SchedulerError;
use engine_protocol::request::Request;
use engine_queue::RequestQueue;

use stats::SchedulerStats;

pub struct Scheduler {
    queue: Arc<dyn RequestQueue>,
    filter: Arc<dyn FingerprintFilter>,
    stats: Arc<dyn SchedulerStats>,
}

impl Scheduler {
    pub fn new(queue: Arc<dyn RequestQueue>, filter: Arc<dyn FingerprintFilter>, stats: Arc<dyn SchedulerStats>) -> Self {
        Self { queue, filter, stats }
    }

    /// Pushes a request onto the queue unless it is a filtered duplicate
    /// (spec.md §4.6: "if `request.dont_filter` is false, consult the
    /// filter; if seen, increment a dup-count stat and return false.
    /// Otherwise push to queue and return true").
    pub async fn enqueue(&self, request: Request) -> Result<bool, SchedulerError> {
        if !request.meta.dont_filter && self.filter.seen(&request).await? {
            tracing::debug!(url = %request.url, "duplicate request filtered");
            self.stats.record_duplicate();
            return Ok(false);
        }

        self.queue.push(request).await?;
        self.stats.record_enqueued();
        Ok(true)
    }

    /// Returns the highest-priority pending request, or `None` if the queue
    /// is empty right now (spec.md §4.6).
    pub async fn next(&self) -> Result<Option<Request>, SchedulerError> {
        Ok(self.queue.pop().await?)
    }

    /// Pushes a request straight back onto the queue without consulting the
    /// filter. Used for the downloader's own retry path (spec.md §4.4):
    /// the fingerprint was already admitted on first dispatch, so routing a
    /// retry through `enqueue` would reject it as a duplicate of itself.
    pub async fn requeue(&self, request: Request) -> Result<(), SchedulerError> {
        self.queue.push(request).await?;
        Ok(())
    }

    pub async fn has_pending(&self) -> Result<bool, SchedulerError> {
        Ok(self.queue.size().await? > 0)
    }

    /// Lets a fingerprint back in after its request ultimately failed, so a
    /// retry of the same URL isn't silently dropped as a duplicate (spec.md
    /// §7's failure-retraction path).
    pub async fn release(&self, request: &Request, reason: ReleaseReason) {
        self.filter.release(request, reason).await;
    }

    pub async fn close(&self) -> Result<(), SchedulerError> {
        Ok(self.queue.close().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_dupefilter::memory::MemoryFilter;
    use engine_protocol::Method;
    use engine_queue::memory::MemoryQueue;

    fn request(priority: i64, sequence: u64) -> Request {
        Request::new(url::Url::parse("https://example.com/a").unwrap(), sequence)
            .method(Method::Get)
            .priority(priority)
            .build()
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(
            Arc::new(MemoryQueue::new()),
            Arc::new(MemoryFilter::new()),
            Arc::new(stats::NoopStats),
        )
    }

    #[tokio::test]
    async fn duplicate_requests_are_rejected_and_originals_admitted() {
        let scheduler = scheduler();
        assert!(scheduler.enqueue(request(0, 0)).await.unwrap());
        assert!(!scheduler.enqueue(request(0, 1)).await.unwrap());
        assert!(scheduler.has_pending().await.unwrap());
    }

    #[tokio::test]
    async fn dont_filter_bypasses_the_fingerprint_filter() {
        let scheduler = scheduler();
        let mut duplicate = request(0, 1);
        duplicate.meta.dont_filter = true;

        assert!(scheduler.enqueue(request(0, 0)).await.unwrap());
        assert!(scheduler.enqueue(duplicate).await.unwrap());
    }

    #[tokio::test]
    async fn next_drains_highest_priority_first() {
        let scheduler = scheduler();
        scheduler.enqueue(request(0, 0)).await.unwrap();
        scheduler.enqueue(request(5, 1)).await.unwrap();

        let first = scheduler.next().await.unwrap().unwrap();
        assert_eq!(first.priority, 5);
        assert!(scheduler.has_pending().await.unwrap());
    }
}
