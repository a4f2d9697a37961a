//! TTL-backed "in-flight" auxiliary set decorator (spec.md §4.1: "Retryable
//! variants ... maintain a short-lived in-flight auxiliary set with TTL; on
//! failure, the fingerprint is removed from both sets so the request can
//! re-enter"). Wraps any base [`FingerprintFilter`], keeping the
//! TTL/requeue concern orthogonal to the base filter's admission logic —
//! mirroring how the teacher's job queue keeps `retry_count`/requeue
//! separate from the atomic claim in `db/queue.rs`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use engine_protocol::error::FilterError;
use engine_protocol::fingerprint;
use engine_protocol::Request;

use crate::{FingerprintFilter, ReleaseReason};

pub struct RetryableFilter<F: FingerprintFilter> {
    inner: F,
    ttl: Duration,
    in_flight: Mutex<HashMap<String, Instant>>,
    significant_headers: Vec<String>,
}

impl<F: FingerprintFilter> RetryableFilter<F> {
    pub fn new(inner: F, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            in_flight: Mutex::new(HashMap::new()),
            significant_headers: Vec::new(),
        }
    }

    fn fingerprint(&self, request: &Request) -> String {
        let headers: Vec<&str> = self.significant_headers.iter().map(String::as_str).collect();
        fingerprint::compute_for_request(request, &headers)
    }

    fn expire_stale(&self, in_flight: &mut HashMap<String, Instant>) {
        let ttl = self.ttl;
        in_flight.retain(|_, claimed_at| claimed_at.elapsed() < ttl);
    }
}

#[async_trait]
impl<F: FingerprintFilter> FingerprintFilter for RetryableFilter<F> {
    async fn seen(&self, request: &Request) -> Result<bool, FilterError> {
        let fp = self.fingerprint(request);
        {
            let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
            self.expire_stale(&mut in_flight);
            if in_flight.contains_key(&fp) {
                return Ok(true);
            }
        }

        let already_seen = self.inner.seen(request).await?;
        if !already_seen {
            let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
            in_flight.insert(fp, Instant::now());
        }
        Ok(already_seen)
    }

    async fn release(&self, request: &Request, reason: ReleaseReason) {
        let fp = self.fingerprint(request);
        {
            let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
            in_flight.remove(&fp);
        }
        self.inner.release(request, reason).await;
    }
}
