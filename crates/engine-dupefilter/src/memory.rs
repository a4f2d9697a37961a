//! In-memory fingerprint set (spec.md §4.1: "O(1) membership").

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use engine_protocol::error::FilterError;
use engine_protocol::fingerprint;
use engine_protocol::Request;

use crate::{FingerprintFilter, ReleaseReason};

#[derive(Default)]
pub struct MemoryFilter {
    seen: Mutex<HashSet<String>>,
    significant_headers: Vec<String>,
}

impl MemoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_significant_headers(headers: Vec<String>) -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            significant_headers: headers,
        }
    }

    fn fingerprint(&self, request: &Request) -> String {
        let headers: Vec<&str> = self.significant_headers.iter().map(String::as_str).collect();
        fingerprint::compute_for_request(request, &headers)
    }
}

#[async_trait]
impl FingerprintFilter for MemoryFilter {
    async fn seen(&self, request: &Request) -> Result<bool, FilterError> {
        let fp = self.fingerprint(request);
        let mut seen = self.seen.lock().expect("dupefilter lock poisoned");
        Ok(!seen.insert(fp))
    }

    async fn release(&self, request: &Request, _reason: ReleaseReason) {
        let fp = self.fingerprint(request);
        let mut seen = self.seen.lock().expect("dupefilter lock poisoned");
        seen.remove(&fp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_protocol::Method;

    fn request(url: &str, sequence: u64) -> Request {
        Request::new(url::Url::parse(url).unwrap(), sequence)
            .method(Method::Get)
            .build()
    }

    #[tokio::test]
    async fn first_seen_is_false_second_is_true() {
        let filter = MemoryFilter::new();
        let a = request("http://x/", 0);
        let b = request("http://x/", 1);

        assert!(!filter.seen(&a).await.unwrap());
        assert!(filter.seen(&b).await.unwrap());
    }

    #[tokio::test]
    async fn release_allows_re_admission() {
        let filter = MemoryFilter::new();
        let req = request("http://x/", 0);

        assert!(!filter.seen(&req).await.unwrap());
        filter.release(&req, ReleaseReason::RequestFailed).await;
        assert!(!filter.seen(&req).await.unwrap());
    }
}
