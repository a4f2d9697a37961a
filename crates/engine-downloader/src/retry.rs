//! Built-in retry middleware (spec.md §4.4: "on a retryable status or
//! transport exception, re-enqueue the request with `retry_count`
//! incremented, provided it hasn't exhausted `RETRY_TIMES`").

use std::collections::HashSet;

use async_trait::async_trait;
use engine_protocol::error::DownloadError;
use engine_protocol::request::Request;
use engine_protocol::response::Response;

use crate::middleware::{DownloaderMiddleware, ExceptionOutcome, ResponseOutcome};

pub struct RetryMiddleware {
    retry_http_codes: HashSet<u16>,
    retry_times: u32,
    retry_priority_adjust: i64,
}

impl RetryMiddleware {
    pub fn new(retry_http_codes: HashSet<u16>, retry_times: u32, retry_priority_adjust: i64) -> Self {
        Self {
            retry_http_codes,
            retry_times,
            retry_priority_adjust,
        }
    }

    /// Builds the retried `Request`: same URL/body/callback, `retry_count`
    /// incremented, priority nudged by `RETRY_PRIORITY_ADJUST` (spec.md
    /// §4.4: a negative adjustment pushes retries behind fresh work).
    fn build_retry(&self, request: &Request) -> Request {
        let mut retried = request.clone();
        retried.meta.retry_count += 1;
        retried.priority += self.retry_priority_adjust;
        retried
    }

    fn exhausted(&self, request: &Request) -> bool {
        request.meta.retry_count >= self.retry_times
    }
}

#[async_trait]
impl DownloaderMiddleware for RetryMiddleware {
    async fn process_response(&self, response: Response) -> ResponseOutcome {
        if !self.retry_http_codes.contains(&response.status) {
            return ResponseOutcome::Continue(response);
        }
        if self.exhausted(&response.request) {
            tracing::warn!(
                url = %response.request.url,
                retry_count = response.request.meta.retry_count,
                status = response.status,
                "retry budget exhausted, surfacing as terminal failure"
            );
            return ResponseOutcome::Fail(DownloadError::RetryBudgetExhausted(response.request.meta.retry_count));
        }
        let retried = self.build_retry(&response.request);
        tracing::debug!(url = %retried.url, retry_count = retried.meta.retry_count, "retrying after status");
        ResponseOutcome::Retry(retried)
    }

    async fn process_exception(&self, request: &Request, error: DownloadError) -> ExceptionOutcome {
        if self.exhausted(request) {
            return ExceptionOutcome::Propagate(DownloadError::RetryBudgetExhausted(request.meta.retry_count));
        }
        let retried = self.build_retry(request);
        tracing::debug!(url = %retried.url, retry_count = retried.meta.retry_count, %error, "retrying after exception");
        ExceptionOutcome::Retry(retried)
    }
}
