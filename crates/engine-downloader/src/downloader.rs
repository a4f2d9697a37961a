//! Ties slots, the middleware chain, and the transport registry together
//! into a single dispatch entry point (spec.md §4.4).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use engine_protocol::error::DownloadError;
use engine_protocol::request::Request;
use engine_protocol::response::Response;
use engine_proxypool::{InvalidationReason, ProxyPool};
use tokio::sync::Semaphore;

use crate::middleware::{ExceptionOutcome, MiddlewareChain, RequestOutcome, ResponseOutcome};
use crate::slot::SlotManager;
use crate::transport::TransportRegistry;

/// What a caller (the scheduler, per spec.md §4.6) should do with the
/// result of a dispatch.
pub enum DownloadOutcome {
    Delivered(Response),
    /// Re-enqueue this request; a retry consumed it, or the chain yielded a
    /// replacement request entirely.
    Reenqueue(Request),
    Failed(DownloadError),
}

pub struct Downloader {
    /// Process-wide ceiling, acquired before the per-domain slot (spec.md
    /// §4.4/§5: "`CONCURRENT_REQUESTS` is enforced by a process-wide
    /// counting semaphore acquired before the per-domain one").
    concurrency: Arc<Semaphore>,
    slots: SlotManager,
    chain: MiddlewareChain,
    transports: TransportRegistry,
    proxy_pool: Option<Arc<dyn ProxyPool>>,
    /// Response statuses that do not count against a proxy (spec.md §4.3:
    /// default `{404}`). Any other status, or a transport exception,
    /// invalidates the proxy that was used for the attempt.
    proxy_allow_status_code: HashSet<u16>,
    download_delay: Duration,
    randomize_delay: bool,
    download_timeout: Duration,
}

impl Downloader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        concurrent_requests: usize,
        slots: SlotManager,
        chain: MiddlewareChain,
        transports: TransportRegistry,
        proxy_pool: Option<Arc<dyn ProxyPool>>,
        proxy_allow_status_code: HashSet<u16>,
        download_delay: Duration,
        randomize_delay: bool,
        download_timeout: Duration,
    ) -> Self {
        Self {
            concurrency: Arc::new(Semaphore::new(concurrent_requests)),
            slots,
            chain,
            transports,
            proxy_pool,
            proxy_allow_status_code,
            download_delay,
            randomize_delay,
            download_timeout,
        }
    }

    /// Number of dispatch permits currently available, for idle detection
    /// and stats.
    pub fn available_permits(&self) -> usize {
        self.concurrency.available_permits()
    }

    pub fn evict_idle_slots(&self) {
        self.slots.evict_idle();
    }

    pub async fn close(&self) {
        self.transports.close_all().await;
    }

    /// Runs the full request -> middleware -> transport -> middleware ->
    /// response pipeline for one request (spec.md §4.4).
    pub async fn dispatch(&self, request: Request) -> DownloadOutcome {
        match self.chain.process_request(&request).await {
            RequestOutcome::Continue => self.dispatch_through_transport(request).await,
            RequestOutcome::ShortCircuitResponse(response) => self.finish_response(response).await,
            // spec.md §4.4: `process_request -> Request` means "cancel the
            // current request; re-enqueue the returned one", the same
            // re-enqueue language as `process_response`/`process_exception
            // -> Request". Dispatching the replacement inline here would
            // skip the priority queue and break priority ordering.
            RequestOutcome::ShortCircuitRequest(replacement) => DownloadOutcome::Reenqueue(replacement),
        }
    }

    async fn dispatch_through_transport(&self, request: Request) -> DownloadOutcome {
        let domain = match request.url.host_str() {
            Some(host) => host.to_string(),
            None => {
                return DownloadOutcome::Failed(DownloadError::Transport(format!(
                    "request URL has no host: {}",
                    request.url
                )))
            }
        };

        let _global_permit = Arc::clone(&self.concurrency)
            .acquire_owned()
            .await
            .expect("concurrency semaphore closed");

        let slot = self.slots.slot_for(&domain);
        let _slot_permit = slot.acquire(self.download_delay, self.randomize_delay).await;

        let proxy = match &request.meta.proxy {
            Some(explicit) => Some(explicit.clone()),
            None => match &self.proxy_pool {
                Some(pool) => pool.get().await,
                None => None,
            },
        };

        let timeout = match request.meta.timeout {
            Some(requested) => requested.min(self.download_timeout),
            None => self.download_timeout,
        };

        let transport = match self.transports.get(request.url.scheme()) {
            Some(t) => t,
            None => {
                return DownloadOutcome::Failed(DownloadError::UnknownScheme(
                    request.url.scheme().to_string(),
                ))
            }
        };

        match tokio::time::timeout(timeout, transport.fetch(&request, proxy.as_deref(), timeout)).await {
            Ok(Ok(response)) => {
                let status = response.status;
                let outcome = self.finish_response(response).await;
                self.invalidate_proxy_if_needed(proxy, Some(status)).await;
                outcome
            }
            Ok(Err(error)) => {
                let outcome = self.finish_exception(&request, error).await;
                self.invalidate_proxy_if_needed(proxy, None).await;
                outcome
            }
            Err(_) => {
                let outcome = self.finish_exception(&request, DownloadError::Timeout(timeout)).await;
                self.invalidate_proxy_if_needed(proxy, None).await;
                outcome
            }
        }
    }

    /// Applies spec.md §4.3's invalidation rule: a status outside
    /// `proxy_allow_status_code`, or any transport exception (`status` is
    /// `None`), removes the proxy that was used for this attempt from both
    /// the in-process cache and the upstream source.
    async fn invalidate_proxy_if_needed(&self, proxy: Option<String>, status: Option<u16>) {
        let (Some(proxy), Some(pool)) = (proxy, &self.proxy_pool) else {
            return;
        };
        match status {
            Some(status) if self.proxy_allow_status_code.contains(&status) => {}
            Some(status) => pool.invalidate(&proxy, InvalidationReason::DisallowedStatus(status)).await,
            None => pool.invalidate(&proxy, InvalidationReason::TransportException).await,
        }
    }

    async fn finish_response(&self, response: Response) -> DownloadOutcome {
        match self.chain.process_response(response).await {
            ResponseOutcome::Continue(response) => DownloadOutcome::Delivered(response),
            ResponseOutcome::Retry(request) => DownloadOutcome::Reenqueue(request),
            ResponseOutcome::Fail(error) => DownloadOutcome::Failed(error),
        }
    }

    async fn finish_exception(&self, request: &Request, error: DownloadError) -> DownloadOutcome {
        match self.chain.process_exception(request, error).await {
            ExceptionOutcome::Recover(response) => DownloadOutcome::Delivered(response),
            ExceptionOutcome::Retry(request) => DownloadOutcome::Reenqueue(request),
            ExceptionOutcome::Propagate(error) => DownloadOutcome::Failed(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::RequestOutcome;
    use crate::retry::RetryMiddleware;
    use crate::transport::testing::{FixedTransport, ScriptedTransport};
    use async_trait::async_trait;
    use bytes::Bytes;
    use engine_proxypool::{InvalidationReason, ProxyPool};
    use std::sync::Mutex as StdMutex;

    /// Always hands out `proxy`, and records every `invalidate` call instead
    /// of talking to a real upstream source.
    struct RecordingProxyPool {
        proxy: String,
        invalidations: StdMutex<Vec<InvalidationReason>>,
    }

    impl RecordingProxyPool {
        fn new(proxy: &str) -> Self {
            Self {
                proxy: proxy.to_string(),
                invalidations: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProxyPool for RecordingProxyPool {
        async fn get(&self) -> Option<String> {
            Some(self.proxy.clone())
        }

        async fn invalidate(&self, proxy_url: &str, reason: InvalidationReason) {
            assert_eq!(proxy_url, self.proxy);
            self.invalidations.lock().unwrap().push(reason);
        }

        async fn refill(&self) -> Result<(), engine_protocol::error::ProxyError> {
            Ok(())
        }
    }

    fn sample_request() -> Request {
        Request::new(url::Url::parse("https://example.com/").unwrap(), 0).build()
    }

    struct ReplacingMiddleware;

    #[async_trait]
    impl crate::middleware::DownloaderMiddleware for ReplacingMiddleware {
        async fn process_request(&self, request: &Request) -> RequestOutcome {
            let replacement = request.child(url::Url::parse("https://example.com/replacement").unwrap(), 0).build();
            RequestOutcome::ShortCircuitRequest(replacement)
        }
    }

    #[tokio::test]
    async fn request_short_circuit_reenqueues_instead_of_dispatching_inline() {
        // No transport is registered at all: if the replacement were
        // dispatched inline instead of re-enqueued, this would surface as
        // an unknown-scheme failure rather than a `Reenqueue`.
        let mut chain = MiddlewareChain::new();
        chain.push(Box::new(ReplacingMiddleware));
        let downloader = Downloader::new(
            16,
            SlotManager::new(1, Duration::from_secs(60)),
            chain,
            TransportRegistry::new(),
            None,
            HashSet::new(),
            Duration::ZERO,
            false,
            Duration::from_secs(5),
        );

        match downloader.dispatch(sample_request()).await {
            DownloadOutcome::Reenqueue(request) => {
                assert_eq!(request.url.path(), "/replacement");
            }
            _ => panic!("expected the replacement to be re-enqueued, not dispatched inline"),
        }
    }

    #[tokio::test]
    async fn successful_fetch_is_delivered() {
        let mut transports = TransportRegistry::new();
        transports.register(
            "https",
            Box::new(FixedTransport {
                status: 200,
                body: Bytes::from_static(b"hello"),
            }),
        );
        let downloader = Downloader::new(
            16,
            SlotManager::new(1, Duration::from_secs(60)),
            MiddlewareChain::new(),
            transports,
            None,
            HashSet::new(),
            Duration::ZERO,
            false,
            Duration::from_secs(5),
        );

        match downloader.dispatch(sample_request()).await {
            DownloadOutcome::Delivered(response) => assert_eq!(response.status, 200),
            _ => panic!("expected delivery"),
        }
    }

    #[tokio::test]
    async fn retryable_status_is_reenqueued_with_incremented_retry_count() {
        let mut transports = TransportRegistry::new();
        transports.register(
            "https",
            Box::new(ScriptedTransport::new(vec![Ok((503, Bytes::new()))])),
        );
        let mut chain = MiddlewareChain::new();
        chain.push(Box::new(RetryMiddleware::new([503].into_iter().collect(), 2, -1)));
        let downloader = Downloader::new(
            16,
            SlotManager::new(1, Duration::from_secs(60)),
            chain,
            transports,
            None,
            HashSet::new(),
            Duration::ZERO,
            false,
            Duration::from_secs(5),
        );

        match downloader.dispatch(sample_request()).await {
            DownloadOutcome::Reenqueue(request) => assert_eq!(request.meta.retry_count, 1),
            _ => panic!("expected reenqueue"),
        }
    }

    #[tokio::test]
    async fn exhausted_retry_budget_surfaces_as_terminal_failure() {
        let mut transports = TransportRegistry::new();
        transports.register(
            "https",
            Box::new(ScriptedTransport::new(vec![Ok((503, Bytes::new()))])),
        );
        let mut chain = MiddlewareChain::new();
        chain.push(Box::new(RetryMiddleware::new([503].into_iter().collect(), 0, -1)));
        let downloader = Downloader::new(
            16,
            SlotManager::new(1, Duration::from_secs(60)),
            chain,
            transports,
            None,
            HashSet::new(),
            Duration::ZERO,
            false,
            Duration::from_secs(5),
        );

        match downloader.dispatch(sample_request()).await {
            DownloadOutcome::Failed(DownloadError::RetryBudgetExhausted(0)) => {}
            _ => panic!("expected a terminal failure once the retry budget is exhausted"),
        }
    }

    #[tokio::test]
    async fn unknown_scheme_fails_without_touching_slots() {
        let downloader = Downloader::new(
            16,
            SlotManager::new(1, Duration::from_secs(60)),
            MiddlewareChain::new(),
            TransportRegistry::new(),
            None,
            HashSet::new(),
            Duration::ZERO,
            false,
            Duration::from_secs(5),
        );

        match downloader.dispatch(sample_request()).await {
            DownloadOutcome::Failed(DownloadError::UnknownScheme(scheme)) => assert_eq!(scheme, "https"),
            _ => panic!("expected unknown scheme failure"),
        }
    }

    #[tokio::test]
    async fn disallowed_status_invalidates_the_proxy() {
        let mut transports = TransportRegistry::new();
        transports.register(
            "https",
            Box::new(FixedTransport {
                status: 500,
                body: Bytes::new(),
            }),
        );
        let pool = Arc::new(RecordingProxyPool::new("proxy-1"));
        let downloader = Downloader::new(
            16,
            SlotManager::new(1, Duration::from_secs(60)),
            MiddlewareChain::new(),
            transports,
            Some(pool.clone() as Arc<dyn ProxyPool>),
            [404].into_iter().collect(),
            Duration::ZERO,
            false,
            Duration::from_secs(5),
        );

        downloader.dispatch(sample_request()).await;

        assert_eq!(
            *pool.invalidations.lock().unwrap(),
            vec![InvalidationReason::DisallowedStatus(500)]
        );
    }

    #[tokio::test]
    async fn allowed_status_keeps_the_proxy() {
        let mut transports = TransportRegistry::new();
        transports.register(
            "https",
            Box::new(FixedTransport {
                status: 404,
                body: Bytes::new(),
            }),
        );
        let pool = Arc::new(RecordingProxyPool::new("proxy-1"));
        let downloader = Downloader::new(
            16,
            SlotManager::new(1, Duration::from_secs(60)),
            MiddlewareChain::new(),
            transports,
            Some(pool.clone() as Arc<dyn ProxyPool>),
            [404].into_iter().collect(),
            Duration::ZERO,
            false,
            Duration::from_secs(5),
        );

        downloader.dispatch(sample_request()).await;

        assert!(pool.invalidations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_exception_invalidates_the_proxy() {
        let mut transports = TransportRegistry::new();
        transports.register(
            "https",
            Box::new(ScriptedTransport::new(vec![Err("boom".to_string())])),
        );
        let pool = Arc::new(RecordingProxyPool::new("proxy-1"));
        let downloader = Downloader::new(
            16,
            SlotManager::new(1, Duration::from_secs(60)),
            MiddlewareChain::new(),
            transports,
            Some(pool.clone() as Arc<dyn ProxyPool>),
            HashSet::new(),
            Duration::ZERO,
            false,
            Duration::from_secs(5),
        );

        downloader.dispatch(sample_request()).await;

        assert_eq!(
            *pool.invalidations.lock().unwrap(),
            vec![InvalidationReason::TransportException]
        );
    }
}
