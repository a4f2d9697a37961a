//! Downloader middleware chain (spec.md §4.4).
//!
//! Mirrors the teacher's layered-hook shape in
//! `casparian_worker::pipeline::Stage` (pre/post hooks threaded around a
//! central dispatch), generalized from a fixed ETL stage list to an
//! ordered, pluggable chain of request/response/exception hooks.

use async_trait::async_trait;
use engine_protocol::error::DownloadError;
use engine_protocol::request::Request;
use engine_protocol::response::Response;

/// Outcome of [`DownloaderMiddleware::process_request`] (spec.md §4.4 table):
/// - `None` => continue the chain, eventually dispatching to the transport.
/// - `ShortCircuitResponse` => skip the transport and any remaining
///   `process_request` hooks; the response enters the chain's
///   `process_response` phase as if it came back over the wire.
/// - `ShortCircuitRequest` => abandon this request and re-enqueue the
///   replacement instead, same as a `process_response`/`process_exception`
///   `Retry` (spec.md §4.4: priority preserved unless the middleware set a
///   new one).
pub enum RequestOutcome {
    Continue,
    ShortCircuitResponse(Response),
    ShortCircuitRequest(Request),
}

/// Outcome of [`DownloaderMiddleware::process_response`] (spec.md §4.4 table):
/// - `Continue` => pass the (possibly modified) response further down the
///   chain, or to the caller if this was the last middleware.
/// - `Retry` => abandon this response and re-dispatch the given request.
/// - `Fail` => treat this response as a terminal failure (spec.md §4.4:
///   "beyond the [retry] budget, surface as a terminal failure").
pub enum ResponseOutcome {
    Continue(Response),
    Retry(Request),
    Fail(DownloadError),
}

/// Outcome of [`DownloaderMiddleware::process_exception`] (spec.md §4.4
/// table):
/// - `Propagate` => pass the error to the next middleware's
///   `process_exception`, or fail the dispatch if this was the last one.
/// - `Recover` => treat the exception as resolved by the given response.
/// - `Retry` => treat the exception as resolved by re-dispatching the
///   given request.
pub enum ExceptionOutcome {
    Propagate(DownloadError),
    Recover(Response),
    Retry(Request),
}

#[async_trait]
pub trait DownloaderMiddleware: Send + Sync {
    async fn process_request(&self, request: &Request) -> RequestOutcome {
        let _ = request;
        RequestOutcome::Continue
    }

    async fn process_response(&self, response: Response) -> ResponseOutcome {
        ResponseOutcome::Continue(response)
    }

    async fn process_exception(&self, request: &Request, error: DownloadError) -> ExceptionOutcome {
        let _ = request;
        ExceptionOutcome::Propagate(error)
    }
}

/// An ordered chain of [`DownloaderMiddleware`]s, applied outside-in on the
/// way to the transport and inside-out on the way back (spec.md §4.4:
/// "request hooks run in registration order; response and exception hooks
/// run in reverse order").
#[derive(Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Box<dyn DownloaderMiddleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    pub fn push(&mut self, middleware: Box<dyn DownloaderMiddleware>) {
        self.middlewares.push(middleware);
    }

    /// Runs `process_request` in order, stopping at the first short-circuit.
    pub async fn process_request(&self, request: &Request) -> RequestOutcome {
        for middleware in &self.middlewares {
            match middleware.process_request(request).await {
                RequestOutcome::Continue => continue,
                other => return other,
            }
        }
        RequestOutcome::Continue
    }

    /// Runs `process_response` in reverse registration order.
    pub async fn process_response(&self, mut response: Response) -> ResponseOutcome {
        for middleware in self.middlewares.iter().rev() {
            match middleware.process_response(response).await {
                ResponseOutcome::Continue(r) => response = r,
                terminal @ (ResponseOutcome::Retry(_) | ResponseOutcome::Fail(_)) => return terminal,
            }
        }
        ResponseOutcome::Continue(response)
    }

    /// Runs `process_exception` in reverse registration order, stopping at
    /// the first middleware that resolves the error.
    pub async fn process_exception(&self, request: &Request, mut error: DownloadError) -> ExceptionOutcome {
        for middleware in self.middlewares.iter().rev() {
            match middleware.process_exception(request, error).await {
                ExceptionOutcome::Propagate(e) => error = e,
                resolved => return resolved,
            }
        }
        ExceptionOutcome::Propagate(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use engine_protocol::headers::HeaderMap;
    use std::sync::Arc;

    fn sample_request() -> Request {
        Request::new(url::Url::parse("https://example.com/").unwrap(), 0).build()
    }

    fn sample_response(request: &Request, status: u16) -> Response {
        Response {
            url: request.url.clone(),
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            request: Arc::new(request.clone()),
            flags: Vec::new(),
            transport: Default::default(),
        }
    }

    struct TagHeaderMiddleware;

    #[async_trait]
    impl DownloaderMiddleware for TagHeaderMiddleware {
        async fn process_response(&self, mut response: Response) -> ResponseOutcome {
            response.flags.push("tagged".into());
            ResponseOutcome::Continue(response)
        }
    }

    struct ShortCircuitMiddleware;

    #[async_trait]
    impl DownloaderMiddleware for ShortCircuitMiddleware {
        async fn process_request(&self, request: &Request) -> RequestOutcome {
            RequestOutcome::ShortCircuitResponse(sample_response(request, 304))
        }
    }

    #[tokio::test]
    async fn response_hooks_run_and_mutate_in_reverse_order() {
        let mut chain = MiddlewareChain::new();
        chain.push(Box::new(TagHeaderMiddleware));
        let request = sample_request();
        let response = sample_response(&request, 200);

        match chain.process_response(response).await {
            ResponseOutcome::Continue(r) => assert_eq!(r.flags, vec!["tagged".to_string()]),
            _ => panic!("expected continue"),
        }
    }

    #[tokio::test]
    async fn request_short_circuit_skips_the_transport() {
        let mut chain = MiddlewareChain::new();
        chain.push(Box::new(ShortCircuitMiddleware));
        let request = sample_request();

        match chain.process_request(&request).await {
            RequestOutcome::ShortCircuitResponse(r) => assert_eq!(r.status, 304),
            _ => panic!("expected short-circuit response"),
        }
    }
}
