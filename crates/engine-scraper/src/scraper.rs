//! Scraper component (spec.md §4.5): wraps a downloader outcome in
//! spider-middleware processing and parser invocation.

use engine_protocol::error::ScraperError;
use engine_protocol::registry::ComponentRegistry;
use engine_protocol::request::Request;
use engine_protocol::response::Response;
use futures::StreamExt;

use crate::classify::{classify, ClassifiedOutputs};
use crate::errback::Errback;
use crate::middleware::SpiderMiddlewareChain;
use crate::parser::{ParseOutput, Parser};

/// Name a request's `callback` resolves to when unset, i.e. the spider's
/// default parser (spec.md §4.5: "the request's `callback` (or the
/// spider's default `parse`)").
pub const DEFAULT_CALLBACK: &str = "parse";

pub struct Scraper {
    parsers: ComponentRegistry<dyn Parser>,
    errbacks: ComponentRegistry<dyn Errback>,
    middleware: SpiderMiddlewareChain,
    depth_limit: u32,
}

impl Scraper {
    pub fn new(
        parsers: ComponentRegistry<dyn Parser>,
        errbacks: ComponentRegistry<dyn Errback>,
        middleware: SpiderMiddlewareChain,
        depth_limit: u32,
    ) -> Self {
        Self {
            parsers,
            errbacks,
            middleware,
            depth_limit,
        }
    }

    /// Runs a successfully-downloaded response through the full scrape
    /// pipeline, producing classified requests/items.
    pub async fn process_response(&self, response: Response) -> Result<ClassifiedOutputs, ScraperError> {
        if let Err(error) = self.middleware.process_input(&response) {
            return self.recover_or_propagate(&response, error).await;
        }

        let callback_name = response
            .request
            .callback
            .clone()
            .unwrap_or_else(|| DEFAULT_CALLBACK.to_string());
        let parser = self
            .parsers
            .build(&callback_name)
            .ok_or_else(|| ScraperError::Parser(format!("no parser registered for callback {callback_name:?}")))?;

        let outputs = parser.call(response.clone()).collect::<Vec<_>>().await;
        let outputs = self.middleware.process_output(&response, outputs);
        Ok(classify(outputs, self.depth_limit))
    }

    /// Invokes the request's `errback` (if any), falling back to the spider
    /// middleware chain's exception hooks (spec.md §4.5: "on parser
    /// exception, the errback is invoked with (request, exception)").
    pub async fn process_download_failure(
        &self,
        request: &Request,
        error: ScraperError,
    ) -> Result<ClassifiedOutputs, ScraperError> {
        if let Some(errback_name) = &request.errback {
            if let Some(errback) = self.errbacks.build(errback_name) {
                let outputs = errback.call(request, &error).await;
                return Ok(classify(outputs, self.depth_limit));
            }
        }
        Err(error)
    }

    async fn recover_or_propagate(
        &self,
        response: &Response,
        error: ScraperError,
    ) -> Result<ClassifiedOutputs, ScraperError> {
        if let Some(outputs) = self.middleware.process_exception(response, &error) {
            return Ok(classify(outputs, self.depth_limit));
        }
        self.process_download_failure(&response.request, error).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_protocol::headers::HeaderMap;
    use engine_protocol::item::Item;
    use futures::stream::{self, BoxStream};
    use std::sync::Arc;

    struct EchoParser;

    impl Parser for EchoParser {
        fn call(&self, response: Response) -> BoxStream<'static, ParseOutput> {
            let child = response
                .request
                .child(url::Url::parse("https://example.com/child").unwrap(), 1)
                .build();
            stream::iter(vec![
                ParseOutput::Item(Item::new().set("status", response.status as i64)),
                ParseOutput::Request(child),
            ])
            .boxed()
        }
    }

    struct FailingErrback;

    #[async_trait::async_trait]
    impl Errback for FailingErrback {
        async fn call(&self, _request: &Request, _error: &ScraperError) -> Vec<ParseOutput> {
            vec![ParseOutput::Item(Item::new().set("recovered", true))]
        }
    }

    fn sample_response(callback: Option<&str>, errback: Option<&str>) -> Response {
        let mut builder = Request::new(url::Url::parse("https://example.com/").unwrap(), 0);
        if let Some(cb) = callback {
            builder = builder.callback(cb);
        }
        if let Some(eb) = errback {
            builder = builder.errback(eb);
        }
        let request = builder.build();
        Response {
            url: request.url.clone(),
            status: 200,
            headers: HeaderMap::new(),
            body: bytes::Bytes::new(),
            request: Arc::new(request),
            flags: Vec::new(),
            transport: Default::default(),
        }
    }

    #[tokio::test]
    async fn classifies_parser_output_into_requests_and_items() {
        let mut parsers: ComponentRegistry<dyn Parser> = ComponentRegistry::new();
        parsers.register(DEFAULT_CALLBACK, || Arc::new(EchoParser));
        let scraper = Scraper::new(parsers, ComponentRegistry::new(), SpiderMiddlewareChain::new(), 0);

        let response = sample_response(None, None);
        let outputs = scraper.process_response(response).await.expect("parses");
        assert_eq!(outputs.items.len(), 1);
        assert_eq!(outputs.requests.len(), 1);
    }

    #[tokio::test]
    async fn unregistered_callback_surfaces_as_scraper_error() {
        let scraper = Scraper::new(
            ComponentRegistry::new(),
            ComponentRegistry::new(),
            SpiderMiddlewareChain::new(),
            0,
        );
        let response = sample_response(Some("missing"), None);
        assert!(scraper.process_response(response).await.is_err());
    }

    #[tokio::test]
    async fn errback_recovers_a_download_failure() {
        let mut errbacks: ComponentRegistry<dyn Errback> = ComponentRegistry::new();
        errbacks.register("on_error", || Arc::new(FailingErrback));
        let scraper = Scraper::new(ComponentRegistry::new(), errbacks, SpiderMiddlewareChain::new(), 0);

        let request = Request::new(url::Url::parse("https://example.com/").unwrap(), 0)
            .errback("on_error")
            .build();
        let outputs = scraper
            .process_download_failure(&request, ScraperError::Parser("boom".into()))
            .await
            .expect("errback recovers");
        assert_eq!(outputs.items.len(), 1);
    }
}
