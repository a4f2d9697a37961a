use std::sync::Arc;
use std::time::Duration;

use engine_core::{CrawlerContext, Engine, InMemoryPipeline, Pipeline};
use engine_downloader::middleware::MiddlewareChain;
use engine_downloader::retry::RetryMiddleware;
use engine_downloader::slot::SlotManager;
use engine_downloader::transport::{Transport, TransportRegistry};
use engine_dupefilter::memory::MemoryFilter;
use engine_protocol::item::Item;
use engine_protocol::registry::ComponentRegistry;
use engine_protocol::response::Response;
use engine_protocol::settings::EngineSettings;
use engine_queue::memory::MemoryQueue;
use engine_scheduler::stats::SchedulerStats;
use engine_scheduler::Scheduler;
use engine_scraper::{Errback, ParseOutput, Parser, Scraper, SpiderMiddlewareChain};
use futures::stream::{self, BoxStream};
use futures::StreamExt;

/// A parser built from a plain closure, so each test can describe its
/// own page without a one-off named struct.
pub struct ClosureParser<F>(pub F);

impl<F> Parser for ClosureParser<F>
where
    F: Fn(&Response) -> Vec<ParseOutput> + Send + Sync + 'static,
{
    fn call(&self, response: Response) -> BoxStream<'static, ParseOutput> {
        let outputs = (self.0)(&response);
        stream::iter(outputs).boxed()
    }
}

pub fn single_item_parser() -> Arc<dyn Parser> {
    Arc::new(ClosureParser(|_response: &Response| {
        vec![ParseOutput::Item(Item::new().set("a", 1))]
    }))
}

pub struct Harness {
    pub engine: Engine,
    pub pipeline: Arc<InMemoryPipeline>,
}

/// Builds a fully wired `Engine` around an in-memory queue/filter, an
/// in-memory pipeline, and a caller-supplied transport + parser, the way a
/// test spider would be assembled by hand. Every test URL is `https://...`,
/// so only that scheme needs a registered transport.
pub fn build_harness(
    transport: Box<dyn Transport>,
    parser: Arc<dyn Parser>,
    configure: impl FnOnce(&mut EngineSettings),
) -> Harness {
    build_harness_with_errback(transport, parser, None, configure)
}

/// Same as [`build_harness`], but also registers `errback` under the given
/// name so a test can seed requests whose `errback` field names it.
pub fn build_harness_with_errback(
    transport: Box<dyn Transport>,
    parser: Arc<dyn Parser>,
    errback: Option<(&str, Arc<dyn Errback>)>,
    configure: impl FnOnce(&mut EngineSettings),
) -> Harness {
    let mut settings = EngineSettings::default();
    settings.randomize_download_delay = false;
    configure(&mut settings);

    let ctx = CrawlerContext::new(settings.clone());

    let queue = Arc::new(MemoryQueue::new());
    let filter = Arc::new(MemoryFilter::new());
    let scheduler_stats: Arc<dyn SchedulerStats> = ctx.stats.clone();
    let scheduler = Arc::new(Scheduler::new(queue, filter, scheduler_stats));

    let mut transports = TransportRegistry::new();
    transports.register("https", transport);

    let mut chain = MiddlewareChain::new();
    if settings.retry_enabled {
        chain.push(Box::new(RetryMiddleware::new(
            settings.retry_http_codes.clone(),
            settings.retry_times,
            settings.retry_priority_adjust,
        )));
    }

    let downloader = Arc::new(engine_downloader::Downloader::new(
        settings.concurrent_requests,
        SlotManager::new(settings.concurrent_requests_per_domain, Duration::from_secs(300)),
        chain,
        transports,
        None,
        settings.proxy_allow_status_code.clone(),
        settings.download_delay,
        settings.randomize_download_delay,
        settings.download_timeout,
    ));

    let mut parsers: ComponentRegistry<dyn Parser> = ComponentRegistry::new();
    parsers.register("parse", move || parser.clone());

    let mut errbacks: ComponentRegistry<dyn Errback> = ComponentRegistry::new();
    if let Some((name, errback)) = errback {
        errbacks.register(name.to_string(), move || errback.clone());
    }

    let scraper = Arc::new(Scraper::new(parsers, errbacks, SpiderMiddlewareChain::new(), settings.depth_limit));

    let pipeline = Arc::new(InMemoryPipeline::new());
    let pipelines: Vec<Arc<dyn Pipeline>> = vec![pipeline.clone() as Arc<dyn Pipeline>];
    let engine = Engine::new(ctx, scheduler, downloader, scraper, pipelines);

    Harness { engine, pipeline }
}

pub fn seed(url: &str, sequence: u64) -> engine_protocol::request::Request {
    engine_protocol::request::Request::new(url::Url::parse(url).unwrap(), sequence).build()
}

/// Delegates to a shared `Arc<T>` transport, so a test can keep its own
/// handle for post-run assertions (call counts, url order) after the
/// original is boxed away into the downloader's transport registry.
pub struct SharedTransport<T>(pub Arc<T>);

#[async_trait::async_trait]
impl<T: Transport> Transport for SharedTransport<T> {
    async fn fetch(
        &self,
        request: &engine_protocol::request::Request,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<Response, engine_protocol::error::DownloadError> {
        self.0.fetch(request, proxy, timeout).await
    }

    async fn close(&self) {
        self.0.close().await
    }
}
