//! The engine heartbeat loop (spec.md §4.7). Structured the way the
//! teacher's `casparian_sentinel::Sentinel::run_with_shutdown_inner` stages
//! a single tick — receive/dispatch/cleanup phases run in a fixed order
//! each iteration — generalized from ZMQ job dispatch to request
//! refill/reap/route.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use engine_downloader::{DownloadOutcome, Downloader};
use engine_dupefilter::ReleaseReason;
use engine_protocol::error::DownloadError;
use engine_protocol::request::Request;
use engine_scheduler::Scheduler;
use engine_scraper::Scraper;
use tokio::task::JoinSet;

use crate::context::CrawlerContext;
use crate::pipeline::{Pipeline, PipelineOutcome};
use crate::signals::Signal;

/// Why the engine stopped (spec.md §4.7 "Close triggers").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    OperatorCancel,
    Idle,
    ClosespiderTimeout,
    ClosespiderItemcount,
    ClosespiderPagecount,
    ClosespiderErrorcount,
    FatalError(String),
}

impl FinishReason {
    pub fn label(&self) -> String {
        match self {
            FinishReason::OperatorCancel => "operator_cancel".to_string(),
            FinishReason::Idle => "finished".to_string(),
            FinishReason::ClosespiderTimeout => "closespider_timeout".to_string(),
            FinishReason::ClosespiderItemcount => "closespider_itemcount".to_string(),
            FinishReason::ClosespiderPagecount => "closespider_pagecount".to_string(),
            FinishReason::ClosespiderErrorcount => "closespider_errorcount".to_string(),
            FinishReason::FatalError(message) => format!("fatal_error: {message}"),
        }
    }
}

pub struct RunReport {
    pub finish_reason: String,
    pub stats: HashMap<String, u64>,
}

/// One request's outcome after a full download(+retry)/scrape round,
/// collected by a spawned task and reaped on the next tick.
struct TaskReport {
    produced_requests: Vec<Request>,
    produced_items: Vec<engine_protocol::item::Item>,
    depth_dropped: u64,
    terminal: Terminal,
}

enum Terminal {
    Delivered { url: String, status: u16 },
    Requeued,
    /// `origin` is the request as it was originally admitted to the
    /// fingerprint filter, carried along so a terminal failure can release
    /// it (spec.md §4.1/§7: "on failure, the fingerprint is removed ...
    /// so the request can re-enter").
    Failed { origin: Request, url: String, message: String, retry_exhausted: bool },
}

async fn run_one(downloader: Arc<Downloader>, scraper: Arc<Scraper>, request: Request) -> TaskReport {
    let origin = request.clone();
    match downloader.dispatch(request).await {
        DownloadOutcome::Delivered(response) => {
            let url = response.url.to_string();
            let status = response.status;
            match scraper.process_response(response).await {
                Ok(classified) => TaskReport {
                    produced_requests: classified.requests,
                    produced_items: classified.items,
                    depth_dropped: classified.depth_dropped,
                    terminal: Terminal::Delivered { url, status },
                },
                Err(error) => TaskReport {
                    produced_requests: Vec::new(),
                    produced_items: Vec::new(),
                    depth_dropped: 0,
                    terminal: Terminal::Failed {
                        origin,
                        url,
                        message: error.to_string(),
                        retry_exhausted: false,
                    },
                },
            }
        }
        DownloadOutcome::Reenqueue(request) => TaskReport {
            produced_requests: vec![request],
            produced_items: Vec::new(),
            depth_dropped: 0,
            terminal: Terminal::Requeued,
        },
        DownloadOutcome::Failed(error) => {
            let retry_exhausted = matches!(error, DownloadError::RetryBudgetExhausted(_));
            let url = origin.url.to_string();
            let message = error.to_string();
            // The download never produced a response, so the scraper's own
            // process_response/exception hooks never ran. Give the
            // request's errback the same shot at it a parser/middleware
            // exception would get (spec.md §3/§7: permanent failures must
            // surface to the errback).
            let recovered = scraper.process_download_failure(&origin, error.into()).await.ok();
            let (produced_requests, produced_items, depth_dropped) = match recovered {
                Some(classified) => (classified.requests, classified.items, classified.depth_dropped),
                None => (Vec::new(), Vec::new(), 0),
            };
            TaskReport {
                produced_requests,
                produced_items,
                depth_dropped,
                terminal: Terminal::Failed {
                    origin,
                    url,
                    message,
                    retry_exhausted,
                },
            }
        }
    }
}

pub struct Engine {
    ctx: CrawlerContext,
    scheduler: Arc<Scheduler>,
    downloader: Arc<Downloader>,
    scraper: Arc<Scraper>,
    pipelines: Vec<Arc<dyn Pipeline>>,
}

impl Engine {
    pub fn new(
        ctx: CrawlerContext,
        scheduler: Arc<Scheduler>,
        downloader: Arc<Downloader>,
        scraper: Arc<Scraper>,
        pipelines: Vec<Arc<dyn Pipeline>>,
    ) -> Self {
        Self {
            ctx,
            scheduler,
            downloader,
            scraper,
            pipelines,
        }
    }

    pub fn context(&self) -> &CrawlerContext {
        &self.ctx
    }

    /// Runs the engine to completion: seeds the scheduler with `seeds`,
    /// then ticks the heartbeat loop until a close trigger fires, then
    /// shuts down gracefully (spec.md §4.7).
    pub async fn run(&self, seeds: Vec<Request>) -> RunReport {
        self.ctx.signals.dispatch(Signal::EngineStarted).await;
        self.ctx.signals.dispatch(Signal::SpiderOpened).await;
        for pipeline in &self.pipelines {
            pipeline.open().await;
        }

        for seed in seeds {
            let url = seed.url.to_string();
            match self.scheduler.enqueue(seed).await {
                Ok(true) => {}
                Ok(false) => {
                    self.ctx
                        .signals
                        .dispatch(Signal::RequestDropped { url, reason: "duplicate".to_string() })
                        .await;
                }
                Err(error) => tracing::error!(%error, "failed to enqueue seed request"),
            }
        }

        let started_at = Instant::now();
        let mut tasks: JoinSet<TaskReport> = JoinSet::new();
        let mut idle_ticks: u32 = 0;

        let finish_reason = loop {
            self.refill(&mut tasks).await;
            self.reap(&mut tasks).await;
            self.downloader.evict_idle_slots();

            if let Some(reason) = self.quota_trigger(started_at) {
                break reason;
            }

            let has_pending = self.scheduler.has_pending().await.unwrap_or(true);
            let idle_now = !has_pending && tasks.len() == 0;
            if idle_now {
                if idle_ticks == 0 {
                    self.ctx.signals.dispatch(Signal::SpiderIdle).await;
                }
                idle_ticks += 1;
                if self.ctx.settings.close_spider_on_idle && idle_ticks > 1 {
                    break FinishReason::Idle;
                }
            } else {
                idle_ticks = 0;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.ctx.settings.heartbeat_tick) => {}
                _ = self.ctx.cancel.cancelled() => break FinishReason::OperatorCancel,
            }
        };

        self.shutdown(tasks).await;
        self.ctx.signals.dispatch(Signal::SpiderClosed { reason: finish_reason.label() }).await;
        self.ctx.signals.dispatch(Signal::EngineStopped).await;

        RunReport {
            finish_reason: finish_reason.label(),
            stats: self.ctx.stats.snapshot(),
        }
    }

    /// Step 1: refill the in-flight pool from the scheduler up to
    /// `CONCURRENT_REQUESTS` (the per-domain/global admission itself is the
    /// downloader's job — see `engine_downloader::Downloader::dispatch`).
    async fn refill(&self, tasks: &mut JoinSet<TaskReport>) {
        while tasks.len() < self.ctx.settings.concurrent_requests {
            if self.ctx.cancel.is_cancelled() {
                return;
            }
            match self.scheduler.next().await {
                Ok(Some(request)) => {
                    self.ctx.stats.increment("request_scheduled");
                    self.ctx
                        .signals
                        .dispatch(Signal::RequestScheduled { url: request.url.to_string() })
                        .await;
                    let downloader = self.downloader.clone();
                    let scraper = self.scraper.clone();
                    tasks.spawn(run_one(downloader, scraper, request));
                }
                Ok(None) => return,
                Err(error) => {
                    tracing::error!(%error, "scheduler error during refill");
                    return;
                }
            }
        }
    }

    /// Steps 2 & 3: reap completed download/scrape tasks and route their
    /// outputs (requests back to the scheduler, items through pipelines).
    async fn reap(&self, tasks: &mut JoinSet<TaskReport>) {
        while let Some(joined) = tasks.try_join_next() {
            match joined {
                Ok(report) => self.route(report).await,
                Err(join_error) => {
                    tracing::error!(%join_error, "download/scrape task panicked");
                    self.ctx.stats.increment("spider_error");
                }
            }
        }
    }

    async fn route(&self, report: TaskReport) {
        match report.terminal {
            Terminal::Delivered { url, status } => {
                self.ctx.stats.increment("response_received");
                self.ctx.signals.dispatch(Signal::ResponseReceived { url: url.clone(), status }).await;
                self.ctx.signals.dispatch(Signal::ResponseDownloaded { url, status }).await;
            }
            Terminal::Requeued => {
                for request in &report.produced_requests {
                    if let Err(error) = self.scheduler.requeue(request.clone()).await {
                        tracing::error!(%error, "failed to requeue retried request");
                    }
                }
                return;
            }
            Terminal::Failed { origin, url, message, retry_exhausted } => {
                self.ctx.stats.increment("spider_error");
                if retry_exhausted {
                    self.ctx.stats.increment("retry/max_reached");
                }
                self.scheduler.release(&origin, ReleaseReason::RequestFailed).await;
                self.ctx.signals.dispatch(Signal::SpiderError { url, message }).await;
            }
        }

        for request in report.produced_requests {
            match self.scheduler.enqueue(request.clone()).await {
                Ok(true) => {}
                Ok(false) => {
                    self.ctx.signals
                        .dispatch(Signal::RequestDropped { url: request.url.to_string(), reason: "duplicate".to_string() })
                        .await;
                }
                Err(error) => tracing::error!(%error, "failed to enqueue scraped request"),
            }
        }

        if report.depth_dropped > 0 {
            self.ctx.stats.increment_by("scraper/depth_dropped", report.depth_dropped);
        }

        for item in report.produced_items {
            self.route_item(item).await;
        }
    }

    async fn route_item(&self, item: engine_protocol::item::Item) {
        let mut current = item;
        for pipeline in &self.pipelines {
            match pipeline.process_item(current).await {
                PipelineOutcome::Keep(kept) => current = kept,
                PipelineOutcome::Drop(reason) => {
                    self.ctx.stats.increment("item_dropped");
                    self.ctx.signals.dispatch(Signal::ItemDropped { reason }).await;
                    return;
                }
            }
        }
        self.ctx.stats.increment("item_scraped");
        self.ctx.signals.dispatch(Signal::ItemScraped).await;
    }

    /// Step 4's count-based close triggers (idle is handled inline in
    /// `run`, since it needs the in-flight task count the caller already
    /// has in scope).
    fn quota_trigger(&self, started_at: Instant) -> Option<FinishReason> {
        let settings = &self.ctx.settings;
        if settings.closespider_timeout > 0 && started_at.elapsed().as_secs() >= settings.closespider_timeout {
            return Some(FinishReason::ClosespiderTimeout);
        }
        if settings.closespider_itemcount > 0 && self.ctx.stats.get("item_scraped") >= settings.closespider_itemcount {
            return Some(FinishReason::ClosespiderItemcount);
        }
        if settings.closespider_pagecount > 0 && self.ctx.stats.get("response_received") >= settings.closespider_pagecount {
            return Some(FinishReason::ClosespiderPagecount);
        }
        if settings.closespider_errorcount > 0 && self.ctx.stats.get("spider_error") >= settings.closespider_errorcount {
            return Some(FinishReason::ClosespiderErrorcount);
        }
        None
    }

    /// Graceful shutdown (spec.md §4.7): stop accepting new pops (the loop
    /// has already exited), drain in-flight tasks with a deadline, flush
    /// pipelines, close transport/queue/filter/proxy.
    async fn shutdown(&self, mut tasks: JoinSet<TaskReport>) {
        let drained = tokio::time::timeout(self.ctx.settings.graceful_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Ok(report) = joined {
                    self.route(report).await;
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = tasks.len(),
                "graceful_timeout elapsed with in-flight tasks still running; abandoning them"
            );
            tasks.abort_all();
        }

        for pipeline in &self.pipelines {
            pipeline.close().await;
        }
        self.downloader.close().await;
        if let Err(error) = self.scheduler.close().await {
            tracing::error!(%error, "error closing scheduler");
        }
    }
}
