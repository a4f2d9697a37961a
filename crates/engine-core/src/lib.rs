//! Engine component (spec.md §4.7): the heartbeat loop tying scheduler,
//! downloader, and scraper together, plus the ambient signal dispatcher,
//! stats collector, and crawler context (SPEC_FULL.md §4.7, §9).

pub mod builder;
pub mod cancel;
pub mod context;
pub mod engine;
pub mod pipeline;
pub mod signals;
pub mod stats;

pub use builder::{default_filter_registry, default_queue_registry, resolve_filter, resolve_queue};
pub use cancel::CancelToken;
pub use context::CrawlerContext;
pub use engine::{Engine, FinishReason, RunReport};
pub use pipeline::{DroppingPipeline, InMemoryPipeline, Pipeline, PipelineOutcome};
pub use signals::{Signal, SignalBus, SignalHandler, SignalKind};
pub use stats::StatsCollector;
