//! Shared error taxonomy for the engine core.
//!
//! Library crates return these `thiserror` enums rather than `anyhow::Error`;
//! `anyhow` is reserved for binaries and top-level test harnesses.

use thiserror::Error;

/// Errors raised by a [`crate::filter::FingerprintFilter`] implementation.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("fingerprint backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("fingerprint backend returned a malformed entry: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a `RequestQueue` implementation.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("failed to serialize request: {0}")]
    Serialize(String),

    #[error("failed to deserialize request: {0}")]
    Deserialize(String),

    #[error("unknown callback reference: {0}")]
    UnknownCallback(String),

    #[error("queue is closed")]
    Closed,
}

/// Errors raised by a `ProxyPool` implementation.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("no proxies available")]
    Exhausted,
}

/// Errors raised while dispatching a request through the downloader.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("no transport registered for scheme {0:?}")]
    UnknownScheme(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("proxy error: {0}")]
    Proxy(#[from] ProxyError),

    #[error("retry budget exhausted after {0} attempts")]
    RetryBudgetExhausted(u32),
}

/// Errors raised while invoking spider middleware or a parser.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("parser callback failed: {0}")]
    Parser(String),

    #[error("spider middleware failed: {0}")]
    Middleware(String),

    /// A download never produced a response at all (timeout, unknown
    /// scheme, exhausted retry budget, ...). Surfaced through the same
    /// errback path as a parser/middleware exception (spec.md §4.5: "on
    /// parser exception, the errback is invoked with (request, exception)";
    /// §7: "surface to errback" for a permanent download failure).
    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// Errors raised by the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Top-level engine error, composing every component error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Scraper(#[from] ScraperError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("configuration invalid: {0}")]
    Configuration(String),

    #[error("engine resource exhausted: {0}")]
    ResourceExhausted(String),
}
