//! Named-event dispatcher (spec.md §4.7): a typed pub/sub keyed by signal
//! kind, replacing the source system's stringly-typed dispatcher (spec.md
//! §9's "global singletons" redesign flag — this is owned by
//! `CrawlerContext`, not a process-wide static).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

/// The full named-event list from spec.md §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    EngineStarted,
    SpiderOpened,
    RequestScheduled,
    RequestDropped,
    ResponseReceived,
    ResponseDownloaded,
    ItemScraped,
    ItemDropped,
    SpiderError,
    SpiderIdle,
    SpiderClosed,
    EngineStopped,
}

/// A signal occurrence, carrying whatever payload its kind needs.
#[derive(Debug, Clone)]
pub enum Signal {
    EngineStarted,
    SpiderOpened,
    RequestScheduled { url: String },
    RequestDropped { url: String, reason: String },
    ResponseReceived { url: String, status: u16 },
    ResponseDownloaded { url: String, status: u16 },
    ItemScraped,
    ItemDropped { reason: String },
    SpiderError { url: String, message: String },
    SpiderIdle,
    SpiderClosed { reason: String },
    EngineStopped,
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::EngineStarted => SignalKind::EngineStarted,
            Signal::SpiderOpened => SignalKind::SpiderOpened,
            Signal::RequestScheduled { .. } => SignalKind::RequestScheduled,
            Signal::RequestDropped { .. } => SignalKind::RequestDropped,
            Signal::ResponseReceived { .. } => SignalKind::ResponseReceived,
            Signal::ResponseDownloaded { .. } => SignalKind::ResponseDownloaded,
            Signal::ItemScraped => SignalKind::ItemScraped,
            Signal::ItemDropped { .. } => SignalKind::ItemDropped,
            Signal::SpiderError { .. } => SignalKind::SpiderError,
            Signal::SpiderIdle => SignalKind::SpiderIdle,
            Signal::SpiderClosed { .. } => SignalKind::SpiderClosed,
            Signal::EngineStopped => SignalKind::EngineStopped,
        }
    }
}

#[derive(Debug, Error)]
#[error("signal handler failed: {0}")]
pub struct SignalError(pub String);

#[async_trait]
pub trait SignalHandler: Send + Sync {
    async fn handle(&self, signal: &Signal) -> Result<(), SignalError>;
}

/// Dispatches signals to handlers subscribed to that signal's kind.
/// Handlers run sequentially in subscription order; a handler's error is
/// logged and never aborts the loop or later handlers (spec.md §4.7:
/// "handler exceptions are logged and do not abort the loop").
#[derive(Default)]
pub struct SignalBus {
    handlers: Mutex<HashMap<SignalKind, Vec<Arc<dyn SignalHandler>>>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: SignalKind, handler: Arc<dyn SignalHandler>) {
        self.handlers
            .lock()
            .expect("signal bus lock poisoned")
            .entry(kind)
            .or_default()
            .push(handler);
    }

    pub async fn dispatch(&self, signal: Signal) {
        let handlers = {
            let guard = self.handlers.lock().expect("signal bus lock poisoned");
            guard.get(&signal.kind()).cloned().unwrap_or_default()
        };
        for handler in handlers {
            if let Err(error) = handler.handle(&signal).await {
                tracing::warn!(kind = ?signal.kind(), %error, "signal handler failed");
            }
        }
    }
}
