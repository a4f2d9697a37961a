//! `CrawlerContext` (spec.md §9 redesign flag): the explicit, passed-in
//! replacement for the source system's global singletons (database
//! manager, signal dispatcher). No process-wide mutable state lives
//! outside this struct.

use std::sync::Arc;

use engine_protocol::settings::EngineSettings;

use crate::cancel::CancelToken;
use crate::signals::SignalBus;
use crate::stats::StatsCollector;

pub struct CrawlerContext {
    pub settings: EngineSettings,
    pub stats: Arc<StatsCollector>,
    pub signals: Arc<SignalBus>,
    pub cancel: CancelToken,
}

impl CrawlerContext {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            stats: Arc::new(StatsCollector::new()),
            signals: Arc::new(SignalBus::new()),
            cancel: CancelToken::new(),
        }
    }
}
