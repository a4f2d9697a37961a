//! Builder-by-name resolution for the `*_CLASS`-style settings fields
//! (spec.md §9 redesign flag: "the source wires middleware/queues/pipelines
//! via string paths. Re-architect as a compile-time registry: an interface
//! per extension point with a builder-by-name table populated at startup").
//!
//! Only backends constructible without I/O are registered here: `memory`
//! for both the queue and the filter, plus `bloom` for the filter.
//! Backends that need a live connection (`SqliteQueue::open`,
//! `RedisQueue`, `AmqpQueue`, `RedisFilter`, `DiskFilter`) are built once by
//! the caller and inserted into the same registry under their name — a
//! closure that clones an already-built `Arc` is just as valid a builder as
//! one that constructs from scratch.

use std::sync::Arc;

use engine_dupefilter::bloom::{BloomFilter, MemoryBloomBackend};
use engine_dupefilter::memory::MemoryFilter;
use engine_dupefilter::FingerprintFilter;
use engine_protocol::error::EngineError;
use engine_protocol::registry::ComponentRegistry;
use engine_protocol::settings::{BloomFilterConfig, EngineSettings};
use engine_queue::memory::MemoryQueue;
use engine_queue::RequestQueue;

pub fn default_queue_registry() -> ComponentRegistry<dyn RequestQueue> {
    let mut registry = ComponentRegistry::new();
    registry.register("memory", || Arc::new(MemoryQueue::new()) as Arc<dyn RequestQueue>);
    registry
}

pub fn default_filter_registry() -> ComponentRegistry<dyn FingerprintFilter> {
    let mut registry = ComponentRegistry::new();
    registry.register("memory", || Arc::new(MemoryFilter::new()) as Arc<dyn FingerprintFilter>);
    registry.register("bloom", || {
        let config = BloomFilterConfig::default();
        let backend = MemoryBloomBackend::new(config.bits);
        Arc::new(BloomFilter::new(backend, config)) as Arc<dyn FingerprintFilter>
    });
    registry
}

/// Resolves `settings.scheduler_queue_class` against `registry` (spec.md
/// §4.2/§6, `SCHEDULER_QUEUE_CLASS`).
pub fn resolve_queue(
    settings: &EngineSettings,
    registry: &ComponentRegistry<dyn RequestQueue>,
) -> Result<Arc<dyn RequestQueue>, EngineError> {
    registry.build(&settings.scheduler_queue_class).ok_or_else(|| {
        EngineError::Configuration(format!(
            "no request queue registered for SCHEDULER_QUEUE_CLASS={:?}",
            settings.scheduler_queue_class
        ))
    })
}

/// Resolves `settings.dupefilter_class` against `registry` (spec.md
/// §4.1/§6, `DUPEFILTER_CLASS`).
pub fn resolve_filter(
    settings: &EngineSettings,
    registry: &ComponentRegistry<dyn FingerprintFilter>,
) -> Result<Arc<dyn FingerprintFilter>, EngineError> {
    registry.build(&settings.dupefilter_class).ok_or_else(|| {
        EngineError::Configuration(format!(
            "no fingerprint filter registered for DUPEFILTER_CLASS={:?}",
            settings.dupefilter_class
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registries_resolve_the_default_settings() {
        let settings = EngineSettings::default();
        let queues = default_queue_registry();
        let filters = default_filter_registry();

        assert!(resolve_queue(&settings, &queues).is_ok());
        assert!(resolve_filter(&settings, &filters).is_ok());
    }

    #[test]
    fn unregistered_class_is_a_configuration_error() {
        let mut settings = EngineSettings::default();
        settings.scheduler_queue_class = "sqlite".to_string();
        let queues = default_queue_registry();

        assert!(resolve_queue(&settings, &queues).is_err());
    }

    #[test]
    fn bloom_class_resolves_from_the_default_registry() {
        let mut settings = EngineSettings::default();
        settings.dupefilter_class = "bloom".to_string();
        let filters = default_filter_registry();

        assert!(resolve_filter(&settings, &filters).is_ok());
    }
}
