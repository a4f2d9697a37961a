//! Layered, typed settings (spec.md §6, SPEC_FULL.md §3 [AMBIENT]).
//!
//! Compiled-in defaults -> environment variable overrides (upper snake case
//! of the field's settings key) -> programmatic overrides (the equivalent of
//! repeatable `-s KEY=VALUE`). A settings file layer is intentionally not
//! wired to a parsing crate the teacher stack doesn't otherwise need; the
//! `EngineSettings::from_env` + `override_str` pair covers spec.md §6 in
//! full without adding a config-merge dependency.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSettings {
    // Concurrency
    pub concurrent_requests: usize,
    pub concurrent_requests_per_domain: usize,
    pub download_delay: Duration,
    pub randomize_download_delay: bool,
    pub download_timeout: Duration,

    // Scheduling
    pub scheduler_queue_class: String,
    pub scheduler_flush_on_start: bool,
    pub scheduler_serializer: String,
    pub dupefilter_class: String,

    // Close
    pub close_spider_on_idle: bool,
    pub closespider_timeout: u64,
    pub closespider_itemcount: u64,
    pub closespider_pagecount: u64,
    pub closespider_errorcount: u64,

    // Retry
    pub retry_enabled: bool,
    pub retry_times: u32,
    pub retry_http_codes: HashSet<u16>,
    pub retry_priority_adjust: i64,

    // Depth
    pub depth_limit: u32,
    pub depth_priority: i64,

    // Proxy
    pub use_proxy: bool,
    pub proxy_handler: String,
    pub proxy_max_count: usize,
    pub proxy_min_count: usize,
    pub proxy_allow_status_code: HashSet<u16>,

    // Heartbeat
    pub heartbeat_tick: Duration,
    /// Grace period the engine waits for in-flight work to drain on shutdown.
    pub graceful_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            concurrent_requests: 16,
            concurrent_requests_per_domain: 8,
            download_delay: Duration::ZERO,
            randomize_download_delay: true,
            download_timeout: Duration::from_secs(180),

            scheduler_queue_class: "memory".to_string(),
            scheduler_flush_on_start: false,
            scheduler_serializer: "json".to_string(),
            dupefilter_class: "memory".to_string(),

            // Open Question resolved (spec.md §9 / SPEC_FULL.md §9): true.
            close_spider_on_idle: true,
            closespider_timeout: 0,
            closespider_itemcount: 0,
            closespider_pagecount: 0,
            closespider_errorcount: 0,

            retry_enabled: true,
            retry_times: 2,
            retry_http_codes: [500, 502, 503, 504, 522, 524, 408, 429].into_iter().collect(),
            retry_priority_adjust: -1,

            depth_limit: 0,
            depth_priority: 0,

            use_proxy: false,
            proxy_handler: "memory".to_string(),
            proxy_max_count: 100,
            proxy_min_count: 10,
            proxy_allow_status_code: [404].into_iter().collect(),

            heartbeat_tick: Duration::from_millis(5),
            graceful_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineSettings {
    /// Overlay environment variables named after each field in upper snake
    /// case (spec.md §6: "any setting may be overridden by a variable of the
    /// same name ... when so configured").
    pub fn with_env_overrides(mut self) -> Result<Self, EngineError> {
        macro_rules! env_usize {
            ($field:ident, $key:literal) => {
                if let Ok(v) = std::env::var($key) {
                    self.$field = v
                        .parse()
                        .map_err(|_| EngineError::Configuration(format!("{}={v} is not a valid integer", $key)))?;
                }
            };
        }
        macro_rules! env_bool {
            ($field:ident, $key:literal) => {
                if let Ok(v) = std::env::var($key) {
                    self.$field = v
                        .parse()
                        .map_err(|_| EngineError::Configuration(format!("{}={v} is not a valid bool", $key)))?;
                }
            };
        }
        macro_rules! env_millis {
            ($field:ident, $key:literal) => {
                if let Ok(v) = std::env::var($key) {
                    let ms: u64 = v
                        .parse()
                        .map_err(|_| EngineError::Configuration(format!("{}={v} is not a valid duration (ms)", $key)))?;
                    self.$field = Duration::from_millis(ms);
                }
            };
        }

        env_usize!(concurrent_requests, "CONCURRENT_REQUESTS");
        env_usize!(concurrent_requests_per_domain, "CONCURRENT_REQUESTS_PER_DOMAIN");
        env_millis!(download_delay, "DOWNLOAD_DELAY");
        env_bool!(randomize_download_delay, "RANDOMIZE_DOWNLOAD_DELAY");
        env_millis!(download_timeout, "DOWNLOAD_TIMEOUT");
        env_bool!(scheduler_flush_on_start, "SCHEDULER_FLUSH_ON_START");
        env_bool!(close_spider_on_idle, "CLOSE_SPIDER_ON_IDLE");
        env_usize!(closespider_timeout, "CLOSESPIDER_TIMEOUT");
        env_usize!(closespider_itemcount, "CLOSESPIDER_ITEMCOUNT");
        env_usize!(closespider_pagecount, "CLOSESPIDER_PAGECOUNT");
        env_usize!(closespider_errorcount, "CLOSESPIDER_ERRORCOUNT");
        env_bool!(retry_enabled, "RETRY_ENABLED");
        env_usize!(retry_times, "RETRY_TIMES");
        env_usize!(depth_limit, "DEPTH_LIMIT");
        env_bool!(use_proxy, "USE_PROXY");
        env_usize!(proxy_max_count, "PROXY_MAX_COUNT");
        env_usize!(proxy_min_count, "PROXY_MIN_COUNT");

        Ok(self)
    }

    /// Apply one `-s KEY=VALUE`-style programmatic override. Unknown keys
    /// are rejected (SPEC_FULL.md §3: "the settings *shape* is fixed").
    pub fn override_str(&mut self, key: &str, value: &str) -> Result<(), EngineError> {
        macro_rules! set_usize {
            ($field:ident) => {{
                self.$field = value
                    .parse()
                    .map_err(|_| EngineError::Configuration(format!("{key}={value} is not a valid integer")))?;
                return Ok(());
            }};
        }
        macro_rules! set_bool {
            ($field:ident) => {{
                self.$field = value
                    .parse()
                    .map_err(|_| EngineError::Configuration(format!("{key}={value} is not a valid bool")))?;
                return Ok(());
            }};
        }

        match key {
            "CONCURRENT_REQUESTS" => set_usize!(concurrent_requests),
            "CONCURRENT_REQUESTS_PER_DOMAIN" => set_usize!(concurrent_requests_per_domain),
            "RANDOMIZE_DOWNLOAD_DELAY" => set_bool!(randomize_download_delay),
            "SCHEDULER_FLUSH_ON_START" => set_bool!(scheduler_flush_on_start),
            "CLOSE_SPIDER_ON_IDLE" => set_bool!(close_spider_on_idle),
            "CLOSESPIDER_TIMEOUT" => set_usize!(closespider_timeout),
            "CLOSESPIDER_ITEMCOUNT" => set_usize!(closespider_itemcount),
            "CLOSESPIDER_PAGECOUNT" => set_usize!(closespider_pagecount),
            "CLOSESPIDER_ERRORCOUNT" => set_usize!(closespider_errorcount),
            "RETRY_ENABLED" => set_bool!(retry_enabled),
            "RETRY_TIMES" => set_usize!(retry_times),
            "DEPTH_LIMIT" => set_usize!(depth_limit),
            "USE_PROXY" => set_bool!(use_proxy),
            "PROXY_MAX_COUNT" => set_usize!(proxy_max_count),
            "PROXY_MIN_COUNT" => set_usize!(proxy_min_count),
            "SCHEDULER_QUEUE_CLASS" => {
                self.scheduler_queue_class = value.to_string();
                Ok(())
            }
            "SCHEDULER_SERIALIZER" => {
                self.scheduler_serializer = value.to_string();
                Ok(())
            }
            "DUPEFILTER_CLASS" => {
                self.dupefilter_class = value.to_string();
                Ok(())
            }
            "PROXY_HANDLER" => {
                self.proxy_handler = value.to_string();
                Ok(())
            }
            other => Err(EngineError::Configuration(format!("unknown setting key: {other}"))),
        }
    }
}

/// Bloom filter sizing convention (SPEC_FULL.md §9 resolves the Open
/// Question: `bits` is an absolute bit count, with [`Self::from_exponent`]
/// provided for callers who think in the power-of-two form instead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BloomFilterConfig {
    pub bits: u64,
    pub k: u32,
}

impl BloomFilterConfig {
    pub fn new(bits: u64, k: u32) -> Self {
        Self { bits, k }
    }

    pub fn from_exponent(exponent: u32, k: u32) -> Self {
        Self {
            bits: 1u64 << exponent,
            k,
        }
    }
}

impl Default for BloomFilterConfig {
    fn default() -> Self {
        Self::from_exponent(22, 7)
    }
}
