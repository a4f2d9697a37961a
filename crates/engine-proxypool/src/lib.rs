//! Proxy pool (spec.md §4.3).
//!
//! The bounded-cache-with-refill shape mirrors the teacher's
//! `casparian_worker::venv_manager::VenvManager`: a small in-process cache
//! fed from a canonical external source, topped up once it drops below a
//! low-water mark rather than on every access.

pub mod redis_source;

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use engine_protocol::error::ProxyError;

/// Canonical upstream proxy source (spec.md §4.3: "refilled from a source").
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Fetch up to `count` fresh proxy URLs from the canonical source.
    async fn fetch(&self, count: usize) -> Result<Vec<String>, ProxyError>;

    /// Remove a proxy from the canonical source (e.g. a Redis sorted set),
    /// not just the in-process cache.
    async fn remove(&self, proxy_url: &str) -> Result<(), ProxyError>;
}

/// Why a proxy was invalidated (spec.md §4.3's invalidation rules).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    DisallowedStatus(u16),
    TransportException,
}

#[async_trait]
pub trait ProxyPool: Send + Sync {
    async fn get(&self) -> Option<String>;
    async fn invalidate(&self, proxy_url: &str, reason: InvalidationReason);
    async fn refill(&self) -> Result<(), ProxyError>;
}

struct Cache {
    proxies: VecDeque<String>,
    known: HashSet<String>,
}

/// In-process round-robin cache over a pluggable [`ProxySource`] (spec.md
/// §4.3: "bounded in-process cache of up to `MAX_COUNT` proxies; when cached
/// count drops below `MIN_COUNT` and `get()` is called, `refill()` is
/// invoked").
pub struct MemoryProxyPool<S: ProxySource> {
    source: S,
    cache: Mutex<Cache>,
    max_count: usize,
    min_count: usize,
}

impl<S: ProxySource> MemoryProxyPool<S> {
    pub fn new(source: S, max_count: usize, min_count: usize) -> Self {
        Self {
            source,
            cache: Mutex::new(Cache {
                proxies: VecDeque::new(),
                known: HashSet::new(),
            }),
            max_count,
            min_count,
        }
    }

    fn cached_count(&self) -> usize {
        self.cache.lock().expect("proxy cache lock poisoned").proxies.len()
    }
}

#[async_trait]
impl<S: ProxySource> ProxyPool for MemoryProxyPool<S> {
    async fn get(&self) -> Option<String> {
        if self.cached_count() < self.min_count {
            let _ = self.refill().await;
        }

        let mut cache = self.cache.lock().expect("proxy cache lock poisoned");
        let proxy = cache.proxies.pop_front()?;
        // Round-robin: put it back at the tail for the next caller.
        cache.proxies.push_back(proxy.clone());
        Some(proxy)
    }

    async fn invalidate(&self, proxy_url: &str, reason: InvalidationReason) {
        tracing::warn!(proxy = proxy_url, ?reason, "invalidating proxy");
        {
            let mut cache = self.cache.lock().expect("proxy cache lock poisoned");
            cache.proxies.retain(|p| p != proxy_url);
            cache.known.remove(proxy_url);
        }
        let _ = self.source.remove(proxy_url).await;
    }

    async fn refill(&self) -> Result<(), ProxyError> {
        let needed = {
            let cache = self.cache.lock().expect("proxy cache lock poisoned");
            self.max_count.saturating_sub(cache.proxies.len())
        };
        if needed == 0 {
            return Ok(());
        }

        let fetched = self.source.fetch(needed).await?;
        let mut cache = self.cache.lock().expect("proxy cache lock poisoned");
        for proxy in fetched {
            if cache.known.insert(proxy.clone()) {
                cache.proxies.push_back(proxy);
            }
        }
        Ok(())
    }
}

/// Default allow-list for proxy-invalidating response statuses (spec.md
/// §4.3: default `{404}`).
pub fn default_allow_status_codes() -> HashSet<u16> {
    [404].into_iter().collect()
}
