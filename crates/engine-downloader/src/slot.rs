//! Per-domain admission slots (spec.md §3, §4.4).
//!
//! The hard-ceiling-plus-soft-default shape (a process-wide semaphore
//! acquired before a per-domain one, with slots lazily created and later
//! evicted) mirrors the teacher's worker-pool admission in
//! `casparian_sentinel::sentinel::Sentinel` (`DEFAULT_MAX_WORKERS`,
//! `HARD_MAX_WORKERS`, and the periodic `cleanup_stale_workers` throttle
//! applied here to idle-slot eviction instead of stale-worker eviction).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Semaphore;

/// Per-domain admission state (spec.md §3 "Slot").
pub struct Slot {
    semaphore: Arc<Semaphore>,
    last_dispatch: Mutex<Option<Instant>>,
    last_touched: Mutex<Instant>,
}

impl Slot {
    fn new(concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            last_dispatch: Mutex::new(None),
            last_touched: Mutex::new(Instant::now()),
        }
    }

    /// Acquire this slot's concurrency permit, then wait out whatever
    /// remains of the configured delay since the previous dispatch (spec.md
    /// §4.4: "Respect DOWNLOAD_DELAY ... since the slot's last dispatch").
    /// Ordering guarantee (spec.md §5): delays are observed between
    /// *consecutive dispatches*, not between receipt of responses, so the
    /// delay sleep happens here, before the permit is released by the
    /// caller's guard going out of scope, not after the response arrives.
    pub async fn acquire(
        self: &Arc<Self>,
        delay: Duration,
        randomize: bool,
    ) -> tokio::sync::OwnedSemaphorePermit {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("slot semaphore closed");

        let wait_for = {
            let mut last_dispatch = self.last_dispatch.lock().expect("slot lock poisoned");
            let target_delay = if randomize {
                let jitter = rand::thread_rng().gen_range(0.5..=1.5);
                delay.mul_f64(jitter)
            } else {
                delay
            };

            let wait = match *last_dispatch {
                Some(previous) => target_delay.saturating_sub(previous.elapsed()),
                None => Duration::ZERO,
            };
            *last_dispatch = Some(Instant::now() + wait);
            wait
        };

        if !wait_for.is_zero() {
            tokio::time::sleep(wait_for).await;
        }

        *self.last_touched.lock().expect("slot lock poisoned") = Instant::now();
        permit
    }

    fn idle_for(&self) -> Duration {
        self.last_touched.lock().expect("slot lock poisoned").elapsed()
    }
}

/// Lazily creates and evicts per-domain [`Slot`]s (spec.md §3: "Lifecycle:
/// lazily created on first request to a domain, evicted after configurable
/// idle period").
pub struct SlotManager {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    per_domain_concurrency: usize,
    idle_eviction_after: Duration,
}

impl SlotManager {
    pub fn new(per_domain_concurrency: usize, idle_eviction_after: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            per_domain_concurrency,
            idle_eviction_after,
        }
    }

    pub fn slot_for(&self, domain: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock().expect("slot manager lock poisoned");
        slots
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Slot::new(self.per_domain_concurrency)))
            .clone()
    }

    /// Sweep slots that have been idle past `idle_eviction_after`. Intended
    /// to be called on the engine's heartbeat tick, not per-request.
    pub fn evict_idle(&self) {
        let mut slots = self.slots.lock().expect("slot manager lock poisoned");
        slots.retain(|_, slot| slot.idle_for() < self.idle_eviction_after);
    }

    pub fn active_domains(&self) -> usize {
        self.slots.lock().expect("slot manager lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consecutive_dispatches_are_paced_by_the_configured_delay() {
        let manager = SlotManager::new(1, Duration::from_secs(60));
        let slot = manager.slot_for("example.com");

        let start = Instant::now();
        let first = slot.acquire(Duration::from_millis(50), false).await;
        drop(first);
        let second = slot.acquire(Duration::from_millis(50), false).await;
        drop(second);

        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn per_domain_slots_are_independent() {
        let manager = SlotManager::new(1, Duration::from_secs(60));
        let a = manager.slot_for("a.example");
        let b = manager.slot_for("b.example");
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
