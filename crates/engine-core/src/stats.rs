//! Stats collector (spec.md §7: "every terminal outcome updates a stats
//! counter under a stable name"). A flat, stringly-keyed counter table —
//! deliberately untyped, since callers define their own counter names
//! (`response_received`, `item_scraped`, `retry/max_reached`, ...) the way
//! spec.md's own examples name them.

use std::collections::HashMap;
use std::sync::Mutex;

use engine_scheduler::stats::SchedulerStats;

#[derive(Default)]
pub struct StatsCollector {
    counters: Mutex<HashMap<String, u64>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, name: &str) {
        self.increment_by(name, 1);
    }

    pub fn increment_by(&self, name: &str, amount: u64) {
        let mut counters = self.counters.lock().expect("stats lock poisoned");
        *counters.entry(name.to_string()).or_insert(0) += amount;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.lock().expect("stats lock poisoned").get(name).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counters.lock().expect("stats lock poisoned").clone()
    }
}

impl SchedulerStats for StatsCollector {
    fn record_duplicate(&self) {
        self.increment("scheduler/duplicate");
    }

    fn record_enqueued(&self) {
        self.increment("scheduler/enqueued");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_accumulate_per_name() {
        let stats = StatsCollector::new();
        stats.increment("item_scraped");
        stats.increment("item_scraped");
        stats.increment("response_received");

        assert_eq!(stats.get("item_scraped"), 2);
        assert_eq!(stats.get("response_received"), 1);
        assert_eq!(stats.get("never_set"), 0);
    }
}
