//! In-memory binary heap queue (spec.md §4.2 "single process" variant).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use async_trait::async_trait;
use engine_protocol::error::QueueError;
use engine_protocol::Request;

use crate::RequestQueue;

struct Entry(Request);

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.0.priority == other.0.priority && self.0.sequence == other.0.sequence
    }
}
impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority pops first. Within
        // equal priority, a *lower* sequence number must pop first (FIFO),
        // so reverse the sequence comparison.
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.sequence.cmp(&self.0.sequence))
    }
}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
pub struct MemoryQueue {
    heap: Mutex<BinaryHeap<Entry>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestQueue for MemoryQueue {
    async fn push(&self, request: Request) -> Result<(), QueueError> {
        let mut heap = self.heap.lock().expect("queue lock poisoned");
        heap.push(Entry(request));
        Ok(())
    }

    async fn pop(&self) -> Result<Option<Request>, QueueError> {
        let mut heap = self.heap.lock().expect("queue lock poisoned");
        Ok(heap.pop().map(|entry| entry.0))
    }

    async fn size(&self) -> Result<u64, QueueError> {
        let heap = self.heap.lock().expect("queue lock poisoned");
        Ok(heap.len() as u64)
    }

    async fn clear(&self) -> Result<(), QueueError> {
        let mut heap = self.heap.lock().expect("queue lock poisoned");
        heap.clear();
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        Ok(())
    }
}
