//! Item pipeline contract and two reference fixtures (SPEC_FULL.md §9A).
//!
//! Production pipeline implementations are explicitly out of scope (spec.md
//! Non-goals); the trait and the engine's invocation of it are in scope
//! (spec.md §4.7 step 3). `InMemoryPipeline` and `DroppingPipeline` exist
//! purely as test fixtures — neither is wired into any default
//! `EngineSettings`.

use std::sync::Mutex;

use async_trait::async_trait;
use engine_protocol::item::Item;

/// What a pipeline decided to do with an item (spec.md §9's "exception-driven
/// control flow" redesign flag: an explicit sum-typed return, not a raised
/// "drop this item" exception).
pub enum PipelineOutcome {
    Keep(Item),
    Drop(String),
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn process_item(&self, item: Item) -> PipelineOutcome;

    async fn open(&self) {}
    async fn close(&self) {}
}

/// Collects every kept item into a `Vec` behind a mutex (SPEC_FULL.md §9A:
/// "used by every end-to-end test").
#[derive(Default)]
pub struct InMemoryPipeline {
    items: Mutex<Vec<Item>>,
}

impl InMemoryPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<Item> {
        self.items.lock().expect("pipeline lock poisoned").clone()
    }
}

#[async_trait]
impl Pipeline for InMemoryPipeline {
    async fn process_item(&self, item: Item) -> PipelineOutcome {
        self.items.lock().expect("pipeline lock poisoned").push(item.clone());
        PipelineOutcome::Keep(item)
    }
}

/// Drops any item matching a predicate (SPEC_FULL.md §9A: "used to test
/// `item_dropped` signal emission").
pub struct DroppingPipeline<F> {
    predicate: F,
    reason: String,
}

impl<F> DroppingPipeline<F>
where
    F: Fn(&Item) -> bool + Send + Sync,
{
    pub fn new(reason: impl Into<String>, predicate: F) -> Self {
        Self {
            predicate,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl<F> Pipeline for DroppingPipeline<F>
where
    F: Fn(&Item) -> bool + Send + Sync,
{
    async fn process_item(&self, item: Item) -> PipelineOutcome {
        if (self.predicate)(&item) {
            PipelineOutcome::Drop(self.reason.clone())
        } else {
            PipelineOutcome::Keep(item)
        }
    }
}
