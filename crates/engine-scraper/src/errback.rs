//! Errback contract (spec.md §4.5: "on parser exception, the errback is
//! invoked with (request, exception)"). Modeled as a sibling of `Parser`
//! rather than a closure so it can be registered in a
//! [`engine_protocol::registry::ComponentRegistry`] by name like every
//! other extension point (spec.md §9).

use async_trait::async_trait;
use engine_protocol::error::ScraperError;
use engine_protocol::request::Request;

use crate::parser::ParseOutput;

#[async_trait]
pub trait Errback: Send + Sync {
    /// May itself yield recovery requests/items, e.g. a request to a
    /// fallback URL or an item recording the failure.
    async fn call(&self, request: &Request, error: &ScraperError) -> Vec<ParseOutput>;
}
