//! Parser contract (spec.md §4.5, redesign flag in spec.md §9): an explicit
//! stream the scraper iterates, rather than a generator/yield construct
//! that has no idiomatic Rust equivalent. Grounded on `estuary-flow`'s use
//! of `futures::stream::BoxStream` as the lazy-producer abstraction for
//! connector output.

use engine_protocol::item::Item;
use engine_protocol::request::Request;
use futures::stream::BoxStream;

/// A value produced by a [`Parser`] invocation (spec.md §4.5: "a lazy
/// sequence of mixed Request/Item values").
pub enum ParseOutput {
    Request(Request),
    Item(Item),
}

/// Invoked with the response that satisfied a request, by way of the
/// request's `callback` (or a spider's default parser). Parsers are
/// looked up by name through a [`engine_protocol::registry::ComponentRegistry`]
/// keyed on `CallbackRef`, not by runtime class-path string (spec.md §9).
pub trait Parser: Send + Sync {
    fn call(&self, response: engine_protocol::response::Response) -> BoxStream<'static, ParseOutput>;
}
