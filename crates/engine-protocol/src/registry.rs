//! Compile-time builder-by-name registry (spec.md §9 redesign flag: replace
//! runtime class lookup by fully qualified name with an interface per
//! extension point plus a builder-by-name table populated at startup).

use std::collections::HashMap;
use std::sync::Arc;

/// A registry of named builders for some extension-point trait `T`.
/// Populated once at startup (typically from `main`, or from a crate's
/// `default_registry()` constructor) and then consulted by name whenever a
/// settings field like `DUPEFILTER_CLASS` or `SCHEDULER_QUEUE_CLASS` needs
/// resolving to a concrete implementation.
pub struct ComponentRegistry<T: ?Sized> {
    builders: HashMap<String, Arc<dyn Fn() -> Arc<T> + Send + Sync>>,
}

impl<T: ?Sized> Default for ComponentRegistry<T> {
    fn default() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }
}

impl<T: ?Sized> ComponentRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        self.builders.insert(name.into(), Arc::new(builder));
    }

    pub fn build(&self, name: &str) -> Option<Arc<T>> {
        self.builders.get(name).map(|builder| builder())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }
}
