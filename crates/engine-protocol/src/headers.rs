//! A case-insensitive multi-map for request/response headers (spec.md §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HeaderMap {
    // Keyed by lowercased header name; values preserve insertion order for
    // headers repeated across multiple `insert` calls.
    inner: HashMap<String, Vec<String>>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.inner
            .entry(name.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.inner
            .get(&name.as_ref().to_ascii_lowercase())
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, name: impl AsRef<str>) -> &[String] {
        self.inner
            .get(&name.as_ref().to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: impl AsRef<str>) -> bool {
        self.inner.contains_key(&name.as_ref().to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: impl AsRef<str>) {
        self.inner.remove(&name.as_ref().to_ascii_lowercase());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    /// Iterate headers in a stable, sorted-by-name order. Used for canonical
    /// fingerprinting (spec.md §4.1) where input order must not matter.
    pub fn sorted(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_unstable();
        entries
    }
}
