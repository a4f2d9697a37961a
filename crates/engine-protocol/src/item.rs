//! The `Item` data model (spec.md §3, §9A).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel prefix marking a reserved routing-hint key in raw parser output,
/// before it has been split into [`Item::routing`] (spec.md §3).
pub const ROUTING_HINT_PREFIX: &str = "__";

/// Pipeline-routing hints a parser can attach to an item. Pulled out of the
/// free-form field map into a typed sub-record (spec.md §9 redesign flag),
/// rather than left mixed in with user fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RoutingHints {
    /// Name of the sink/table an item should be routed to, if the parser
    /// expressed a preference (equivalent to the source system's
    /// `__mysql__` / `__tablename__` convention).
    pub target: Option<String>,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

/// An untyped key->value mapping produced by a parser (spec.md §3). Opaque
/// to the engine beyond classification and routing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub fields: HashMap<String, Value>,
    #[serde(default)]
    pub routing: RoutingHints,
}

impl Item {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Split raw fields (as a generator-style parser would yield them in the
    /// source system) into typed fields + routing hints by stripping any
    /// key carrying [`ROUTING_HINT_PREFIX`].
    pub fn from_raw_fields(raw: HashMap<String, Value>) -> Self {
        let mut item = Item::new();
        for (key, value) in raw {
            if let Some(hint_key) = key.strip_prefix(ROUTING_HINT_PREFIX) {
                if hint_key == "target" {
                    item.routing.target = value.as_str().map(str::to_string);
                } else {
                    item.routing.extra.insert(hint_key.to_string(), value);
                }
            } else {
                item.fields.insert(key, value);
            }
        }
        item
    }
}
