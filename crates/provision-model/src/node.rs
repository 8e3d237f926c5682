//! Node
//!
//! A machine known by its hardware identifiers, together with the facts
//! its microkernel last reported.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical hardware id form: uppercase, colons removed
pub fn normalize_hw_id(raw: &str) -> String {
    raw.trim().replace(':', "").to_uppercase()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub uuid: String,

    #[serde(default)]
    pub version: u64,

    /// Hardware identifiers in the order they were first reported
    #[serde(default)]
    pub hw_id: Vec<String>,

    /// Facts reported by the microkernel on its last register
    #[serde(default, rename = "attributes_hash")]
    pub attributes: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_state: Option<String>,

    /// Unix seconds of the last register or checkin
    #[serde(default)]
    pub timestamp: i64,

    /// Tags computed for display; never persisted
    #[serde(default, rename = "_tags", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Node {
    pub fn new(hw_id: Vec<String>) -> Self {
        let mut node = Self {
            uuid: crate::new_uuid(),
            ..Self::default()
        };
        node.merge_hw_ids(&hw_id);
        node
    }

    /// True when any of `ids` (normalized) belongs to this node
    pub fn matches_hw_id(&self, ids: &[String]) -> bool {
        ids.iter()
            .map(|id| normalize_hw_id(id))
            .any(|id| self.hw_id.contains(&id))
    }

    /// Appends ids not already present, keeping existing order
    pub fn merge_hw_ids(&mut self, ids: &[String]) {
        for id in ids {
            let id = normalize_hw_id(id);
            if !id.is_empty() && !self.hw_id.contains(&id) {
                self.hw_id.push(id);
            }
        }
    }

    /// Attribute as a string; non-string facts use their JSON text
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}
