//! Active models
//!
//! The binding of one node to one policy. Holds a private copy of the
//! policy's model whose `current_state` advances as the node installs.

use serde::{Deserialize, Serialize};

use crate::model::{ModelInstance, State};

/// One FSM step as recorded in the active model log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: i64,
    pub action: String,
    pub old_state: State,
    pub new_state: State,
    #[serde(default)]
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveModel {
    pub uuid: String,

    #[serde(default)]
    pub version: u64,

    pub node_uuid: String,

    pub policy_uuid: String,

    /// Policy label at binding time
    #[serde(default)]
    pub label: String,

    pub model: ModelInstance,

    #[serde(default)]
    pub log: Vec<LogEntry>,

    /// Unix seconds of binding
    #[serde(default)]
    pub bind_timestamp: i64,

    /// Unix seconds at which a broker hand-off was claimed; cleared when the
    /// hand-off result is applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hand_off_since: Option<i64>,
}

impl ActiveModel {
    /// Keyed by the node uuid, so a node holds at most one active model and
    /// a second insert fails the store's version check.
    pub fn new(node_uuid: &str, policy_uuid: &str, label: &str, mut model: ModelInstance) -> Self {
        model.node_uuid = Some(node_uuid.to_string());
        model.policy_uuid = Some(policy_uuid.to_string());
        Self {
            uuid: node_uuid.to_string(),
            version: 0,
            node_uuid: node_uuid.to_string(),
            policy_uuid: policy_uuid.to_string(),
            label: label.to_string(),
            model,
            log: Vec::new(),
            bind_timestamp: crate::now_timestamp(),
            hand_off_since: None,
        }
    }

    pub fn current_state(&self) -> State {
        self.model.current_state
    }

    pub fn record(&mut self, action: &str, old_state: State, new_state: State, result: &str) {
        self.log.push(LogEntry {
            timestamp: crate::now_timestamp(),
            action: action.to_string(),
            old_state,
            new_state,
            result: result.to_string(),
        });
    }
}
