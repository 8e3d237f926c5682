//! Policies and the policy table
//!
//! A `Policy` binds nodes carrying a set of tags to a model and a broker.
//! The single `PolicyTable` document orders policies; the first eligible
//! entry wins.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Broker uuid meaning "no hand-off"
pub const NO_BROKER: &str = "none";

/// Document id of the singleton policy table
pub const POLICY_TABLE_UUID: &str = "policy_table";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyTemplate {
    LinuxDeploy,
    XenserverHypervisor,
    /// Built-in fallback serving the microkernel; never user-selectable
    BootMk,
}

impl PolicyTemplate {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LinuxDeploy => "linux_deploy",
            Self::XenserverHypervisor => "xenserver_hypervisor",
            Self::BootMk => "boot_mk",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::LinuxDeploy => "Policy for deploying a Linux-based operating system.",
            Self::XenserverHypervisor => "Policy for deploying a XenServer hypervisor.",
            Self::BootMk => "Default Microkernel boot policy.",
        }
    }

    pub const fn is_hidden(self) -> bool {
        matches!(self, Self::BootMk)
    }

    /// Templates offered to administrators
    pub fn visible() -> impl Iterator<Item = Self> {
        [Self::LinuxDeploy, Self::XenserverHypervisor].into_iter()
    }
}

impl fmt::Display for PolicyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyTemplate {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux_deploy" => Ok(Self::LinuxDeploy),
            "xenserver_hypervisor" => Ok(Self::XenserverHypervisor),
            "boot_mk" => Ok(Self::BootMk),
            other => Err(ModelError::InputError(format!(
                "Invalid policy template '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub uuid: String,

    #[serde(default)]
    pub version: u64,

    pub label: String,

    pub template: PolicyTemplate,

    pub model_uuid: String,

    /// Broker uuid or `NO_BROKER`
    #[serde(default = "no_broker")]
    pub broker_uuid: String,

    /// Tags a node must carry to match
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub enabled: bool,

    /// Upper bound on bound nodes; 0 is unlimited
    #[serde(default)]
    pub maximum: u32,

    /// Nodes bound so far; also the source of model counters
    #[serde(default)]
    pub bound_count: u32,
}

fn no_broker() -> String {
    NO_BROKER.to_string()
}

impl Policy {
    pub fn new(
        label: impl Into<String>,
        template: PolicyTemplate,
        model_uuid: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            uuid: crate::new_uuid(),
            version: 0,
            label: label.into(),
            template,
            model_uuid: model_uuid.into(),
            broker_uuid: no_broker(),
            tags,
            enabled: false,
            maximum: 0,
            bound_count: 0,
        }
    }

    pub fn has_broker(&self) -> bool {
        !self.broker_uuid.is_empty() && self.broker_uuid != NO_BROKER
    }

    /// Whether one more node may bind
    pub fn has_capacity(&self) -> bool {
        self.maximum == 0 || self.bound_count < self.maximum
    }

    /// Every required tag is present in `tags`
    pub fn tags_satisfied_by(&self, tags: &[String]) -> bool {
        self.tags.iter().all(|t| tags.contains(t))
    }
}

/// Ordered, deduplicated list of policy uuids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTable {
    pub uuid: String,

    #[serde(default)]
    pub version: u64,

    #[serde(default)]
    pub p_table: Vec<String>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            uuid: POLICY_TABLE_UUID.to_string(),
            version: 0,
            p_table: Vec::new(),
        }
    }
}

impl PolicyTable {
    pub fn line_number(&self, uuid: &str) -> Option<usize> {
        self.p_table.iter().position(|p| p == uuid)
    }

    /// Appends `uuid` when it is not already listed
    pub fn add_item(&mut self, uuid: &str) -> bool {
        if self.line_number(uuid).is_some() {
            return false;
        }
        self.p_table.push(uuid.to_string());
        true
    }

    pub fn remove_item(&mut self, uuid: &str) -> bool {
        let before = self.p_table.len();
        self.p_table.retain(|p| p != uuid);
        before != self.p_table.len()
    }

    /// Drops entries missing from `existing` and repeated entries.
    /// The first occurrence of a uuid keeps its position.
    pub fn compact(&mut self, existing: &HashSet<String>) -> bool {
        let before = self.p_table.clone();
        let mut seen = HashSet::new();
        self.p_table
            .retain(|p| existing.contains(p) && seen.insert(p.clone()));
        before != self.p_table
    }

    pub fn move_higher(&mut self, uuid: &str) -> bool {
        match self.line_number(uuid) {
            Some(idx) if idx > 0 => {
                self.p_table.swap(idx, idx - 1);
                true
            }
            _ => false,
        }
    }

    pub fn move_lower(&mut self, uuid: &str) -> bool {
        match self.line_number(uuid) {
            Some(idx) if idx + 1 < self.p_table.len() => {
                self.p_table.swap(idx, idx + 1);
                true
            }
            _ => false,
        }
    }

    /// Moves `uuid` to `index`, shifting the entries in between.
    /// Returns `Ok(false)` when `uuid` is not in the table.
    pub fn move_to_index(&mut self, uuid: &str, index: i64) -> Result<bool, ModelError> {
        let count = self.p_table.len();
        let target = usize::try_from(index)
            .ok()
            .filter(|idx| *idx < count)
            .ok_or_else(|| {
                ModelError::InputError(format!(
                    "New line number '{index}' is not valid; should be an between 0 and {}",
                    count.saturating_sub(1)
                ))
            })?;
        let Some(current) = self.line_number(uuid) else {
            return Ok(false);
        };
        let entry = self.p_table.remove(current);
        self.p_table.insert(target, entry);
        Ok(true)
    }
}
