//! Brokers
//!
//! Configuration-management targets a node is handed to after install.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerPluginKind {
    Puppet,
    Chef,
    Script,
}

impl BrokerPluginKind {
    pub const ALL: [Self; 3] = [Self::Puppet, Self::Chef, Self::Script];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Puppet => "puppet",
            Self::Chef => "chef",
            Self::Script => "script",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Puppet => "PuppetLabs PuppetMaster",
            Self::Chef => "OpsCode Chef",
            Self::Script => "Script Execution",
        }
    }
}

impl fmt::Display for BrokerPluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrokerPluginKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ModelError::InputError(format!("Invalid broker plugin '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broker {
    pub uuid: String,

    #[serde(default)]
    pub version: u64,

    pub name: String,

    #[serde(default)]
    pub user_description: String,

    pub plugin: BrokerPluginKind,

    /// Validated plugin metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Broker {
    pub fn new(
        name: impl Into<String>,
        user_description: impl Into<String>,
        plugin: BrokerPluginKind,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            uuid: crate::new_uuid(),
            version: 0,
            name: name.into(),
            user_description: user_description.into(),
            plugin,
            metadata,
        }
    }

    pub fn meta(&self, key: &str) -> &str {
        self.metadata.get(key).map_or("", String::as_str)
    }
}
