//! Models
//!
//! A `ModelInstance` is an administrator-configured install recipe: which
//! OS family, which image, and the validated metadata that feeds rendering.
//! Once bound to a node it is embedded in an `ActiveModel` and carries the
//! node's install state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::image::ImageKind;
use crate::policy::{NO_BROKER, PolicyTemplate};

/// Supported model templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "opensuse_12")]
    Opensuse12,
    #[serde(rename = "redhat_6")]
    Redhat6,
    #[serde(rename = "oraclelinux_6")]
    Oraclelinux6,
    #[serde(rename = "xenserver_boston")]
    XenserverBoston,
    #[serde(rename = "xenserver_tampa")]
    XenserverTampa,
}

impl ModelKind {
    pub const ALL: [Self; 5] = [
        Self::Opensuse12,
        Self::Redhat6,
        Self::Oraclelinux6,
        Self::XenserverBoston,
        Self::XenserverTampa,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Opensuse12 => "opensuse_12",
            Self::Redhat6 => "redhat_6",
            Self::Oraclelinux6 => "oraclelinux_6",
            Self::XenserverBoston => "xenserver_boston",
            Self::XenserverTampa => "xenserver_tampa",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Opensuse12 => "OpenSuSE Suse 12 Model",
            Self::Redhat6 => "RedHat 6 Model",
            Self::Oraclelinux6 => "Oracle Linux 6 Model",
            Self::XenserverBoston => "Citrix XenServer 6.0 (boston) Deployment",
            Self::XenserverTampa => "Citrix XenServer 6.1 (tampa) Deployment",
        }
    }

    /// Policy template a policy must use to reference this model
    pub const fn template(self) -> PolicyTemplate {
        match self {
            Self::XenserverBoston | Self::XenserverTampa => PolicyTemplate::XenserverHypervisor,
            _ => PolicyTemplate::LinuxDeploy,
        }
    }

    /// Kind of image the model installs from
    pub const fn image_kind(self) -> ImageKind {
        match self {
            Self::XenserverBoston | Self::XenserverTampa => ImageKind::Xenserver,
            _ => ImageKind::Os,
        }
    }

    pub const fn os_version(self) -> &'static str {
        match self {
            Self::Opensuse12 => "12",
            Self::Redhat6 | Self::Oraclelinux6 => "6",
            Self::XenserverBoston => "boston",
            Self::XenserverTampa => "tampa",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ModelError::InputError(format!("Invalid model template '{s}'")))
    }
}

/// Install FSM states shared by every model family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    #[default]
    Init,
    Preinstall,
    Postinstall,
    OsComplete,
    TimeoutError,
    ErrorCatch,
    BrokerCheck,
    BrokerWait,
    BrokerFail,
    BrokerSuccess,
    CompleteNoBroker,
}

impl State {
    pub const ALL: [Self; 11] = [
        Self::Init,
        Self::Preinstall,
        Self::Postinstall,
        Self::OsComplete,
        Self::TimeoutError,
        Self::ErrorCatch,
        Self::BrokerCheck,
        Self::BrokerWait,
        Self::BrokerFail,
        Self::BrokerSuccess,
        Self::CompleteNoBroker,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Preinstall => "preinstall",
            Self::Postinstall => "postinstall",
            Self::OsComplete => "os_complete",
            Self::TimeoutError => "timeout_error",
            Self::ErrorCatch => "error_catch",
            Self::BrokerCheck => "broker_check",
            Self::BrokerWait => "broker_wait",
            Self::BrokerFail => "broker_fail",
            Self::BrokerSuccess => "broker_success",
            Self::CompleteNoBroker => "complete_no_broker",
        }
    }

    /// States the broker hand-off can leave the model in
    pub const fn is_broker_state(self) -> bool {
        matches!(
            self,
            Self::BrokerCheck | Self::BrokerWait | Self::BrokerFail | Self::BrokerSuccess
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ModelError::InputError(format!("Invalid state '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInstance {
    pub uuid: String,

    #[serde(default)]
    pub version: u64,

    pub kind: ModelKind,

    pub label: String,

    pub image_uuid: String,

    /// Validated template metadata, keyed without the `@` prefix
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    #[serde(default)]
    pub current_state: State,

    /// Binding sequence number within the owning policy
    #[serde(default)]
    pub counter: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_uuid: Option<String>,

    #[serde(default = "no_broker")]
    pub broker_uuid: String,
}

fn no_broker() -> String {
    NO_BROKER.to_string()
}

impl ModelInstance {
    pub fn new(
        kind: ModelKind,
        label: impl Into<String>,
        image_uuid: impl Into<String>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            uuid: crate::new_uuid(),
            version: 0,
            kind,
            label: label.into(),
            image_uuid: image_uuid.into(),
            metadata,
            current_state: State::Init,
            counter: 0,
            node_ip: None,
            node_uuid: None,
            policy_uuid: None,
            broker_uuid: no_broker(),
        }
    }

    /// State after which the broker hand-off begins
    pub const fn final_state(&self) -> State {
        State::OsComplete
    }

    pub fn meta(&self, key: &str) -> &str {
        self.metadata.get(key).map_or("", String::as_str)
    }

    /// `hostname_prefix` followed by the binding counter
    pub fn hostname(&self) -> String {
        format!("{}{}", self.meta("hostname_prefix"), self.counter)
    }

    pub fn has_broker(&self) -> bool {
        !self.broker_uuid.is_empty() && self.broker_uuid != NO_BROKER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.as_str().parse::<ModelKind>().unwrap(), kind);
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::from(kind.as_str()));
        }
        assert!("windows_2012".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_kind_template() {
        assert_eq!(ModelKind::Redhat6.template(), PolicyTemplate::LinuxDeploy);
        assert_eq!(ModelKind::XenserverTampa.template(), PolicyTemplate::XenserverHypervisor);
        assert_eq!(ModelKind::XenserverBoston.image_kind(), ImageKind::Xenserver);
    }

    #[test]
    fn test_hostname_uses_counter() {
        let mut meta = BTreeMap::new();
        meta.insert("hostname_prefix".to_string(), "web".to_string());
        let mut model = ModelInstance::new(ModelKind::Opensuse12, "suse", "img", meta);
        model.counter = 7;
        assert_eq!(model.hostname(), "web7");
        assert!(!model.has_broker());
    }
}
