//! Metadata schemas
//!
//! Models and broker plugins declare the metadata they need as a list of
//! `MetadataField`s. `apply_metadata` validates administrator input
//! against such a list when the object is created.

use std::collections::BTreeMap;

use regex::Regex;

use crate::broker::BrokerPluginKind;
use crate::error::ModelError;
use crate::model::ModelKind;

const IPV4_OCTET: &str = r"(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataField {
    pub key: &'static str,
    pub default: &'static str,
    pub example: &'static str,
    pub validation: String,
    pub required: bool,
    pub description: &'static str,
}

impl MetadataField {
    fn new(
        key: &'static str,
        default: &'static str,
        example: &'static str,
        validation: impl Into<String>,
        required: bool,
        description: &'static str,
    ) -> Self {
        Self {
            key,
            default,
            example,
            validation: validation.into(),
            required,
            description,
        }
    }

    fn check(&self, value: &str) -> Result<(), ModelError> {
        let re = Regex::new(&self.validation).map_err(|e| {
            ModelError::InvalidMetadata(format!("{}: bad validation pattern: {e}", self.key))
        })?;
        if re.is_match(value) {
            Ok(())
        } else {
            Err(ModelError::InvalidMetadata(format!(
                "Invalid Metadata [{}:'{value}']",
                self.key
            )))
        }
    }
}

/// Validates `provided` against `fields`.
///
/// A provided value must match the field's pattern. An absent value falls
/// back to a non-empty default, which is validated too. An absent required
/// value without a default is `MissingMetadata`. Keys may carry a leading
/// `@`. Unknown keys are dropped.
pub fn apply_metadata(
    fields: &[MetadataField],
    provided: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, ModelError> {
    let provided: BTreeMap<&str, &str> = provided
        .iter()
        .map(|(k, v)| (k.trim_start_matches('@'), v.as_str()))
        .collect();

    let mut applied = BTreeMap::new();
    for field in fields {
        match provided.get(field.key) {
            Some(value) => {
                field.check(value)?;
                applied.insert(field.key.to_string(), (*value).to_string());
            }
            None if !field.default.is_empty() => {
                field.check(field.default)?;
                applied.insert(field.key.to_string(), field.default.to_string());
            }
            None if field.required => {
                return Err(ModelError::MissingMetadata(format!(
                    "Missing metadata [{}]",
                    field.key
                )));
            }
            None => {}
        }
    }
    Ok(applied)
}

fn ipv4() -> String {
    format!(r"^\b{IPV4_OCTET}\.{IPV4_OCTET}\.{IPV4_OCTET}\.{IPV4_OCTET}\b$")
}

/// Metadata a model template requires
pub fn model_fields(kind: ModelKind) -> Vec<MetadataField> {
    match kind {
        ModelKind::Opensuse12 | ModelKind::Redhat6 | ModelKind::Oraclelinux6 => vec![
            MetadataField::new(
                "hostname_prefix",
                "node",
                "node",
                r"^[a-zA-Z0-9][a-zA-Z0-9\-]*$",
                true,
                "node hostname prefix (will append node number)",
            ),
            MetadataField::new(
                "root_password",
                "test1234",
                "P@ssword!",
                r"^[\S]{8,}",
                true,
                "root password (> 8 characters)",
            ),
        ],
        ModelKind::XenserverBoston | ModelKind::XenserverTampa => vec![
            MetadataField::new(
                "root_password",
                "test1234",
                "P@ssword!",
                r"^[\S]{8,}",
                true,
                "root password (> 8 characters)",
            ),
            MetadataField::new(
                "ip_range_network",
                "",
                "192.168.10",
                format!(r"^\b{IPV4_OCTET}\.{IPV4_OCTET}\.{IPV4_OCTET}\b$"),
                true,
                "IP Network for hosts",
            ),
            MetadataField::new(
                "ip_range_subnet",
                "255.255.255.0",
                "255.255.255.0",
                ipv4(),
                true,
                "IP Subnet",
            ),
            MetadataField::new(
                "ip_range_start",
                "",
                "1",
                r"^\b(25[0-4]|2[0-4][0-9]|[01]?[0-9][0-9]?)$",
                true,
                "Starting IP address (1-254)",
            ),
            MetadataField::new(
                "ip_range_end",
                "",
                "50",
                format!(r"^\b{IPV4_OCTET}$"),
                true,
                "Ending IP address (2-255)",
            ),
            MetadataField::new("gateway", "", "192.168.1.1", ipv4(), true, "Gateway for node"),
            MetadataField::new(
                "hostname_prefix",
                "",
                "xs-node",
                r"^[A-Za-z\d-]{3,}$",
                true,
                "Prefix for naming node",
            ),
            MetadataField::new(
                "nameserver",
                "",
                "192.168.10.10",
                ipv4(),
                true,
                "Nameserver for node",
            ),
            MetadataField::new(
                "ntpserver",
                "",
                "ntp.razor.example.local",
                r"^[\w.]{3,}$",
                true,
                "NTP server for node",
            ),
        ],
    }
}

/// Metadata a broker plugin requires
pub fn broker_fields(plugin: BrokerPluginKind) -> Vec<MetadataField> {
    match plugin {
        BrokerPluginKind::Puppet | BrokerPluginKind::Chef => vec![
            MetadataField::new(
                "server",
                "",
                "puppet.example.com",
                r"(^$|^(([a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9\-]*[a-zA-Z0-9])\.)*([A-Za-z0-9]|[A-Za-z0-9][A-Za-z0-9\-]*[A-Za-z0-9])$)",
                false,
                "Hostname of the configuration server; optional",
            ),
            MetadataField::new(
                "broker_version",
                "",
                "3.0.1",
                r"(^$|^[0-9]+(\.([0-9a-zA-Z\-\_]+))*$)",
                false,
                "Agent version; blank for latest",
            ),
        ],
        BrokerPluginKind::Script => vec![
            MetadataField::new("script", "", "web-server.sh", ".*", true, "Script to be run."),
            MetadataField::new(
                "script_path",
                "/tmp/razor_script",
                "/tmp/razor_script",
                ".*",
                false,
                "Script path.",
            ),
            MetadataField::new("data", "", "data.tbz", ".*", false, "Script data resources."),
            MetadataField::new(
                "data_path",
                "/tmp/razor_script_data",
                "/tmp/razor_script_data",
                ".*",
                false,
                "Script data path.",
            ),
            MetadataField::new(
                "metadata_path",
                "/tmp/razor_script_metadata",
                "/tmp/razor_script_metadata",
                ".*",
                false,
                "Script metadata path.",
            ),
            MetadataField::new(
                "log_path",
                "/tmp/razor_script.log",
                "/tmp/razor_script.log",
                ".*",
                false,
                "Script log path.",
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_fill_absent_values() {
        let applied = apply_metadata(&model_fields(ModelKind::Opensuse12), &input(&[])).unwrap();
        assert_eq!(applied["hostname_prefix"], "node");
        assert_eq!(applied["root_password"], "test1234");
    }

    #[test]
    fn test_provided_value_must_match() {
        let err = apply_metadata(
            &model_fields(ModelKind::Opensuse12),
            &input(&[("@root_password", "short")]),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::InvalidMetadata(_)));
    }

    #[test]
    fn test_required_without_default_is_missing() {
        let err = apply_metadata(&broker_fields(BrokerPluginKind::Script), &input(&[])).unwrap_err();
        match err {
            ModelError::MissingMetadata(msg) => assert!(msg.contains("script")),
            other => panic!("expected missing metadata, got {other:?}"),
        }
    }

    #[test]
    fn test_optional_empty_default_is_skipped() {
        let applied = apply_metadata(&broker_fields(BrokerPluginKind::Puppet), &input(&[])).unwrap();
        assert!(applied.is_empty());
    }

    #[test]
    fn test_xenserver_fields_validate() {
        let ok = input(&[
            ("ip_range_network", "192.168.10"),
            ("ip_range_start", "10"),
            ("ip_range_end", "20"),
            ("gateway", "192.168.10.1"),
            ("hostname_prefix", "xs-node"),
            ("nameserver", "192.168.10.2"),
            ("ntpserver", "ntp.local"),
        ]);
        let applied = apply_metadata(&model_fields(ModelKind::XenserverBoston), &ok).unwrap();
        assert_eq!(applied["ip_range_subnet"], "255.255.255.0");

        let mut bad = ok.clone();
        bad.insert("gateway".to_string(), "192.168.10".to_string());
        assert!(apply_metadata(&model_fields(ModelKind::XenserverBoston), &bad).is_err());
    }
}
