//! Server configuration
//!
//! Loaded once at startup from the YAML file named by `PROVISION_CONFIG`
//! (defaults when unset), then overridden by a few environment variables.
//! The resulting `ProvisionConfig` is passed explicitly to every component.

use std::path::{Path, PathBuf};
use std::time::Duration;

use object_store::PersistMode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::EngineError;

/// Facts the microkernel should not report
const MK_FACT_EXCL_PATTERNS: [&str; 16] = [
    "(^facter.*$)",
    "(^id$)",
    "(^kernel.*$)",
    "(^memoryfree$)",
    "(^operating.*$)",
    "(^osfamily$)",
    "(^path$)",
    "(^ps$)",
    "(^ruby.*$)",
    "(^selinux$)",
    "(^ssh.*$)",
    "(^swap.*$)",
    "(^timezone$)",
    "(^uniqueid$)",
    "(^uptime.*$)",
    "(.*json_str$)",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Address nodes use to reach this server
    pub image_svc_host: String,
    pub admin_port: u16,
    pub api_port: u16,
    pub image_svc_port: u16,

    /// Seconds between microkernel checkins
    pub mk_checkin_interval: u64,
    pub mk_checkin_skew: u64,
    pub mk_register_path: String,
    pub mk_checkin_path: String,
    pub mk_fact_excl_pattern: String,

    /// A node silent for longer than this is asked to register again
    pub register_timeout: i64,

    pub persist_mode: PersistMode,
    /// Journal directory or SQLite file
    pub persist_path: PathBuf,
    pub persist_timeout: u64,

    pub default_ipmi_power_state: String,
    pub default_ipmi_username: String,
    pub default_ipmi_password: String,

    /// Expiry sweep period in seconds
    pub daemon_min_cycle_time: u64,
    /// Nodes silent for longer than this are removed
    pub node_expire_timeout: i64,

    /// `quiet` or `debug`; anything else is ignored
    pub rz_mk_boot_debug_level: String,
    pub rz_mk_boot_kernel_args: String,

    pub broker_retry_limit: u32,
    pub broker_retry_delay_secs: u64,
    pub external_command_timeout_secs: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            image_svc_host: "127.0.0.1".to_string(),
            admin_port: 8025,
            api_port: 8026,
            image_svc_port: 8027,
            mk_checkin_interval: 60,
            mk_checkin_skew: 5,
            mk_register_path: "/razor/api/node/register".to_string(),
            mk_checkin_path: "/razor/api/node/checkin".to_string(),
            mk_fact_excl_pattern: MK_FACT_EXCL_PATTERNS.join("|"),
            register_timeout: 120,
            persist_mode: PersistMode::Memory,
            persist_path: PathBuf::from("./data"),
            persist_timeout: 10,
            default_ipmi_power_state: "off".to_string(),
            default_ipmi_username: "ipmi_user".to_string(),
            default_ipmi_password: "ipmi_password".to_string(),
            daemon_min_cycle_time: 30,
            node_expire_timeout: 300,
            rz_mk_boot_debug_level: String::new(),
            rz_mk_boot_kernel_args: String::new(),
            broker_retry_limit: 3,
            broker_retry_delay_secs: 30,
            external_command_timeout_secs: 10,
        }
    }
}

/// Settings handed to the microkernel with every register/checkin reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MkClientConfig {
    pub mk_checkin_interval: u64,
    pub mk_checkin_skew: u64,
    pub mk_register_path: String,
    pub mk_checkin_path: String,
    pub mk_fact_excl_pattern: String,
    pub mk_uri: String,
}

impl ProvisionConfig {
    /// Reads `PROVISION_CONFIG` if set, then applies environment overrides
    pub fn load() -> Result<Self, EngineError> {
        let mut config = match std::env::var("PROVISION_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                debug!("PROVISION_CONFIG not set, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        info!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, EngineError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Applies `PROVISION_*` overrides fetched through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("PROVISION_PERSIST_MODE") {
            self.persist_mode = mode
                .parse()
                .map_err(|e| EngineError::InvalidConfig(format!("PROVISION_PERSIST_MODE: {e}")))?;
        }
        if let Some(path) = lookup("PROVISION_PERSIST_PATH") {
            self.persist_path = PathBuf::from(path);
        }
        if let Some(port) = lookup("PROVISION_API_PORT") {
            self.api_port = port
                .parse()
                .map_err(|e| EngineError::InvalidConfig(format!("PROVISION_API_PORT: {e}")))?;
        }
        if let Some(host) = lookup("PROVISION_IMAGE_SVC_HOST") {
            self.image_svc_host = host;
        }
        Ok(())
    }

    /// Base URI for API callbacks from nodes
    pub fn api_svc_uri(&self) -> String {
        format!("http://{}:{}/razor/api", self.image_svc_host, self.api_port)
    }

    /// Base URI for image downloads of `kind`
    pub fn image_svc_uri(&self, kind: &str) -> String {
        format!(
            "http://{}:{}/razor/image/{kind}",
            self.image_svc_host, self.image_svc_port
        )
    }

    pub fn client_config(&self) -> MkClientConfig {
        MkClientConfig {
            mk_checkin_interval: self.mk_checkin_interval,
            mk_checkin_skew: self.mk_checkin_skew,
            mk_register_path: self.mk_register_path.clone(),
            mk_checkin_path: self.mk_checkin_path.clone(),
            mk_fact_excl_pattern: self.mk_fact_excl_pattern.clone(),
            mk_uri: format!("http://{}:{}", self.image_svc_host, self.api_port),
        }
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_secs(self.persist_timeout)
    }

    pub fn external_command_timeout(&self) -> Duration {
        Duration::from_secs(self.external_command_timeout_secs)
    }

    pub fn broker_retry_delay(&self) -> Duration {
        Duration::from_secs(self.broker_retry_delay_secs)
    }

    /// Seconds a broker hand-off claim is honoured: every attempt may spend
    /// an upload and a command timeout plus the retry delay.
    pub fn hand_off_lease(&self) -> i64 {
        let per_attempt = 2 * self.external_command_timeout_secs + self.broker_retry_delay_secs;
        let total = (u64::from(self.broker_retry_limit) + 1).saturating_mul(per_attempt);
        i64::try_from(total).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProvisionConfig::default();
        assert_eq!(config.api_port, 8026);
        assert_eq!(config.register_timeout, 120);
        assert_eq!(config.persist_mode, PersistMode::Memory);
        assert!(config.mk_fact_excl_pattern.starts_with("(^facter.*$)|(^id$)|"));
        assert!(config.mk_fact_excl_pattern.ends_with("|(.*json_str$)"));
    }

    #[test]
    fn test_hand_off_lease_covers_every_attempt() {
        let mut config = ProvisionConfig::default();
        assert_eq!(config.hand_off_lease(), 4 * (2 * 10 + 30));
        config.broker_retry_limit = 0;
        config.broker_retry_delay_secs = 0;
        assert_eq!(config.hand_off_lease(), 20);
    }

    #[test]
    fn test_yaml_partial_keeps_defaults() {
        let config = ProvisionConfig::from_yaml_str(
            "api_port: 9000\npersist_mode: sqlite\npersist_path: /var/lib/provision/db.sqlite\n",
        )
        .unwrap();
        assert_eq!(config.api_port, 9000);
        assert_eq!(config.persist_mode, PersistMode::Sqlite);
        assert_eq!(config.admin_port, 8025);
        assert_eq!(config.default_ipmi_username, "ipmi_user");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provision.yaml");
        std::fs::write(&path, "image_svc_host: 192.168.1.5\nnode_expire_timeout: 600\n").unwrap();
        let config = ProvisionConfig::from_file(&path).unwrap();
        assert_eq!(config.image_svc_host, "192.168.1.5");
        assert_eq!(config.node_expire_timeout, 600);
        assert_eq!(config.image_svc_uri("os"), "http://192.168.1.5:8027/razor/image/os");

        assert!(ProvisionConfig::from_file(&dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(ProvisionConfig::from_yaml_str("\n").unwrap(), ProvisionConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ProvisionConfig::default();
        config
            .apply_overrides(|key| match key {
                "PROVISION_PERSIST_MODE" => Some("journal".to_string()),
                "PROVISION_API_PORT" => Some("7000".to_string()),
                "PROVISION_IMAGE_SVC_HOST" => Some("10.0.0.1".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.persist_mode, PersistMode::Journal);
        assert_eq!(config.api_port, 7000);
        assert_eq!(config.api_svc_uri(), "http://10.0.0.1:7000/razor/api");
        assert_eq!(config.client_config().mk_uri, "http://10.0.0.1:7000");
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut config = ProvisionConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "PROVISION_PERSIST_MODE").then(|| "mongo".to_string())
        });
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }
}
