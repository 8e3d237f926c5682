//! Script broker
//!
//! Uploads a script (plus optional data and a JSON metadata file) to the
//! node and runs it. A non-zero exit fails the hand-off.

use std::path::Path;
use std::sync::Arc;

use provision_model::Broker;
use tracing::{debug, error, info};

use super::transport::{SshError, SshTransport};
use super::{BrokerPlugin, HandOffOptions, HandOffResult, RetryPolicy};

/// Runs a user-supplied script on the node
pub struct ScriptBroker {
    transport: Arc<dyn SshTransport>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ScriptBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptBroker")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Broker settings after defaults
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScriptSettings {
    script: String,
    script_path: String,
    data: String,
    data_path: String,
    metadata_path: String,
    log_path: String,
}

impl ScriptSettings {
    fn from_broker(broker: &Broker) -> Self {
        let get = |key: &str, default: &str| {
            let value = broker.meta(key);
            if value.is_empty() { default.to_string() } else { value.to_string() }
        };
        Self {
            script: broker.meta("script").to_string(),
            script_path: get("script_path", "/tmp/razor_script"),
            data: broker.meta("data").to_string(),
            data_path: get("data_path", "/tmp/razor_script_data"),
            metadata_path: get("metadata_path", "/tmp/razor_script_metadata"),
            log_path: get("log_path", "/tmp/razor_script.log"),
        }
    }

    fn command(&self) -> String {
        format!(
            "chmod +x {script} && {script} {meta} > {log} 2>&1; rc=$?; cat {log}; exit $rc",
            script = self.script_path,
            meta = self.metadata_path,
            log = self.log_path,
        )
    }
}

impl ScriptBroker {
    /// Script broker over `transport`
    pub fn new(transport: Arc<dyn SshTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    async fn read_local(path: &str) -> Result<Vec<u8>, SshError> {
        tokio::fs::read(Path::new(path))
            .await
            .map_err(|e| SshError::Failed(format!("cannot read {path}: {e}")))
    }
}

#[async_trait::async_trait]
impl BrokerPlugin for ScriptBroker {
    async fn agent_hand_off(&self, broker: &Broker, options: &HandOffOptions) -> HandOffResult {
        let settings = ScriptSettings::from_broker(broker);
        debug!("Begin script hand-off of node {} via {}", options.uuid, broker.name);

        let script = match Self::read_local(&settings.script).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Script broker error: {}", e);
                return HandOffResult::Fail;
            }
        };
        let data = if settings.data.is_empty() {
            None
        } else {
            match Self::read_local(&settings.data).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    error!("Script broker error: {}", e);
                    return HandOffResult::Fail;
                }
            }
        };
        let metadata = match serde_json::to_vec_pretty(options) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Script broker cannot encode metadata: {}", e);
                return HandOffResult::Fail;
            }
        };

        let transport = self.transport.as_ref();
        let target = options.target();
        let command = settings.command();
        let (target, settings, script, data, metadata, command) = (
            &target,
            &settings,
            script.as_slice(),
            data.as_deref(),
            metadata.as_slice(),
            command.as_str(),
        );
        let result = self
            .retry
            .run("script broker", move || async move {
                transport.upload(target, script, &settings.script_path).await?;
                if let Some(data) = data {
                    transport.upload(target, data, &settings.data_path).await?;
                }
                transport.upload(target, metadata, &settings.metadata_path).await?;
                transport.exec(target, command).await
            })
            .await;

        match result {
            Ok(out) if out.exit_code == 0 => {
                debug!("Script broker output:\n---\n{}\n---", out.output);
                info!("Script hand-off of node {} succeeded", options.uuid);
                HandOffResult::Success
            }
            Ok(out) => {
                error!("Script exited non-zero: {}", out.exit_code);
                error!("Script broker output:\n---\n{}\n---", out.output);
                HandOffResult::Fail
            }
            Err(e) => {
                error!("Script broker error: {}", e);
                HandOffResult::Fail
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provision_model::BrokerPluginKind;
    use std::collections::BTreeMap;

    #[test]
    fn test_settings_defaults_and_command() {
        let mut meta = BTreeMap::new();
        meta.insert("script".to_string(), "/srv/web.sh".to_string());
        let broker = Broker::new("web", "", BrokerPluginKind::Script, meta);
        let settings = ScriptSettings::from_broker(&broker);
        assert_eq!(settings.script_path, "/tmp/razor_script");
        assert_eq!(settings.log_path, "/tmp/razor_script.log");
        assert!(settings.data.is_empty());
        assert_eq!(
            settings.command(),
            "chmod +x /tmp/razor_script && /tmp/razor_script /tmp/razor_script_metadata > /tmp/razor_script.log 2>&1; rc=$?; cat /tmp/razor_script.log; exit $rc"
        );
    }
}
