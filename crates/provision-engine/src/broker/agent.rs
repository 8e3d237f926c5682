//! Puppet and Chef agent brokers
//!
//! Both bootstrap a configuration-management agent on the node with a
//! generated shell script and judge the outcome from the agent's output.

use std::fmt::Write as _;
use std::sync::Arc;

use provision_model::Broker;
use tracing::{debug, error, info};

use super::transport::SshTransport;
use super::{BrokerPlugin, HandOffOptions, HandOffResult, RetryPolicy};

const CATALOG_FINISHED: &str = "Finished catalog run";
const WAITING_FOR_CERT: &str = "Exiting; no certificate found and waitforcert is disabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Puppet,
    Chef,
}

impl Flavor {
    const fn name(self) -> &'static str {
        match self {
            Self::Puppet => "puppet",
            Self::Chef => "chef",
        }
    }
}

/// Success when the catalog run finished, wait when the agent is waiting
/// on certificate signing, fail otherwise
pub fn classify_agent_output(output: &str) -> HandOffResult {
    if output.contains(CATALOG_FINISHED) {
        HandOffResult::Success
    } else if output.contains(WAITING_FOR_CERT) {
        HandOffResult::Wait
    } else {
        HandOffResult::Fail
    }
}

/// Puppet or chef agent bootstrap: uploads an init script that installs
/// and runs the agent, then classifies its output
pub struct AgentBroker {
    flavor: Flavor,
    transport: Arc<dyn SshTransport>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for AgentBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBroker")
            .field("flavor", &self.flavor)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl AgentBroker {
    /// Puppet agent against the broker's `server`
    pub fn puppet(transport: Arc<dyn SshTransport>, retry: RetryPolicy) -> Self {
        Self {
            flavor: Flavor::Puppet,
            transport,
            retry,
        }
    }

    /// Chef client against the broker's `server`
    pub fn chef(transport: Arc<dyn SshTransport>, retry: RetryPolicy) -> Self {
        Self {
            flavor: Flavor::Chef,
            transport,
            retry,
        }
    }

    fn script_path(&self) -> String {
        format!("/tmp/{}_init.sh", self.flavor.name())
    }

    /// Agent install script for `broker` and the node in `options`
    pub fn install_script(&self, broker: &Broker, options: &HandOffOptions) -> String {
        let server = broker.meta("server");
        let version = broker.meta("broker_version");
        let mut s = String::from("#!/bin/bash\n");
        match self.flavor {
            Flavor::Puppet => {
                if version.is_empty() {
                    s.push_str("gem install puppet --no-ri --no-rdoc\n");
                } else {
                    let _ = writeln!(s, "gem install puppet -v {version} --no-ri --no-rdoc");
                }
                s.push_str("mkdir -p /etc/puppet\n");
                let _ = writeln!(
                    s,
                    "printf '[agent]\\nserver = {server}\\ncertname = {}\\n' > /etc/puppet/puppet.conf",
                    options.uuid
                );
                let _ = writeln!(
                    s,
                    "puppet agent --test --server {server} --certname {} --waitforcert 0",
                    options.uuid
                );
            }
            Flavor::Chef => {
                if version.is_empty() {
                    s.push_str("curl -L https://www.opscode.com/chef/install.sh | bash\n");
                } else {
                    let _ = writeln!(
                        s,
                        "curl -L https://www.opscode.com/chef/install.sh | bash -s -- -v {version}"
                    );
                }
                s.push_str("mkdir -p /etc/chef\n");
                let _ = writeln!(
                    s,
                    "printf 'chef_server_url \"https://{server}\"\\nnode_name \"{}\"\\n' > /etc/chef/client.rb",
                    options.hostname
                );
                s.push_str("chef-client\n");
            }
        }
        s
    }
}

#[async_trait::async_trait]
impl BrokerPlugin for AgentBroker {
    async fn agent_hand_off(&self, broker: &Broker, options: &HandOffOptions) -> HandOffResult {
        let name = self.flavor.name();
        let target = options.target();
        let script = self.install_script(broker, options);
        let path = self.script_path();
        let command = format!("bash {path} 2>&1 | tee /tmp/{name}_init.out");
        debug!("Handing node {} to {} broker {}", options.uuid, name, broker.name);

        let transport = self.transport.as_ref();
        let (target, script, path, command) =
            (&target, script.as_bytes(), path.as_str(), command.as_str());
        let result = self
            .retry
            .run(name, move || async move {
                transport.upload(target, script, path).await?;
                transport.exec(target, command).await
            })
            .await;

        match result {
            Ok(out) => {
                for line in out.output.lines() {
                    debug!("{} script: {}", name, line);
                }
                let outcome = classify_agent_output(&out.output);
                info!("{} hand-off of node {}: {:?}", name, options.uuid, outcome);
                outcome
            }
            Err(e) => {
                error!("{} agent error: {}", name, e);
                HandOffResult::Fail
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_agent_output() {
        assert_eq!(
            classify_agent_output("notice: Finished catalog run in 3.2 seconds"),
            HandOffResult::Success
        );
        assert_eq!(
            classify_agent_output(
                "Exiting; no certificate found and waitforcert is disabled\n"
            ),
            HandOffResult::Wait
        );
        assert_eq!(classify_agent_output("command not found"), HandOffResult::Fail);
    }
}
