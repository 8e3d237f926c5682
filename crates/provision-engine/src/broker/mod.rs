//! Broker hand-off
//!
//! After install, a node is handed to its policy's broker. Each plugin
//! implements [`BrokerPlugin::agent_hand_off`] over an [`SshTransport`] and
//! reports a result the install FSM consumes as an event.
//!
//! - `agent`: puppet and chef agent bootstrap
//! - `script`: upload and run an arbitrary script
//! - `transport`: SSH seam and the OpenSSH implementation

pub mod agent;
pub mod script;
pub mod transport;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use provision_model::{Broker, BrokerPluginKind};
use serde::Serialize;
use tracing::{error, warn};

pub use agent::AgentBroker;
pub use script::ScriptBroker;
pub use transport::{CommandOutput, OpenSshTransport, SshError, SshTarget, SshTransport};

/// Result of a hand-off, fed to the FSM as an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandOffResult {
    /// The agent finished its first run
    Success,
    /// The agent waits on certificate signing; retried on the next heartbeat
    Wait,
    Fail,
}

impl HandOffResult {
    /// FSM event name for the result
    pub const fn event(self) -> &'static str {
        match self {
            Self::Success => "broker_success",
            Self::Wait => "broker_wait",
            Self::Fail => "broker_fail",
        }
    }
}

/// What a plugin knows about the node it hands off
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandOffOptions {
    /// SSH login on the node
    pub username: String,
    pub password: String,
    /// Address reported by the installer
    pub ipaddress: String,
    /// Node uuid
    pub uuid: String,
    pub hostname: String,
    /// The broker's plugin metadata
    pub metadata: BTreeMap<String, String>,
}

impl HandOffOptions {
    /// SSH target for the node
    pub fn target(&self) -> SshTarget {
        SshTarget {
            host: self.ipaddress.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

/// One broker plugin (puppet, chef, script)
#[async_trait::async_trait]
pub trait BrokerPlugin: Send + Sync {
    /// Hands the node to the broker. Transport failures become
    /// [`HandOffResult::Fail`] after retries; this never errors.
    async fn agent_hand_off(&self, broker: &Broker, options: &HandOffOptions) -> HandOffResult;
}

/// Retry policy for transient SSH connection failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub limit: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Runs `op`, retrying connection errors up to `limit` more times.
    /// Any other error is returned at once.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, SshError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SshError>>,
    {
        let mut attempts = 0;
        loop {
            match op().await {
                Err(SshError::Connection(msg)) if attempts < self.limit => {
                    attempts += 1;
                    warn!(
                        "{} connection failed (attempt: {} of {}): {}",
                        what, attempts, self.limit, msg
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => {
                    if matches!(e, SshError::Connection(_)) {
                        error!("{} connection failed (no more attempts left): {}", what, e);
                    }
                    return Err(e);
                }
                ok => return ok,
            }
        }
    }
}

/// Dispatches hand-offs to the plugin named by each broker
#[derive(Clone)]
pub struct Brokers {
    puppet: Arc<dyn BrokerPlugin>,
    chef: Arc<dyn BrokerPlugin>,
    script: Arc<dyn BrokerPlugin>,
}

impl std::fmt::Debug for Brokers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Brokers").finish_non_exhaustive()
    }
}

impl Brokers {
    /// All plugins over one transport and retry policy
    pub fn new(transport: Arc<dyn SshTransport>, retry: RetryPolicy) -> Self {
        Self {
            puppet: Arc::new(AgentBroker::puppet(Arc::clone(&transport), retry)),
            chef: Arc::new(AgentBroker::chef(Arc::clone(&transport), retry)),
            script: Arc::new(ScriptBroker::new(transport, retry)),
        }
    }

    /// Plugin implementing `kind`
    pub fn plugin(&self, kind: BrokerPluginKind) -> &dyn BrokerPlugin {
        match kind {
            BrokerPluginKind::Puppet => self.puppet.as_ref(),
            BrokerPluginKind::Chef => self.chef.as_ref(),
            BrokerPluginKind::Script => self.script.as_ref(),
        }
    }

    /// Runs the hand-off with the plugin `broker` names
    pub async fn hand_off(&self, broker: &Broker, options: &HandOffOptions) -> HandOffResult {
        self.plugin(broker.plugin).agent_hand_off(broker, options).await
    }
}
