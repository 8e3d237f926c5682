//! Shared fixtures for engine tests: an in-memory store, scripted SSH and
//! IPMI transports, and seeding helpers.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use object_store::{MemoryStore, ObjectStoreTrait, PersistController};
use provision_model::{
    Broker, BrokerPluginKind, ImageKind, ImageRecord, ModelInstance, ModelKind, Node, Policy,
    Registry, TagRule, apply_metadata, broker_fields, model_fields,
};
use serde_json::Value;

use crate::bmc::{IpmiTarget, IpmiTransport};
use crate::broker::{CommandOutput, SshError, SshTarget, SshTransport};
use crate::config::ProvisionConfig;
use crate::data::Data;
use crate::engine::{Engine, RegisterRequest, HwIdInput};
use crate::error::EngineError;
use crate::render::BuiltinRenderer;

pub fn memory_data() -> Arc<Data> {
    memory_backed().1
}

/// Data over a memory store, with the store handle kept for outage tests
pub fn memory_backed() -> (Arc<MemoryStore>, Arc<Data>) {
    let store = Arc::new(MemoryStore::new());
    let handle: Arc<dyn ObjectStoreTrait> = Arc::clone(&store) as Arc<dyn ObjectStoreTrait>;
    let data = Arc::new(Data::new(PersistController::new(handle), Registry::standard()));
    (store, data)
}

/// SSH transport that records uploads and commands and answers from a queue
#[derive(Debug, Default)]
pub struct FakeSsh {
    replies: Mutex<VecDeque<Result<CommandOutput, SshError>>>,
    pub uploads: Mutex<Vec<(String, String)>>,
    pub commands: Mutex<Vec<(String, String)>>,
    exec_delay: Mutex<Duration>,
}

impl FakeSsh {
    pub fn reply(&self, exit_code: i32, output: &str) {
        self.replies.lock().unwrap().push_back(Ok(CommandOutput {
            exit_code,
            output: output.to_string(),
        }));
    }

    pub fn fail_connect(&self) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(SshError::Connection("connection refused".to_string())));
    }

    /// Makes every command take `delay` before answering
    pub fn slow_exec(&self, delay: Duration) {
        *self.exec_delay.lock().unwrap() = delay;
    }

    pub fn commands(&self) -> Vec<(String, String)> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SshTransport for FakeSsh {
    async fn upload(&self, target: &SshTarget, _contents: &[u8], remote_path: &str) -> Result<(), SshError> {
        self.uploads
            .lock()
            .unwrap()
            .push((target.host.clone(), remote_path.to_string()));
        Ok(())
    }

    async fn exec(&self, target: &SshTarget, command: &str) -> Result<CommandOutput, SshError> {
        self.commands
            .lock()
            .unwrap()
            .push((target.host.clone(), command.to_string()));
        let delay = *self.exec_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SshError::Failed("no scripted reply".to_string())))
    }
}

/// IPMI transport answering by joined argument string
#[derive(Debug, Default)]
pub struct FakeIpmi {
    outputs: Mutex<BTreeMap<String, VecDeque<Result<String, String>>>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeIpmi {
    /// Queues `output` for the next `args` call (e.g. `"chassis power status"`)
    pub fn answer(&self, args: &str, output: &str) {
        self.outputs
            .lock()
            .unwrap()
            .entry(args.to_string())
            .or_default()
            .push_back(Ok(output.to_string()));
    }

    pub fn fail(&self, args: &str, message: &str) {
        self.outputs
            .lock()
            .unwrap()
            .entry(args.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IpmiTransport for FakeIpmi {
    async fn run(&self, _target: &IpmiTarget, args: &[&str]) -> Result<String, EngineError> {
        let key = args.join(" ");
        self.calls.lock().unwrap().push(key.clone());
        let mut outputs = self.outputs.lock().unwrap();
        match outputs.get_mut(&key).and_then(VecDeque::pop_front) {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(EngineError::CommandFailed(message)),
            None => Err(EngineError::CommandFailed(format!("ipmitool {key}: no answer"))),
        }
    }
}

/// An engine on a fresh memory store with fake transports
pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub ssh: Arc<FakeSsh>,
    pub ipmi: Arc<FakeIpmi>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ProvisionConfig::default())
    }

    pub fn with_config(mut config: ProvisionConfig) -> Self {
        config.broker_retry_limit = 1;
        config.broker_retry_delay_secs = 0;
        let ssh = Arc::new(FakeSsh::default());
        let ipmi = Arc::new(FakeIpmi::default());
        let (store, data) = memory_backed();
        let engine = Engine::new(
            data,
            config,
            Arc::new(BuiltinRenderer),
            Arc::clone(&ssh) as Arc<dyn SshTransport>,
            Arc::clone(&ipmi) as Arc<dyn IpmiTransport>,
        )
        .unwrap();
        Self { engine, store, ssh, ipmi }
    }

    pub fn data(&self) -> &Data {
        self.engine.data()
    }

    pub async fn mk_image(&self, version: &str) -> ImageRecord {
        let mut image = ImageRecord::new(ImageKind::Mk, "rz_mk", version, "vmlinuz", "initrd.gz");
        self.data().persist(&mut image).await.unwrap();
        image
    }

    pub async fn os_image(&self) -> ImageRecord {
        let mut image = ImageRecord::new(ImageKind::Os, "opensuse", "12.1", "boot/linux", "boot/initrd");
        self.data().persist(&mut image).await.unwrap();
        image
    }

    /// An openSUSE model on a fresh OS image
    pub async fn suse_model(&self) -> ModelInstance {
        let image = self.os_image().await;
        let req = BTreeMap::from([
            ("hostname_prefix".to_string(), "web".to_string()),
            ("root_password".to_string(), "secret123".to_string()),
        ]);
        let metadata = apply_metadata(&model_fields(ModelKind::Opensuse12), &req).unwrap();
        let mut model = ModelInstance::new(ModelKind::Opensuse12, "suse", image.uuid, metadata);
        self.data().persist(&mut model).await.unwrap();
        model
    }

    pub async fn puppet_broker(&self) -> Broker {
        let req = BTreeMap::from([("server".to_string(), "puppet.example.com".to_string())]);
        let metadata = apply_metadata(&broker_fields(BrokerPluginKind::Puppet), &req).unwrap();
        let mut broker = Broker::new("puppet", "", BrokerPluginKind::Puppet, metadata);
        self.data().persist(&mut broker).await.unwrap();
        broker
    }

    /// Persists an enabled policy and appends it to the table
    pub async fn policy(&self, label: &str, model: &ModelInstance, tags: &[&str], maximum: u32) -> Policy {
        let tags = tags.iter().map(|t| (*t).to_string()).collect();
        let mut policy = Policy::new(label, model.kind.template(), model.uuid.clone(), tags);
        policy.enabled = true;
        policy.maximum = maximum;
        self.data().persist(&mut policy).await.unwrap();
        self.engine.policies().add(&policy.uuid).await.unwrap();
        policy
    }

    /// Tag rule giving `tag` to nodes whose `key` attribute equals `value`
    pub async fn tag_rule(&self, tag: &str, key: &str, value: &str) -> TagRule {
        let mut rule = TagRule::new(tag, tag);
        rule.add_matcher(key, provision_model::Comparator::Equal, value, false);
        self.data().persist(&mut rule).await.unwrap();
        rule
    }

    pub async fn register(&self, hw_id: &str, attributes: &[(&str, &str)]) -> Node {
        let attributes_hash = attributes
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
            .collect();
        self.engine
            .register(RegisterRequest {
                hw_id: Some(HwIdInput::Joined(hw_id.to_string())),
                last_state: Some("idle".to_string()),
                attributes_hash: Some(attributes_hash),
            })
            .await
            .unwrap()
    }
}
