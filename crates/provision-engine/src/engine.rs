//! Engine
//!
//! The inbound node-facing operations. Each call is one resolve-and-transition
//! cycle:
//!
//! - `register`: create or refresh a node from microkernel facts
//! - `checkin`: microkernel heartbeat, answered with a command
//! - `boot`: iPXE script for a network-booting node
//! - `callback`: installer callbacks that drive the model's FSM
//!
//! Writes to nodes and active models are compare-and-swap; a conflict
//! re-reads the object and re-applies the change.

use std::collections::BTreeMap;
use std::sync::Arc;

use object_store::{PersistController, open_store};
use provision_model::{
    ActiveModel, Broker, ImageRecord, ModelInstance, Node, Persist, Registry, State, TagRule,
    normalize_hw_id, now_timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backoff::FibonacciBackoff;
use crate::bmc::{BmcAdapter, IpmiTransport, IpmitoolTransport};
use crate::boot_mk::{boot_script, default_mk, error_reboot_script};
use crate::broker::{Brokers, HandOffOptions, HandOffResult, OpenSshTransport, RetryPolicy, SshTransport};
use crate::config::ProvisionConfig;
use crate::data::Data;
use crate::error::EngineError;
use crate::fsm::{BOOT_CALL, MK_CALL};
use crate::models::{BROKER_NAMESPACE, BootAction, MkDirective, ModelBehavior, Reply, behavior_for, validate_all};
use crate::policies::{DEFAULT_CAS_ATTEMPTS, Policies, candidates};
use crate::render::{BuiltinRenderer, RenderContext, ScriptRenderer, Stage};
use crate::tagging::matched_tags;

/// Login used for broker hand-off on installed nodes
const HAND_OFF_USER: &str = "root";

/// Hardware ids as sent by the microkernel: a list, or one string joined by `_`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HwIdInput {
    List(Vec<String>),
    Joined(String),
}

impl HwIdInput {
    pub fn ids(&self) -> Vec<String> {
        match self {
            Self::List(ids) => ids.iter().filter(|id| !id.is_empty()).cloned().collect(),
            Self::Joined(joined) => joined
                .split('_')
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            Self::List(ids) => ids.is_empty(),
            Self::Joined(joined) => joined.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default, alias = "uuid")]
    pub hw_id: Option<HwIdInput>,
    #[serde(default)]
    pub last_state: Option<String>,
    #[serde(default)]
    pub attributes_hash: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckinRequest {
    #[serde(default, alias = "uuid")]
    pub hw_id: Option<HwIdInput>,
    #[serde(default)]
    pub last_state: Option<String>,
    #[serde(default)]
    pub first_checkin: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootRequest {
    #[serde(default, alias = "mac")]
    pub hw_id: Option<HwIdInput>,
    #[serde(default)]
    pub dhcp_mac: Option<String>,
}

/// Command returned to a checking-in microkernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MkCommand {
    Register,
    Reboot,
    Acknowledge,
}

impl MkCommand {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Reboot => "reboot",
            Self::Acknowledge => "acknowledge",
        }
    }
}

impl From<MkDirective> for MkCommand {
    fn from(directive: MkDirective) -> Self {
        match directive {
            MkDirective::Reboot => Self::Reboot,
            MkDirective::Acknowledge => Self::Acknowledge,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckinResponse {
    pub command_name: MkCommand,
    pub command_param: BTreeMap<String, String>,
}

impl CheckinResponse {
    pub fn new(command: MkCommand) -> Self {
        Self {
            command_name: command,
            command_param: BTreeMap::new(),
        }
    }
}

/// Shared provisioning context
pub struct Engine {
    pub(crate) data: Arc<Data>,
    pub(crate) policies: Policies,
    pub(crate) config: Arc<ProvisionConfig>,
    pub(crate) renderer: Arc<dyn ScriptRenderer>,
    pub(crate) brokers: Brokers,
    pub(crate) bmc: BmcAdapter,
    attempts: u32,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Wires the engine from its collaborators. Fails if any model's
    /// transition table is malformed.
    pub fn new(
        data: Arc<Data>,
        config: ProvisionConfig,
        renderer: Arc<dyn ScriptRenderer>,
        ssh: Arc<dyn SshTransport>,
        ipmi: Arc<dyn IpmiTransport>,
    ) -> Result<Self, EngineError> {
        validate_all()?;
        let retry = RetryPolicy {
            limit: config.broker_retry_limit,
            delay: config.broker_retry_delay(),
        };
        let bmc = BmcAdapter::new(
            ipmi,
            config.default_ipmi_username.as_str(),
            config.default_ipmi_password.as_str(),
        )?;
        Ok(Self {
            policies: Policies::new(Arc::clone(&data)),
            data,
            config: Arc::new(config),
            renderer,
            brokers: Brokers::new(ssh, retry),
            bmc,
            attempts: DEFAULT_CAS_ATTEMPTS,
        })
    }

    /// Opens the configured store and uses the system `ssh` and `ipmitool`
    pub async fn from_config(config: ProvisionConfig) -> Result<Self, EngineError> {
        let store = open_store(config.persist_mode, &config.persist_path, config.persist_timeout()).await?;
        let data = Arc::new(Data::new(PersistController::new(store), Registry::standard()));
        let timeout = config.external_command_timeout();
        Self::new(
            data,
            config,
            Arc::new(BuiltinRenderer),
            Arc::new(OpenSshTransport::new(timeout)),
            Arc::new(IpmitoolTransport::new(timeout)),
        )
    }

    pub fn data(&self) -> &Arc<Data> {
        &self.data
    }

    pub fn policies(&self) -> &Policies {
        &self.policies
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Creates or refreshes the node owning `hw_id`
    pub async fn register(&self, req: RegisterRequest) -> Result<Node, EngineError> {
        let hw_id = required_hw_id(req.hw_id.as_ref())?;
        let last_state = required(req.last_state, "Must Provide Last State[last_state]")?;
        let attributes = req.attributes_hash.filter(|attrs| !attrs.is_empty()).ok_or_else(|| {
            EngineError::MissingArgument("Must Provide Attributes Hash[attributes_hash]".to_string())
        })?;
        let ids = at_least_one(hw_id.ids())?;
        self.data.ensure_connected().await?;

        let mut backoff = FibonacciBackoff::new(5, 200);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut node = match self.lookup_node(&ids).await? {
                Some(mut node) => {
                    node.merge_hw_ids(&ids);
                    node
                }
                None => {
                    info!("Registering new node (hw_id: {:?})", ids);
                    Node::new(ids.clone())
                }
            };
            node.timestamp = now_timestamp();
            node.attributes.clone_from(&attributes);
            node.last_state = Some(last_state.clone());
            match self.data.persist(&mut node).await {
                Ok(()) => {
                    debug!("Node {} registered in state {}", node.uuid, last_state);
                    return Ok(node);
                }
                Err(e) if e.is_conflict() && attempt < self.attempts => {
                    tokio::time::sleep(backoff.next_backoff()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Microkernel heartbeat
    pub async fn checkin(&self, req: CheckinRequest) -> Result<CheckinResponse, EngineError> {
        let hw_id = required_hw_id(req.hw_id.as_ref())?;
        let last_state = required(req.last_state, "Must Provide Last State[last_state]")?;
        let ids = at_least_one(hw_id.ids())?;
        self.data.ensure_connected().await?;

        if !req.first_checkin {
            if let Some(node) = self.lookup_node(&ids).await? {
                return self.mk_checkin(node, &last_state).await;
            }
        }
        // unknown node, or a microkernel that just started
        Ok(CheckinResponse::new(MkCommand::Register))
    }

    async fn mk_checkin(&self, node: Node, last_state: &str) -> Result<CheckinResponse, EngineError> {
        let previous = node.timestamp;
        let now = now_timestamp();
        let state = last_state.to_string();
        let uuid = node.uuid.clone();
        let node = self
            .update::<Node, _, _>(&uuid, |n| {
                n.last_state = Some(state.clone());
                n.timestamp = now;
                Ok(())
            })
            .await?
            .map_or(node, |(n, ())| n);

        if now - previous > self.config.register_timeout {
            debug!("Node {} last seen {}s ago, asking to register", node.uuid, now - previous);
            return Ok(CheckinResponse::new(MkCommand::Register));
        }

        if let Some(active) = self.active_model_for(&node.uuid).await? {
            let directive = self.mk_call(&active).await?;
            return Ok(CheckinResponse::new(directive.into()));
        }

        match self.bind(&node).await? {
            Some(active) => {
                debug!("Node {} newly bound as {}, rebooting", node.uuid, active.uuid);
                Ok(CheckinResponse::new(MkCommand::Reboot))
            }
            None => Ok(CheckinResponse::new(MkCommand::Acknowledge)),
        }
    }

    /// Boot script for the node owning `hw_id`. Never fails; errors become a
    /// script that reports and reboots.
    pub async fn boot(&self, req: BootRequest) -> String {
        match self.try_boot(req).await {
            Ok(script) => script,
            Err(e) => {
                warn!("Boot request failed: {}", e);
                error_reboot_script(&e.message())
            }
        }
    }

    async fn try_boot(&self, req: BootRequest) -> Result<String, EngineError> {
        let hw_id = required_hw_id(req.hw_id.as_ref())?;
        let ids: Vec<String> = hw_id
            .ids()
            .iter()
            .map(|id| normalize_hw_id(id))
            .filter(|id| !id.is_empty())
            .collect();
        let ids = at_least_one(ids)?;
        info!("Boot called by node (hw_id: {:?}, dhcp_mac: {:?})", ids, req.dhcp_mac);
        self.data.ensure_connected().await?;

        let Some(node) = self.lookup_node(&ids).await? else {
            return self.default_mk_boot().await;
        };
        let active = match self.active_model_for(&node.uuid).await? {
            Some(active) => active,
            None => match self.bind(&node).await? {
                Some(active) => active,
                None => return self.default_mk_boot().await,
            },
        };
        self.boot_call(&active).await
    }

    /// Installer callback on `namespace` of an active model
    pub async fn callback(
        &self,
        active_model_uuid: &str,
        namespace: &str,
        args: &[String],
    ) -> Result<String, EngineError> {
        if active_model_uuid.trim().is_empty() {
            return Err(EngineError::MissingArgument("Missing active model uuid".to_string()));
        }
        if namespace.trim().is_empty() {
            return Err(EngineError::MissingArgument("Missing callback namespace".to_string()));
        }
        self.data.ensure_connected().await?;
        let active = self
            .data
            .fetch::<ActiveModel>(active_model_uuid)
            .await?
            .ok_or_else(|| EngineError::ActiveModelInvalid("Active Model Invalid".to_string()))?;
        let behavior = behavior_for(active.model.kind)?;
        debug!("Active bound policy found for callback: {}", namespace);

        if namespace == BROKER_NAMESPACE {
            let reply = match self.claim_and_hand_off(&active.uuid, behavior.as_ref()).await? {
                Some(HandOffResult::Fail) => "error",
                Some(_) => "ok",
                None => {
                    debug!(
                        "Active model {} in {} has no hand-off to run",
                        active.uuid,
                        active.current_state()
                    );
                    "ok"
                }
            };
            return Ok(reply.to_string());
        }
        if !behavior.namespaces().iter().any(|ns| *ns == namespace) {
            return Err(EngineError::NoCallbackFound(format!("Missing callback [{namespace}]")));
        }

        let plan = behavior.callback(namespace, args, &active.model)?;
        let active = if plan.event.is_none() && plan.node_ip.is_none() {
            active
        } else {
            self.update_active(&active.uuid, |am| {
                if let Some(ip) = &plan.node_ip {
                    info!("Active model {} reports node address {}", am.uuid, ip);
                    am.model.node_ip = Some(ip.clone());
                }
                match &plan.event {
                    Some(event) => apply_event(am, behavior.as_ref(), event, namespace).map(Some),
                    None => Ok(None),
                }
            })
            .await?
        };

        match plan.reply {
            Reply::Ok => Ok("ok".to_string()),
            Reply::Error => Ok("error".to_string()),
            Reply::Empty => Ok(String::new()),
            Reply::Text(text) => Ok(text),
            Reply::Render(stage) => self.render(&active, stage).await,
        }
    }

    /// Binds `node` to the first eligible policy, or returns its existing
    /// binding. A policy that fills up between resolution and claim is
    /// skipped in favour of the next candidate. A bind that loses the insert
    /// to a concurrent one gives its slot back and returns the winner.
    pub async fn bind(&self, node: &Node) -> Result<Option<ActiveModel>, EngineError> {
        if let Some(existing) = self.active_model_for(&node.uuid).await? {
            return Ok(Some(existing));
        }
        let rules = self.data.fetch_all::<TagRule>().await?;
        let tags = matched_tags(&rules, node);
        let ordered = self.policies.ordered().await?;
        let mut refused = false;

        for candidate in candidates(&ordered, &tags) {
            let Some(template) = self.data.fetch::<ModelInstance>(&candidate.model_uuid).await? else {
                warn!(
                    "Policy {} references missing model {}",
                    candidate.label, candidate.model_uuid
                );
                continue;
            };
            let Some(policy) = self.policies.claim(&candidate.uuid).await? else {
                refused = true;
                continue;
            };
            let behavior = behavior_for(template.kind)?;
            let mut model = template;
            model.current_state = behavior.table().initial();
            model.counter = policy.bound_count;
            model.broker_uuid.clone_from(&policy.broker_uuid);
            model.node_ip = behavior.assign_node_ip(&model);

            let mut active = ActiveModel::new(&node.uuid, &policy.uuid, &policy.label, model);
            if let Err(e) = self.data.persist(&mut active).await {
                if let Err(release) = self.policies.release(&policy.uuid).await {
                    warn!("Policy {} kept an unused slot: {}", policy.label, release);
                }
                if e.is_conflict() {
                    debug!("Node {} was bound concurrently", node.uuid);
                    return self.active_model_for(&node.uuid).await;
                }
                return Err(e);
            }
            info!(
                "Node {} bound to policy '{}' as active model {} (counter {})",
                node.uuid, policy.label, active.uuid, active.model.counter
            );
            return Ok(Some(active));
        }
        if refused {
            // a concurrent bind may have taken the last slot for this node
            return self.active_model_for(&node.uuid).await;
        }
        debug!("No policy matches node {} (tags: {:?})", node.uuid, tags);
        Ok(None)
    }

    /// Heartbeat against a bound model: the directive comes from the state
    /// before the event. Broker states retry the hand-off.
    async fn mk_call(&self, active: &ActiveModel) -> Result<MkDirective, EngineError> {
        let behavior = behavior_for(active.model.kind)?;
        let state = active.current_state();
        let directive = behavior.mk_directive(state);
        let active = self
            .update_active(&active.uuid, |am| {
                apply_event(am, behavior.as_ref(), MK_CALL, directive.as_str())
            })
            .await?;
        if awaits_hand_off(active.current_state()) {
            self.claim_and_hand_off(&active.uuid, behavior.as_ref()).await?;
        }
        Ok(directive)
    }

    async fn boot_call(&self, active: &ActiveModel) -> Result<String, EngineError> {
        let behavior = behavior_for(active.model.kind)?;
        let action = behavior.boot_action(active.current_state());
        let active = self
            .update_active(&active.uuid, |am| {
                apply_event(am, behavior.as_ref(), BOOT_CALL, "")
            })
            .await?;
        match action {
            BootAction::Install => self.render(&active, Stage::BootInstall).await,
            BootAction::LocalBoot => self.render(&active, Stage::BootLocal).await,
            BootAction::DefaultMk => self.default_mk_boot().await,
        }
    }

    /// Claims the pending hand-off of an active model and runs it. `None`
    /// when there is nothing to hand off or another call holds the claim.
    async fn claim_and_hand_off(
        &self,
        uuid: &str,
        behavior: &dyn ModelBehavior,
    ) -> Result<Option<HandOffResult>, EngineError> {
        match self.claim_hand_off(uuid).await? {
            Some(claimed) => Ok(Some(self.hand_off(&claimed, behavior).await?)),
            None => Ok(None),
        }
    }

    /// Marks the hand-off as running with a compare-and-swap write. A call
    /// that loses the write re-reads and finds the winner's claim.
    async fn claim_hand_off(&self, uuid: &str) -> Result<Option<ActiveModel>, EngineError> {
        let mut backoff = FibonacciBackoff::new(5, 200);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let Some(mut active) = self.data.fetch::<ActiveModel>(uuid).await? else {
                return Ok(None);
            };
            if !awaits_hand_off(active.current_state()) {
                return Ok(None);
            }
            let now = now_timestamp();
            if let Some(since) = active.hand_off_since {
                if now - since < self.config.hand_off_lease() {
                    debug!("Hand-off of active model {} is already running", uuid);
                    return Ok(None);
                }
                warn!(
                    "Hand-off of active model {} claimed at {} never finished, claiming again",
                    uuid, since
                );
            }
            active.hand_off_since = Some(now);
            match self.data.persist(&mut active).await {
                Ok(()) => return Ok(Some(active)),
                Err(e) if e.is_conflict() && attempt < self.attempts => {
                    tokio::time::sleep(backoff.next_backoff()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Runs the bound broker's plugin and feeds its result to the FSM
    async fn hand_off(
        &self,
        active: &ActiveModel,
        behavior: &dyn ModelBehavior,
    ) -> Result<HandOffResult, EngineError> {
        let broker = self.data.fetch::<Broker>(&active.model.broker_uuid).await?;
        let result = match (broker, active.model.node_ip.clone()) {
            (None, _) => {
                warn!(
                    "Broker {} of active model {} no longer exists",
                    active.model.broker_uuid, active.uuid
                );
                HandOffResult::Fail
            }
            (Some(_), None) => {
                warn!("Active model {} has no node address to hand off to", active.uuid);
                HandOffResult::Fail
            }
            (Some(broker), Some(ipaddress)) => {
                let options = HandOffOptions {
                    username: HAND_OFF_USER.to_string(),
                    password: active.model.meta("root_password").to_string(),
                    ipaddress,
                    uuid: active.node_uuid.clone(),
                    hostname: active.model.hostname(),
                    metadata: broker.metadata.clone(),
                };
                info!(
                    "Handing off node {} to broker '{}' ({})",
                    active.node_uuid, broker.name, broker.plugin
                );
                self.brokers.hand_off(&broker, &options).await
            }
        };
        self.update_active(&active.uuid, |am| {
            am.hand_off_since = None;
            apply_event(am, behavior, result.event(), "broker")
        })
        .await?;
        Ok(result)
    }

    async fn default_mk_boot(&self) -> Result<String, EngineError> {
        let images = self.data.fetch_all::<ImageRecord>().await?;
        let mk = default_mk(&images).ok_or_else(|| {
            EngineError::InvalidUuid("No microkernel image is registered".to_string())
        })?;
        Ok(boot_script(mk, &self.config))
    }

    pub(crate) async fn render(&self, active: &ActiveModel, stage: Stage) -> Result<String, EngineError> {
        let image = self.data.fetch::<ImageRecord>(&active.model.image_uuid).await?;
        let ctx = RenderContext::new(active, image.as_ref(), &self.config);
        self.renderer.render(stage, &ctx)
    }

    pub(crate) async fn lookup_node(&self, ids: &[String]) -> Result<Option<Node>, EngineError> {
        Ok(self
            .data
            .fetch_all::<Node>()
            .await?
            .into_iter()
            .find(|node| node.matches_hw_id(ids)))
    }

    pub(crate) async fn active_model_for(&self, node_uuid: &str) -> Result<Option<ActiveModel>, EngineError> {
        self.data.fetch::<ActiveModel>(node_uuid).await
    }

    /// Read-modify-write of one object with compare-and-swap retries.
    /// `None` when the object does not exist.
    pub(crate) async fn update<T, R, F>(&self, uuid: &str, mut mutate: F) -> Result<Option<(T, R)>, EngineError>
    where
        T: Persist,
        F: FnMut(&mut T) -> Result<R, EngineError>,
    {
        let mut backoff = FibonacciBackoff::new(5, 200);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let Some(mut object) = self.data.fetch::<T>(uuid).await? else {
                return Ok(None);
            };
            let result = mutate(&mut object)?;
            match self.data.persist(&mut object).await {
                Ok(()) => return Ok(Some((object, result))),
                Err(e) if e.is_conflict() && attempt < self.attempts => {
                    let delay = backoff.next_backoff();
                    debug!(
                        "{}/{} conflict (attempt {}/{}), retrying in {:?}",
                        T::COLLECTION,
                        uuid,
                        attempt,
                        self.attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn update_active<R, F>(&self, uuid: &str, mutate: F) -> Result<ActiveModel, EngineError>
    where
        F: FnMut(&mut ActiveModel) -> Result<R, EngineError>,
    {
        self.update::<ActiveModel, _, _>(uuid, mutate)
            .await?
            .map(|(am, _)| am)
            .ok_or_else(|| EngineError::ActiveModelInvalid(format!("Active model {uuid} was removed")))
    }
}

/// States in which a heartbeat or broker callback runs the hand-off
fn awaits_hand_off(state: State) -> bool {
    matches!(state, State::BrokerCheck | State::BrokerWait)
}

/// Applies `event` to the model's table. Reaching the final state moves on
/// to `broker_check` or `complete_no_broker`. Heartbeats and boots are only
/// logged when they change state, and an event repeating the last logged
/// step is not logged again.
pub(crate) fn apply_event(
    active: &mut ActiveModel,
    behavior: &dyn ModelBehavior,
    event: &str,
    result: &str,
) -> Result<State, EngineError> {
    let old = active.current_state();
    let mut new = behavior.table().next_state(old, event).ok_or_else(|| {
        EngineError::Internal(format!(
            "state {old} is not declared for model {}",
            active.model.kind
        ))
    })?;
    if new == active.model.final_state() {
        new = if active.model.has_broker() {
            State::BrokerCheck
        } else {
            State::CompleteNoBroker
        };
    }
    active.model.current_state = new;
    if old == new && is_replay(active, event) {
        debug!("Active model {}: replayed {} ignored", active.uuid, event);
        return Ok(new);
    }
    if old != new || (event != MK_CALL && event != BOOT_CALL) {
        debug!("Active model {}: {} --{}--> {}", active.uuid, old, event, new);
        active.record(event, old, new, result);
    }
    Ok(new)
}

fn is_replay(active: &ActiveModel, event: &str) -> bool {
    active
        .log
        .last()
        .is_some_and(|last| last.action == event && last.new_state == active.current_state())
}

fn required_hw_id(hw_id: Option<&HwIdInput>) -> Result<&HwIdInput, EngineError> {
    hw_id
        .filter(|id| !id.is_blank())
        .ok_or_else(|| EngineError::MissingArgument("Must Provide Hardware IDs[hw_id]".to_string()))
}

fn at_least_one(ids: Vec<String>) -> Result<Vec<String>, EngineError> {
    if ids.is_empty() {
        Err(EngineError::MissingArgument(
            "Must Provide At Least One Hardware ID [hw_id]".to_string(),
        ))
    } else {
        Ok(ids)
    }
}

fn required(value: Option<String>, message: &str) -> Result<String, EngineError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| EngineError::MissingArgument(message.to_string()))
}
