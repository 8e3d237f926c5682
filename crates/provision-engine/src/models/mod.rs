//! Model behavior
//!
//! Every model family shares the `ModelInstance` data and differs only in
//! behavior: its transition table, what a heartbeat or network boot should
//! do in each state, and how installer callbacks map to events and replies.
//!
//! - `linux`: autoyast (openSUSE) and kickstart (RedHat, Oracle Linux)
//! - `xenserver`: XenServer answerfile installs

pub mod linux;
pub mod xenserver;

use provision_model::{ModelInstance, ModelKind, State};

use crate::error::EngineError;
use crate::fsm::TransitionTable;
use crate::render::Stage;

pub use linux::LinuxDeploy;
pub use xenserver::XenServer;

/// Callback namespace for broker hand-off, shared by every family
pub const BROKER_NAMESPACE: &str = "broker";

/// Reply to a microkernel heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MkDirective {
    Reboot,
    Acknowledge,
}

impl MkDirective {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reboot => "reboot",
            Self::Acknowledge => "acknowledge",
        }
    }
}

/// What a network boot should serve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootAction {
    /// Installer kernel for the model's image
    Install,
    LocalBoot,
    /// Back to the microkernel
    DefaultMk,
}

/// Reply body of an installer callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Error,
    Empty,
    Text(String),
    Render(Stage),
}

/// Outcome of interpreting a callback, applied by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPlan {
    /// FSM event to apply, if any
    pub event: Option<String>,
    pub reply: Reply,
    /// Node address reported by the installed OS
    pub node_ip: Option<String>,
}

impl CallbackPlan {
    pub fn event(event: impl Into<String>, reply: Reply) -> Self {
        Self {
            event: Some(event.into()),
            reply,
            node_ip: None,
        }
    }

    pub fn reply(reply: Reply) -> Self {
        Self {
            event: None,
            reply,
            node_ip: None,
        }
    }
}

pub trait ModelBehavior: Send + Sync {
    fn table(&self) -> &TransitionTable;

    fn mk_directive(&self, state: State) -> MkDirective;

    fn boot_action(&self, state: State) -> BootAction {
        match state {
            State::Init | State::Preinstall => BootAction::Install,
            State::Postinstall
            | State::OsComplete
            | State::BrokerCheck
            | State::BrokerFail
            | State::BrokerSuccess
            | State::CompleteNoBroker => BootAction::LocalBoot,
            _ => BootAction::DefaultMk,
        }
    }

    /// Installer namespaces besides `broker`
    fn namespaces(&self) -> &'static [&'static str];

    /// Interprets an installer callback
    fn callback(
        &self,
        namespace: &str,
        args: &[String],
        model: &ModelInstance,
    ) -> Result<CallbackPlan, EngineError>;

    /// Address assigned to the node at binding time, if the family assigns one
    fn assign_node_ip(&self, _model: &ModelInstance) -> Option<String> {
        None
    }
}

/// Behavior for `kind`, with its validated transition table
pub fn behavior_for(kind: ModelKind) -> Result<Box<dyn ModelBehavior>, EngineError> {
    Ok(match kind {
        ModelKind::Opensuse12 => Box::new(LinuxDeploy::autoyast()?),
        ModelKind::Redhat6 | ModelKind::Oraclelinux6 => Box::new(LinuxDeploy::kickstart()?),
        ModelKind::XenserverBoston | ModelKind::XenserverTampa => Box::new(XenServer::new()?),
    })
}

/// Builds every behavior once so a malformed table fails at startup
pub fn validate_all() -> Result<(), EngineError> {
    for kind in ModelKind::ALL {
        behavior_for(kind)?;
    }
    Ok(())
}

/// `start` / `file` / `end` handling shared by the answer-file namespaces
pub(crate) fn answer_file_stage(namespace: &str, args: &[String], file: Stage) -> CallbackPlan {
    match args.first().map(String::as_str) {
        Some("start") => CallbackPlan::event(format!("{namespace}_start"), Reply::Ok),
        Some("end") => CallbackPlan::event(format!("{namespace}_end"), Reply::Ok),
        Some("file") => CallbackPlan::event(format!("{namespace}_file"), Reply::Render(file)),
        _ => CallbackPlan::reply(Reply::Error),
    }
}
