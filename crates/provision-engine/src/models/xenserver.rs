//! XenServer deployments
//!
//! Installs from an answerfile, then runs a post-install script that
//! injects a first-boot hook. Nodes get a static address from the model's
//! IP range, picked by binding counter.

use provision_model::{ModelInstance, State};

use super::{CallbackPlan, MkDirective, ModelBehavior, Reply, answer_file_stage};
use crate::error::EngineError;
use crate::fsm::{BOOT_CALL, ELSE, MK_CALL, RESET, TransitionTable};
use crate::render::Stage;

const ANSWER_NS: &str = "xenserverinstall_xml";
const ISOLINUX_NS: &str = "isolinux_cfg";
const POSTINSTALL: &str = "postinstall";

#[derive(Debug, Clone)]
pub struct XenServer {
    table: TransitionTable,
}

impl XenServer {
    pub fn new() -> Result<Self, EngineError> {
        Ok(Self { table: table()? })
    }
}

fn table() -> Result<TransitionTable, EngineError> {
    TransitionTable::builder(State::Init)
        .state(
            State::Init,
            &[
                (MK_CALL, State::Init),
                (BOOT_CALL, State::Init),
                ("xenserverinstall_xml_start", State::Preinstall),
                ("xenserverinstall_xml_file", State::Init),
                ("xenserverinstall_xml_end", State::Postinstall),
                ("timeout", State::TimeoutError),
                ("error", State::ErrorCatch),
                (ELSE, State::Init),
            ],
        )
        .state(
            State::Preinstall,
            &[
                (MK_CALL, State::Preinstall),
                (BOOT_CALL, State::Preinstall),
                ("xenserverinstall_xml_start", State::Preinstall),
                ("xenserverinstall_xml_file", State::Init),
                ("xenserverinstall_xml_end", State::Postinstall),
                ("xenserverinstall_xml_timeout", State::TimeoutError),
                ("error", State::ErrorCatch),
                (ELSE, State::Preinstall),
            ],
        )
        .state(
            State::Postinstall,
            &[
                (MK_CALL, State::Postinstall),
                (BOOT_CALL, State::Postinstall),
                ("postinstall_end", State::OsComplete),
                ("xenserverinstall_xml_file", State::Postinstall),
                ("xenserverinstall_xml_end", State::Postinstall),
                ("postinstallscript_inject", State::Postinstall),
                ("postinstall_inject", State::Postinstall),
                ("xenserverinstall_xml_timeout", State::Postinstall),
                ("error", State::ErrorCatch),
                (ELSE, State::Preinstall),
            ],
        )
        .state(
            State::OsComplete,
            &[
                (MK_CALL, State::OsComplete),
                (BOOT_CALL, State::OsComplete),
                (ELSE, State::OsComplete),
                (RESET, State::Init),
            ],
        )
        .state(
            State::TimeoutError,
            &[(ELSE, State::TimeoutError), (RESET, State::Init)],
        )
        .state(
            State::ErrorCatch,
            &[(ELSE, State::ErrorCatch), (RESET, State::Init)],
        )
        .with_broker_states()
        .build()
}

impl ModelBehavior for XenServer {
    fn table(&self) -> &TransitionTable {
        &self.table
    }

    fn mk_directive(&self, state: State) -> MkDirective {
        match state {
            State::Init | State::Preinstall | State::Postinstall | State::OsComplete => {
                MkDirective::Reboot
            }
            _ => MkDirective::Acknowledge,
        }
    }

    fn namespaces(&self) -> &'static [&'static str] {
        &[ANSWER_NS, ISOLINUX_NS, POSTINSTALL]
    }

    fn callback(
        &self,
        namespace: &str,
        args: &[String],
        _model: &ModelInstance,
    ) -> Result<CallbackPlan, EngineError> {
        let plan = match namespace {
            ANSWER_NS => answer_file_stage(namespace, args, Stage::XenserverInstallXml),
            ISOLINUX_NS => CallbackPlan::reply(Reply::Render(Stage::IsolinuxCfg)),
            POSTINSTALL => match args.first().map(String::as_str) {
                Some("download") => {
                    CallbackPlan::event("postinstallscript_inject", Reply::Render(Stage::Postinstall))
                }
                Some("inject") => {
                    CallbackPlan::event("postinstall_inject", Reply::Render(Stage::OsBoot))
                }
                Some("end") => CallbackPlan::event("postinstall_end", Reply::Ok),
                Some("debug") => CallbackPlan::reply(Reply::Text("V".to_string())),
                _ => CallbackPlan::reply(Reply::Error),
            },
            other => {
                return Err(EngineError::NoCallbackFound(format!(
                    "Missing callback [{other}]"
                )));
            }
        };
        Ok(plan)
    }

    /// `network.(start..=end)[counter - 1]`
    fn assign_node_ip(&self, model: &ModelInstance) -> Option<String> {
        let start: u32 = model.meta("ip_range_start").parse().ok()?;
        let end: u32 = model.meta("ip_range_end").parse().ok()?;
        let offset = model.counter.checked_sub(1)?;
        let host = start.checked_add(offset).filter(|h| *h <= end)?;
        Some(format!("{}.{host}", model.meta("ip_range_network")))
    }
}
