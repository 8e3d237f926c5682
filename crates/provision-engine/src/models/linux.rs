//! Linux deployments
//!
//! openSUSE (autoyast) and RedHat-family (kickstart) installs share one
//! workflow; only the answer-file namespace and artifact differ.

use provision_model::{ModelInstance, State};
use regex::Regex;

use super::{CallbackPlan, MkDirective, ModelBehavior, Reply, answer_file_stage};
use crate::error::EngineError;
use crate::fsm::{BOOT_CALL, ELSE, MK_CALL, RESET, TransitionTable};
use crate::render::Stage;

const POSTINSTALL: &str = "postinstall";

#[derive(Debug, Clone)]
pub struct LinuxDeploy {
    /// `yast` or `kickstart`
    answer_ns: &'static str,
    answer_file: Stage,
    namespaces: &'static [&'static str],
    table: TransitionTable,
    ipv4: Regex,
}

impl LinuxDeploy {
    pub fn autoyast() -> Result<Self, EngineError> {
        Self::new("yast", Stage::Autoyast, &["yast", POSTINSTALL])
    }

    pub fn kickstart() -> Result<Self, EngineError> {
        Self::new("kickstart", Stage::Kickstart, &["kickstart", POSTINSTALL])
    }

    fn new(
        answer_ns: &'static str,
        answer_file: Stage,
        namespaces: &'static [&'static str],
    ) -> Result<Self, EngineError> {
        let ipv4 = Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b")
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(Self {
            answer_ns,
            answer_file,
            namespaces,
            table: table(answer_ns)?,
            ipv4,
        })
    }
}

fn table(ns: &str) -> Result<TransitionTable, EngineError> {
    let start = format!("{ns}_start");
    let file = format!("{ns}_file");
    let end = format!("{ns}_end");
    let timeout = format!("{ns}_timeout");
    TransitionTable::builder(State::Init)
        .state(
            State::Init,
            &[
                (MK_CALL, State::Init),
                (BOOT_CALL, State::Init),
                (start.as_str(), State::Preinstall),
                (file.as_str(), State::Init),
                (end.as_str(), State::Postinstall),
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
                (start.as_str(), State::Preinstall),
                (file.as_str(), State::Init),
                (end.as_str(), State::Postinstall),
                (timeout.as_str(), State::TimeoutError),
                ("error", State::ErrorCatch),
                (ELSE, State::Preinstall),
            ],
        )
        .state(
            State::Postinstall,
            &[
                (MK_CALL, State::Postinstall),
                (BOOT_CALL, State::Postinstall),
                (end.as_str(), State::Postinstall),
                ("source_fix", State::Postinstall),
                ("postinstall_inject", State::Postinstall),
                ("os_boot", State::OsComplete),
                ("post_error", State::ErrorCatch),
                ("post_timeout", State::TimeoutError),
                ("error", State::ErrorCatch),
                (ELSE, State::Postinstall),
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

impl ModelBehavior for LinuxDeploy {
    fn table(&self) -> &TransitionTable {
        &self.table
    }

    fn mk_directive(&self, state: State) -> MkDirective {
        match state {
            State::Init
            | State::Preinstall
            | State::Postinstall
            | State::OsComplete
            | State::BrokerCheck
            | State::BrokerFail
            | State::BrokerSuccess => MkDirective::Reboot,
            _ => MkDirective::Acknowledge,
        }
    }

    fn namespaces(&self) -> &'static [&'static str] {
        self.namespaces
    }

    fn callback(
        &self,
        namespace: &str,
        args: &[String],
        _model: &ModelInstance,
    ) -> Result<CallbackPlan, EngineError> {
        if namespace == self.answer_ns {
            return Ok(answer_file_stage(namespace, args, self.answer_file));
        }
        if namespace != POSTINSTALL {
            return Err(EngineError::NoCallbackFound(format!(
                "Missing callback [{namespace}]"
            )));
        }
        let plan = match args.first().map(String::as_str) {
            Some("inject") => CallbackPlan::event("postinstall_inject", Reply::Render(Stage::OsBoot)),
            Some("boot") => CallbackPlan::event("os_boot", Reply::Render(Stage::OsComplete)),
            Some("source_fix") => CallbackPlan::event("source_fix", Reply::Empty),
            Some("send_ips") => {
                let ip = args
                    .get(1)
                    .filter(|ip| self.ipv4.is_match(ip))
                    .cloned();
                CallbackPlan {
                    event: None,
                    reply: Reply::Empty,
                    node_ip: ip,
                }
            }
            Some(other) => CallbackPlan::event(other, Reply::Empty),
            None => CallbackPlan::reply(Reply::Error),
        };
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provision_model::ModelKind;
    use std::collections::BTreeMap;

    fn model() -> ModelInstance {
        ModelInstance::new(ModelKind::Opensuse12, "suse", "img", BTreeMap::new())
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_yast_end_from_preinstall_reaches_postinstall() {
        let suse = LinuxDeploy::autoyast().unwrap();
        let t = suse.table();
        assert_eq!(t.next_state(State::Preinstall, "yast_end"), Some(State::Postinstall));
        // unlisted event falls through to else
        assert_eq!(t.next_state(State::Postinstall, "timeout"), Some(State::Postinstall));
    }

    #[test]
    fn test_kickstart_table_uses_its_namespace() {
        let rh = LinuxDeploy::kickstart().unwrap();
        assert_eq!(
            rh.table().next_state(State::Init, "kickstart_start"),
            Some(State::Preinstall)
        );
        assert_eq!(rh.table().next_state(State::Init, "yast_start"), Some(State::Init));
    }

    #[test]
    fn test_answer_file_callbacks() {
        let suse = LinuxDeploy::autoyast().unwrap();
        let file = suse.callback("yast", &args(&["file"]), &model()).unwrap();
        assert_eq!(file.event.as_deref(), Some("yast_file"));
        assert_eq!(file.reply, Reply::Render(Stage::Autoyast));
        let bad = suse.callback("yast", &args(&["bogus"]), &model()).unwrap();
        assert_eq!(bad.reply, Reply::Error);
        assert!(bad.event.is_none());
    }

    #[test]
    fn test_send_ips_requires_ipv4() {
        let suse = LinuxDeploy::autoyast().unwrap();
        let ok = suse
            .callback(POSTINSTALL, &args(&["send_ips", "10.1.2.3"]), &model())
            .unwrap();
        assert_eq!(ok.node_ip.as_deref(), Some("10.1.2.3"));
        let bad = suse
            .callback(POSTINSTALL, &args(&["send_ips", "fe80::1"]), &model())
            .unwrap();
        assert!(bad.node_ip.is_none());
    }

    #[test]
    fn test_unknown_postinstall_stage_becomes_event() {
        let suse = LinuxDeploy::autoyast().unwrap();
        let plan = suse
            .callback(POSTINSTALL, &args(&["post_error"]), &model())
            .unwrap();
        assert_eq!(plan.event.as_deref(), Some("post_error"));
        assert_eq!(
            suse.table().next_state(State::Postinstall, "post_error"),
            Some(State::ErrorCatch)
        );
    }

    #[test]
    fn test_unknown_namespace() {
        let suse = LinuxDeploy::autoyast().unwrap();
        assert!(matches!(
            suse.callback("kickstart", &args(&["file"]), &model()),
            Err(EngineError::NoCallbackFound(_))
        ));
    }

    #[test]
    fn test_mk_directive() {
        let suse = LinuxDeploy::autoyast().unwrap();
        assert_eq!(suse.mk_directive(State::Init), MkDirective::Reboot);
        assert_eq!(suse.mk_directive(State::BrokerWait), MkDirective::Acknowledge);
        assert_eq!(suse.mk_directive(State::ErrorCatch), MkDirective::Acknowledge);
    }
}
