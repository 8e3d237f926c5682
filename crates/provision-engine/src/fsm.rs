//! Transition tables
//!
//! Each model family declares its install workflow as an explicit
//! `(state, event) -> state` table. Two event names are reserved:
//! `else` matches any event a state does not list, and `reset` rewinds a
//! terminal or error state to the initial state. Tables are validated when
//! built: every state needs an `else` arm and every target must be a
//! declared state.

use std::collections::{BTreeMap, HashMap};

use provision_model::State;

use crate::error::EngineError;

/// Fallback arm
pub const ELSE: &str = "else";
/// Administrative rewind
pub const RESET: &str = "reset";

/// Microkernel heartbeat event
pub const MK_CALL: &str = "mk_call";
/// Network boot event
pub const BOOT_CALL: &str = "boot_call";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    initial: State,
    arms: BTreeMap<State, HashMap<String, State>>,
}

impl TransitionTable {
    pub fn builder(initial: State) -> TableBuilder {
        TableBuilder {
            initial,
            arms: BTreeMap::new(),
        }
    }

    pub fn initial(&self) -> State {
        self.initial
    }

    pub fn is_declared(&self, state: State) -> bool {
        self.arms.contains_key(&state)
    }

    /// Target for `event` from `from`, falling back to the `else` arm.
    /// `None` only for a state the table does not declare.
    pub fn next_state(&self, from: State, event: &str) -> Option<State> {
        let arms = self.arms.get(&from)?;
        arms.get(event).or_else(|| arms.get(ELSE)).copied()
    }
}

#[derive(Debug, Clone)]
pub struct TableBuilder {
    initial: State,
    arms: BTreeMap<State, HashMap<String, State>>,
}

impl TableBuilder {
    /// Declares `state` with its arms; repeated calls merge
    #[must_use]
    pub fn state(mut self, state: State, arms: &[(&str, State)]) -> Self {
        let entry = self.arms.entry(state).or_default();
        for (event, target) in arms {
            entry.insert((*event).to_string(), *target);
        }
        self
    }

    /// Declares the broker hand-off states shared by every model
    #[must_use]
    pub fn with_broker_states(self) -> Self {
        let init = self.initial;
        let handoff = [
            ("broker_success", State::BrokerSuccess),
            ("broker_wait", State::BrokerWait),
            ("broker_fail", State::BrokerFail),
        ];
        self.state(State::BrokerCheck, &handoff)
            .state(State::BrokerCheck, &[(ELSE, State::BrokerCheck), (RESET, init)])
            .state(State::BrokerWait, &handoff)
            .state(State::BrokerWait, &[(ELSE, State::BrokerWait), (RESET, init)])
            .state(State::BrokerFail, &[(ELSE, State::BrokerFail), (RESET, init)])
            .state(State::BrokerSuccess, &[(ELSE, State::BrokerSuccess), (RESET, init)])
            .state(
                State::CompleteNoBroker,
                &[(ELSE, State::CompleteNoBroker), (RESET, init)],
            )
    }

    pub fn build(self) -> Result<TransitionTable, EngineError> {
        if !self.arms.contains_key(&self.initial) {
            return Err(EngineError::Internal(format!(
                "initial state {} is not declared",
                self.initial
            )));
        }
        for (state, arms) in &self.arms {
            if !arms.contains_key(ELSE) {
                return Err(EngineError::Internal(format!(
                    "state {state} has no else arm"
                )));
            }
            if let Some((event, target)) = arms.iter().find(|(_, t)| !self.arms.contains_key(*t)) {
                return Err(EngineError::Internal(format!(
                    "state {state} event {event} targets undeclared state {target}"
                )));
            }
        }
        Ok(TransitionTable {
            initial: self.initial,
            arms: self.arms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> TransitionTable {
        TransitionTable::builder(State::Init)
            .state(
                State::Init,
                &[("go", State::Preinstall), (ELSE, State::Init)],
            )
            .state(
                State::Preinstall,
                &[(ELSE, State::Preinstall), (RESET, State::Init)],
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_explicit_else_and_reset() {
        let table = small();
        assert_eq!(table.next_state(State::Init, "go"), Some(State::Preinstall));
        assert_eq!(table.next_state(State::Init, "whatever"), Some(State::Init));
        assert_eq!(table.next_state(State::Preinstall, RESET), Some(State::Init));
        assert_eq!(table.next_state(State::OsComplete, "go"), None);
    }

    #[test]
    fn test_replayed_event_lands_in_same_state() {
        let table = small();
        let once = table.next_state(State::Init, "go").unwrap();
        assert_eq!(once, State::Preinstall);
        // a late duplicate after the advance does not advance again
        assert_eq!(table.next_state(once, "go"), Some(State::Preinstall));
        assert_eq!(table.next_state(State::Init, "duplicate"), Some(State::Init));
        assert_eq!(table.next_state(State::Init, "duplicate"), Some(State::Init));
        assert_eq!(table.next_state(State::Preinstall, RESET), Some(State::Init));
        assert_eq!(table.next_state(State::Init, RESET), Some(State::Init));
    }

    #[test]
    fn test_missing_else_is_rejected() {
        let result = TransitionTable::builder(State::Init)
            .state(State::Init, &[("go", State::Init)])
            .build();
        assert!(matches!(result, Err(EngineError::Internal(msg)) if msg.contains("else")));
    }

    #[test]
    fn test_undeclared_target_is_rejected() {
        let result = TransitionTable::builder(State::Init)
            .state(State::Init, &[("go", State::OsComplete), (ELSE, State::Init)])
            .build();
        assert!(matches!(result, Err(EngineError::Internal(msg)) if msg.contains("undeclared")));
    }

    #[test]
    fn test_undeclared_initial_is_rejected() {
        let result = TransitionTable::builder(State::Init)
            .state(State::Preinstall, &[(ELSE, State::Preinstall)])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_broker_states() {
        let table = TransitionTable::builder(State::Init)
            .state(State::Init, &[(ELSE, State::Init)])
            .with_broker_states()
            .build()
            .unwrap();
        assert_eq!(
            table.next_state(State::BrokerCheck, "broker_wait"),
            Some(State::BrokerWait)
        );
        assert_eq!(
            table.next_state(State::BrokerWait, MK_CALL),
            Some(State::BrokerWait)
        );
        assert_eq!(
            table.next_state(State::BrokerWait, "broker_success"),
            Some(State::BrokerSuccess)
        );
        assert_eq!(table.next_state(State::BrokerFail, RESET), Some(State::Init));
    }
}
