//! BMC power control
//!
//! Out-of-band queries and power changes against a node's BMC. Raw ipmitool
//! text is turned into key/value maps and a structured [`PowerOutcome`];
//! the vocabulary of ipmitool's power replies lives in
//! [`PowerPatterns::classify`] and nowhere else.

pub mod transport;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use provision_model::{Bmc, UNKNOWN_POWER_STATE};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::EngineError;

pub use transport::{IpmiTarget, IpmiTransport, IpmitoolTransport};

/// Read-only BMC queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpmiQuery {
    PowerStatus,
    BmcInfo,
    BmcGetEnables,
    BmcGuid,
    ChassisStatus,
    LanPrint,
    FruPrint,
}

impl IpmiQuery {
    /// Every query, in admin listing order
    pub const ALL: [Self; 7] = [
        Self::PowerStatus,
        Self::BmcInfo,
        Self::BmcGetEnables,
        Self::BmcGuid,
        Self::ChassisStatus,
        Self::LanPrint,
        Self::FruPrint,
    ];

    /// Name used in admin output
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PowerStatus => "power_status",
            Self::BmcInfo => "bmc_info",
            Self::BmcGetEnables => "bmc_getenables",
            Self::BmcGuid => "bmc_guid",
            Self::ChassisStatus => "chassis_status",
            Self::LanPrint => "lan_print",
            Self::FruPrint => "fru_print",
        }
    }

    /// ipmitool arguments for the query
    pub const fn args(self) -> &'static [&'static str] {
        match self {
            Self::PowerStatus => &["chassis", "power", "status"],
            Self::BmcInfo => &["mc", "info"],
            Self::BmcGetEnables => &["mc", "getenables"],
            Self::BmcGuid => &["mc", "guid"],
            Self::ChassisStatus => &["chassis", "status"],
            Self::LanPrint => &["lan", "print"],
            Self::FruPrint => &["fru", "print"],
        }
    }

    /// Maps an admin `sub_command action` pair (`power status`, `get info`,
    /// `lan print`, ...) to a query
    pub fn from_subcommand(sub_command: &str, action: &str) -> Result<Self, EngineError> {
        match (sub_command, action) {
            ("power", "status") => Ok(Self::PowerStatus),
            ("get", "info") => Ok(Self::BmcInfo),
            ("get", "enables") => Ok(Self::BmcGetEnables),
            ("get", "guid") => Ok(Self::BmcGuid),
            ("get", "chassis_status") => Ok(Self::ChassisStatus),
            ("lan", "print") => Ok(Self::LanPrint),
            ("fru", "print") => Ok(Self::FruPrint),
            _ => Err(EngineError::InputError(format!(
                "the BMC sub-command '{sub_command} {action}' is not recognized"
            ))),
        }
    }
}

impl FromStr for IpmiQuery {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| EngineError::InputError(format!("Unknown BMC query '{s}'")))
    }
}

/// Requested power state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerTarget {
    On,
    Off,
    Cycle,
    Reset,
}

impl PowerTarget {
    /// ipmitool `chassis power` argument
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Cycle => "cycle",
            Self::Reset => "reset",
        }
    }
}

impl FromStr for PowerTarget {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "cycle" => Ok(Self::Cycle),
            "reset" => Ok(Self::Reset),
            other => Err(EngineError::CommandFailed(format!(
                "Unrecognized new_state '{other}'; must be one of (on|off|cycle|reset)"
            ))),
        }
    }
}

impl fmt::Display for PowerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified result of a power change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerOutcome {
    /// Power-on accepted
    NowOn,
    AlreadyOn,
    /// Power-off accepted
    NowOff,
    AlreadyOff,
    NowCycling,
    NowResetting,
    /// Cycle or reset asked of a node that is off
    PoweredOff(PowerTarget),
    /// The BMC reply did not confirm the change
    Failed(PowerTarget),
}

impl PowerOutcome {
    /// False for refused or failed changes
    pub const fn is_success(self) -> bool {
        !matches!(self, Self::PoweredOff(_) | Self::Failed(_))
    }

    /// Operator-facing message naming the BMC
    pub fn message(self, bmc_uuid: &str) -> String {
        match self {
            Self::NowOn => format!("node '{bmc_uuid}' now powering on"),
            Self::AlreadyOn => format!("node '{bmc_uuid}' already powered on"),
            // reset reports like a power-off
            Self::NowOff | Self::NowResetting => format!("node '{bmc_uuid}' now powering off"),
            Self::AlreadyOff => format!("node '{bmc_uuid}' already powered off"),
            Self::NowCycling => format!("node '{bmc_uuid}' now power cycling"),
            Self::PoweredOff(PowerTarget::Cycle) => {
                format!("node '{bmc_uuid}' powered off, cannot power cycle")
            }
            Self::PoweredOff(_) => format!("node '{bmc_uuid}' powered off, cannot reset"),
            Self::Failed(PowerTarget::On) => format!("attempt to power on node '{bmc_uuid}' failed"),
            Self::Failed(PowerTarget::Off) => format!("attempt to power off node '{bmc_uuid}' failed"),
            Self::Failed(PowerTarget::Cycle) => {
                format!("attempt to power cycle node '{bmc_uuid}' failed")
            }
            Self::Failed(PowerTarget::Reset) => format!("attempt to reset node '{bmc_uuid}' failed"),
        }
    }
}

/// ipmitool power reply vocabulary
#[derive(Debug, Clone)]
pub struct PowerPatterns {
    up_on: Regex,
    down_off: Regex,
    off: Regex,
    cycle: Regex,
    reset: Regex,
}

impl PowerPatterns {
    /// Compiles the reply patterns
    pub fn new() -> Result<Self, EngineError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| EngineError::Internal(format!("bad power pattern: {e}")))
        };
        Ok(Self {
            up_on: compile(r"Up/On")?,
            down_off: compile(r"Down/Off")?,
            off: compile(r"Off")?,
            cycle: compile(r"Cycle")?,
            reset: compile(r"Reset")?,
        })
    }

    /// `changed` is false when the BMC was already in the requested state
    /// (or, for cycle and reset, when the node was off and nothing ran)
    pub fn classify(&self, target: PowerTarget, changed: bool, status: &str) -> PowerOutcome {
        match target {
            PowerTarget::On if self.up_on.is_match(status) => {
                if changed { PowerOutcome::NowOn } else { PowerOutcome::AlreadyOn }
            }
            PowerTarget::Off if self.down_off.is_match(status) => {
                if changed { PowerOutcome::NowOff } else { PowerOutcome::AlreadyOff }
            }
            PowerTarget::Cycle if changed && self.cycle.is_match(status) => PowerOutcome::NowCycling,
            PowerTarget::Reset if changed && self.reset.is_match(status) => PowerOutcome::NowResetting,
            PowerTarget::Cycle | PowerTarget::Reset if !changed && self.off.is_match(status) => {
                PowerOutcome::PoweredOff(target)
            }
            _ => PowerOutcome::Failed(target),
        }
    }
}

/// Parses `Key : value` lines; keys have spaces replaced by underscores
/// (`Board Serial` becomes `Board_Serial`). Continuation lines and repeated
/// keys keep the first value.
pub fn parse_key_values(output: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        fields
            .entry(key.split_whitespace().collect::<Vec<_>>().join("_"))
            .or_insert_with(|| value.trim().to_string());
    }
    fields
}

/// `Chassis Power is on` → `on`
pub fn parse_power_status(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("Chassis Power is "))
        .map(|state| state.trim().to_lowercase())
}

/// BMC adapter over an [`IpmiTransport`]
#[derive(Clone)]
pub struct BmcAdapter {
    transport: Arc<dyn IpmiTransport>,
    username: String,
    password: String,
    patterns: PowerPatterns,
}

impl fmt::Debug for BmcAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BmcAdapter")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl BmcAdapter {
    /// Adapter using one set of BMC credentials for every node
    pub fn new(
        transport: Arc<dyn IpmiTransport>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            transport,
            username: username.into(),
            password: password.into(),
            patterns: PowerPatterns::new()?,
        })
    }

    fn target(&self, bmc: &Bmc) -> IpmiTarget {
        IpmiTarget {
            host: bmc.ip.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    /// Runs `query` and returns its fields. `power_status` answers
    /// `{"power_status": "on" | "off"}`.
    pub async fn query(&self, bmc: &Bmc, query: IpmiQuery) -> Result<BTreeMap<String, String>, EngineError> {
        let output = self.transport.run(&self.target(bmc), query.args()).await?;
        if query == IpmiQuery::PowerStatus {
            let state = parse_power_status(&output).ok_or_else(|| {
                EngineError::CommandFailed(format!("unexpected output '{}'", output.trim()))
            })?;
            return Ok(BTreeMap::from([(query.as_str().to_string(), state)]));
        }
        Ok(parse_key_values(&output))
    }

    pub async fn power_status(&self, bmc: &Bmc) -> Result<String, EngineError> {
        let mut fields = self.query(bmc, IpmiQuery::PowerStatus).await?;
        fields
            .remove(IpmiQuery::PowerStatus.as_str())
            .ok_or_else(|| EngineError::CommandFailed("power status missing".to_string()))
    }

    /// Moves the node to `new_state` and returns the success message.
    /// Failed or refused changes are `CommandFailed` carrying the message.
    pub async fn change_power_state(&self, bmc: &Bmc, new_state: &str) -> Result<String, EngineError> {
        let target: PowerTarget = new_state.parse()?;
        debug!("Changing power-state of bmc: {} to {}", bmc.uuid, target);
        let current = self.power_status(bmc).await?;
        let is_on = current == "on";

        let (changed, status) = match target {
            PowerTarget::On if is_on => (false, "Chassis Power Control: Up/On".to_string()),
            PowerTarget::Off if !is_on => (false, "Chassis Power Control: Down/Off".to_string()),
            PowerTarget::Cycle | PowerTarget::Reset if !is_on => {
                (false, "Chassis Power Control: Down/Off".to_string())
            }
            _ => {
                let args = ["chassis", "power", target.as_str()];
                (true, self.transport.run(&self.target(bmc), &args).await?)
            }
        };

        let outcome = self.patterns.classify(target, changed, &status);
        let message = outcome.message(&bmc.uuid);
        if outcome.is_success() {
            info!("{}", message);
            Ok(message)
        } else {
            warn!("{}", message);
            Err(EngineError::CommandFailed(message))
        }
    }

    /// Re-reads power state and board serial into `bmc`. A failed query
    /// leaves `unknown` and an empty serial.
    pub async fn refresh(&self, bmc: &mut Bmc) {
        bmc.current_power_state = match self.power_status(bmc).await {
            Ok(state) => state,
            Err(e) => {
                warn!("power status query for bmc {} failed: {}", bmc.uuid, e);
                UNKNOWN_POWER_STATE.to_string()
            }
        };
        bmc.board_serial_number = match self.query(bmc, IpmiQuery::FruPrint).await {
            Ok(mut fru) => fru.remove("Board_Serial").unwrap_or_default(),
            Err(e) => {
                warn!("fru query for bmc {} failed: {}", bmc.uuid, e);
                String::new()
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subcommand_mapping() {
        assert_eq!(IpmiQuery::from_subcommand("power", "status").unwrap(), IpmiQuery::PowerStatus);
        assert_eq!(IpmiQuery::from_subcommand("get", "guid").unwrap(), IpmiQuery::BmcGuid);
        assert_eq!(IpmiQuery::from_subcommand("fru", "print").unwrap(), IpmiQuery::FruPrint);
        assert!(IpmiQuery::from_subcommand("fru", "status").is_err());
    }

    #[test]
    fn test_parse_key_values_normalizes_keys() {
        let out = "FRU Device Description : Builtin FRU Device (ID 0)\n Board Serial          : QTF3J0\n Board Serial          : second\n                        : MD5\n";
        let fields = parse_key_values(out);
        assert_eq!(fields.get("Board_Serial").map(String::as_str), Some("QTF3J0"));
        assert_eq!(
            fields.get("FRU_Device_Description").map(String::as_str),
            Some("Builtin FRU Device (ID 0)")
        );
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_parse_power_status() {
        assert_eq!(parse_power_status("Chassis Power is on\n").as_deref(), Some("on"));
        assert_eq!(parse_power_status("Chassis Power is Off").as_deref(), Some("off"));
        assert_eq!(parse_power_status("garbage"), None);
    }

    #[test]
    fn test_classify_power_outcomes() {
        let p = PowerPatterns::new().unwrap();
        let up = "Chassis Power Control: Up/On";
        let down = "Chassis Power Control: Down/Off";
        assert_eq!(p.classify(PowerTarget::On, true, up), PowerOutcome::NowOn);
        assert_eq!(p.classify(PowerTarget::On, false, up), PowerOutcome::AlreadyOn);
        assert_eq!(p.classify(PowerTarget::On, true, down), PowerOutcome::Failed(PowerTarget::On));
        assert_eq!(p.classify(PowerTarget::Off, false, down), PowerOutcome::AlreadyOff);
        assert_eq!(
            p.classify(PowerTarget::Cycle, true, "Chassis Power Control: Cycle"),
            PowerOutcome::NowCycling
        );
        assert_eq!(
            p.classify(PowerTarget::Cycle, false, down),
            PowerOutcome::PoweredOff(PowerTarget::Cycle)
        );
        assert_eq!(
            p.classify(PowerTarget::Reset, true, "Chassis Power Control: Cycle"),
            PowerOutcome::Failed(PowerTarget::Reset)
        );
    }

    #[test]
    fn test_outcome_messages() {
        assert_eq!(PowerOutcome::NowOn.message("b1"), "node 'b1' now powering on");
        assert_eq!(
            PowerOutcome::PoweredOff(PowerTarget::Reset).message("b1"),
            "node 'b1' powered off, cannot reset"
        );
        assert_eq!(
            PowerOutcome::Failed(PowerTarget::Cycle).message("b1"),
            "attempt to power cycle node 'b1' failed"
        );
    }

    #[test]
    fn test_unknown_target_message() {
        let err = "sideways".parse::<PowerTarget>().unwrap_err();
        assert_eq!(err.kind(), "command_failed");
        assert!(err.to_string().contains("must be one of (on|off|cycle|reset)"));
    }
}
