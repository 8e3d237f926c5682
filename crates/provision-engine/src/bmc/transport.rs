//! IPMI transport
//!
//! The adapter only needs raw text back from a BMC. `IpmitoolTransport`
//! runs `ipmitool` over lanplus with the password in the environment.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::EngineError;

/// A BMC address and its credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpmiTarget {
    /// BMC address
    pub host: String,
    pub username: String,
    pub password: String,
}

/// Raw command access to a BMC
#[async_trait::async_trait]
pub trait IpmiTransport: Send + Sync {
    /// Runs one ipmitool-style command (`["chassis", "power", "status"]`)
    /// and returns its standard output
    async fn run(&self, target: &IpmiTarget, args: &[&str]) -> Result<String, EngineError>;
}

/// [`IpmiTransport`] running `ipmitool -I lanplus`
#[derive(Debug, Clone)]
pub struct IpmitoolTransport {
    timeout: Duration,
}

impl IpmitoolTransport {
    /// `timeout` bounds each ipmitool run
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait::async_trait]
impl IpmiTransport for IpmitoolTransport {
    async fn run(&self, target: &IpmiTarget, args: &[&str]) -> Result<String, EngineError> {
        debug!("ipmitool -H {} {}", target.host, args.join(" "));
        let child = Command::new("ipmitool")
            .args(["-I", "lanplus", "-H", &target.host, "-U", &target.username, "-E"])
            .args(args)
            .env("IPMI_PASSWORD", &target.password)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::CommandFailed(format!("cannot start ipmitool: {e}")))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                EngineError::CommandFailed(format!(
                    "ipmitool {} timed out after {:?}",
                    args.join(" "),
                    self.timeout
                ))
            })?
            .map_err(|e| EngineError::CommandFailed(e.to_string()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(EngineError::CommandFailed(format!(
                "ipmitool {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}
