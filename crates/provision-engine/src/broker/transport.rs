//! SSH transport
//!
//! Brokers reach installed nodes over SSH. `OpenSshTransport` shells out to
//! the system `ssh` client (through `sshpass` when a password is given);
//! tests substitute an in-memory implementation.

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// ssh exits with this status when it cannot connect
const SSH_CONNECT_FAILURE: i32 = 255;

/// Failure talking to a node over SSH
#[derive(Debug, Error)]
pub enum SshError {
    /// Host unreachable, refused or timed out; worth retrying
    #[error("connection error: {0}")]
    Connection(String),

    /// Anything else
    #[error("ssh error: {0}")]
    Failed(String),
}

/// Where and as whom to log in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    /// Address or hostname
    pub host: String,
    pub username: String,
    /// Empty for key-based login
    pub password: String,
}

/// Exit status and output of a remote command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Remote exit status; `-1` when the command was killed by a signal
    pub exit_code: i32,
    /// Combined stdout and stderr
    pub output: String,
}

/// Remote file upload and command execution
#[async_trait::async_trait]
pub trait SshTransport: Send + Sync {
    /// Writes `contents` to `remote_path` on the target
    async fn upload(&self, target: &SshTarget, contents: &[u8], remote_path: &str) -> Result<(), SshError>;

    /// Runs `command` through the remote shell
    async fn exec(&self, target: &SshTarget, command: &str) -> Result<CommandOutput, SshError>;
}

/// [`SshTransport`] over the system `ssh` client
#[derive(Debug, Clone)]
pub struct OpenSshTransport {
    timeout: Duration,
}

impl OpenSshTransport {
    /// `timeout` bounds both the connect and each whole command
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command(&self, target: &SshTarget, remote: &str) -> Command {
        let mut cmd = if target.password.is_empty() {
            Command::new("ssh")
        } else {
            let mut c = Command::new("sshpass");
            c.arg("-e").arg("ssh").env("SSHPASS", &target.password);
            c
        };
        cmd.arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.timeout.as_secs().max(1)))
            .arg(format!("{}@{}", target.username, target.host))
            .arg(remote)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, stdin: Option<&[u8]>) -> Result<CommandOutput, SshError> {
        cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });
        let mut child = cmd
            .spawn()
            .map_err(|e| SshError::Failed(format!("cannot start ssh: {e}")))?;
        if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(bytes)
                .await
                .map_err(|e| SshError::Connection(format!("write to ssh failed: {e}")))?;
        }
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|e| SshError::Connection(format!("{e} after {:?}", self.timeout)))?
            .map_err(|e| SshError::Failed(e.to_string()))?;
        let exit_code = output.status.code().unwrap_or(-1);
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if exit_code == SSH_CONNECT_FAILURE {
            return Err(SshError::Connection(text.trim().to_string()));
        }
        Ok(CommandOutput {
            exit_code,
            output: text,
        })
    }
}

#[async_trait::async_trait]
impl SshTransport for OpenSshTransport {
    async fn upload(&self, target: &SshTarget, contents: &[u8], remote_path: &str) -> Result<(), SshError> {
        debug!("Uploading {} bytes to {}:{}", contents.len(), target.host, remote_path);
        let cmd = self.command(target, &format!("cat > '{remote_path}'"));
        let out = self.run(cmd, Some(contents)).await?;
        if out.exit_code == 0 {
            Ok(())
        } else {
            Err(SshError::Failed(format!(
                "upload to {remote_path} exited {}: {}",
                out.exit_code,
                out.output.trim()
            )))
        }
    }

    async fn exec(&self, target: &SshTarget, command: &str) -> Result<CommandOutput, SshError> {
        debug!("Executing on {}: {}", target.host, command);
        self.run(self.command(target, command), None).await
    }
}
