//! redis-bench-remote: Command transports for redis-bench
//!
//! - [`SshExecutor`] runs commands through the system `ssh` client, so
//!   keys, agents and host configuration come from the usual ssh setup
//! - [`LocalExecutor`] runs commands through `sh -c` on this host

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use redis_bench_core::{BenchError, BenchResult, CommandOutput, Machine, RemoteExecutor};
use tokio::process::Command;

// ============================================================================
// SSH Executor
// ============================================================================

/// Runs commands over `ssh` in batch mode
#[derive(Debug, Clone, Default)]
pub struct SshExecutor {
    user: Option<String>,
    identity_file: Option<String>,
    connect_timeout: Option<Duration>,
    command_timeout: Option<Duration>,
}

impl SshExecutor {
    /// Executor using the ssh client defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Login user for machines that do not name one
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Private key passed with `-i`
    pub fn identity_file(mut self, path: impl Into<String>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Connection establishment timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Upper bound on a single command, transport included
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// `user@address`, or the bare address without a user
    pub fn destination(&self, machine: &Machine) -> String {
        match machine.user.as_ref().or(self.user.as_ref()) {
            Some(user) => format!("{user}@{}", machine.address),
            None => machine.address.clone(),
        }
    }

    /// Arguments passed to `ssh` for one command
    pub fn ssh_args(&self, machine: &Machine, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
        ];
        if let Some(timeout) = self.connect_timeout {
            args.push("-o".to_string());
            args.push(format!("ConnectTimeout={}", timeout.as_secs().max(1)));
        }
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.clone());
        }
        args.push(self.destination(machine));
        args.push("--".to_string());
        args.push(command.to_string());
        args
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    fn name(&self) -> &str {
        "ssh"
    }

    async fn execute(&self, machine: &Machine, command: &str) -> BenchResult<CommandOutput> {
        let mut ssh = Command::new("ssh");
        ssh.args(self.ssh_args(machine, command));
        run(ssh, machine, command, self.command_timeout).await
    }
}

// ============================================================================
// Local Executor
// ============================================================================

/// Runs every command on this host regardless of the target machine
///
/// Useful for single-host smoke runs where server and client share a box.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    command_timeout: Option<Duration>,
}

impl LocalExecutor {
    /// Executor without a command timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Upper bound on a single command
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    fn name(&self) -> &str {
        "local"
    }

    async fn execute(&self, machine: &Machine, command: &str) -> BenchResult<CommandOutput> {
        let mut sh = Command::new("sh");
        sh.arg("-c").arg(command);
        run(sh, machine, command, self.command_timeout).await
    }
}

// ============================================================================
// Process Handling
// ============================================================================

async fn run(
    mut process: Command,
    machine: &Machine,
    command: &str,
    timeout: Option<Duration>,
) -> BenchResult<CommandOutput> {
    process.kill_on_drop(true).stdin(std::process::Stdio::null());

    tracing::debug!(machine = %machine.name, command, "Executing");

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, process.output())
            .await
            .map_err(|_| {
                BenchError::remote(
                    &machine.name,
                    command,
                    format!("timed out after {}s", limit.as_secs_f64()),
                )
            })?,
        None => process.output().await,
    }
    .map_err(|e| BenchError::remote(&machine.name, command, format!("failed to spawn: {e}")))?;

    into_command_output(output, machine, command)
}

fn into_command_output(output: Output, machine: &Machine, command: &str) -> BenchResult<CommandOutput> {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let status = output
            .status
            .code()
            .map(|code| format!("exit status {code}"))
            .unwrap_or_else(|| "terminated by signal".to_string());
        let detail = stderr.trim();
        let message = if detail.is_empty() {
            status
        } else {
            format!("{status}: {detail}")
        };
        return Err(BenchError::remote(&machine.name, command, message));
    }

    Ok(CommandOutput { stdout, stderr })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> Machine {
        Machine::new("server-0", "203.0.113.10")
    }

    #[test]
    fn test_destination_prefers_machine_user() {
        let ssh = SshExecutor::new().user("bench");
        assert_eq!(ssh.destination(&machine()), "bench@203.0.113.10");
        assert_eq!(
            ssh.destination(&machine().with_user("ubuntu")),
            "ubuntu@203.0.113.10"
        );
        assert_eq!(SshExecutor::new().destination(&machine()), "203.0.113.10");
    }

    #[test]
    fn test_ssh_args() {
        let ssh = SshExecutor::new()
            .user("bench")
            .identity_file("/keys/id_ed25519")
            .connect_timeout(Duration::from_secs(10));

        assert_eq!(
            ssh.ssh_args(&machine(), "nproc"),
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "ConnectTimeout=10",
                "-i",
                "/keys/id_ed25519",
                "bench@203.0.113.10",
                "--",
                "nproc",
            ]
        );
    }

    #[tokio::test]
    async fn test_local_captures_output() {
        let output = LocalExecutor::new()
            .execute(&machine(), "echo out; echo err >&2")
            .await
            .unwrap();
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_local_nonzero_exit_is_remote_error() {
        let err = LocalExecutor::new()
            .execute(&machine(), "echo broken >&2; exit 3")
            .await
            .unwrap_err();

        match err {
            BenchError::RemoteExecution {
                machine,
                command,
                message,
            } => {
                assert_eq!(machine, "server-0");
                assert_eq!(command, "echo broken >&2; exit 3");
                assert_eq!(message, "exit status 3: broken");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_local_try_execute() {
        let local = LocalExecutor::new();
        assert!(local.try_execute(&machine(), "true").await);
        assert!(!local.try_execute(&machine(), "false").await);
    }

    #[tokio::test]
    async fn test_local_timeout() {
        let result = LocalExecutor::new()
            .command_timeout(Duration::from_millis(50))
            .execute(&machine(), "sleep 5")
            .await;
        assert!(matches!(result, Err(BenchError::RemoteExecution { .. })));
    }
}
