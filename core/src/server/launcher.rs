//! Server instance launch

use std::sync::Arc;

use crate::config::RedisServerConfig;
use crate::derive::{InstanceConfig, ServerPlan};
use crate::error::BenchResult;
use crate::machine::Machine;
use crate::traits::RemoteExecutor;

use super::command::{build_shutdown_command, build_start_command};

/// Multiplexed ssh sessions allowed per server process
const MUX_SESSIONS_PER_PROCESS: u32 = 10;

const SYSCTL_TUNING: &str = "vm.overcommit_memory = 1\nnet.core.somaxconn = 65535\n";

/// Outcome of the best-effort machine tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuningReport {
    /// Connection multiplexing limit raised
    pub mux_sessions: bool,
    /// Kernel sysctls written and committed
    pub sysctl: bool,
}

impl TuningReport {
    /// True if every tuning step succeeded
    pub fn all_applied(&self) -> bool {
        self.mux_sessions && self.sysctl
    }
}

/// Starts server instances on a machine
///
/// Instances are launched detached; readiness is left to the caller.
pub struct InstanceLauncher {
    executor: Arc<dyn RemoteExecutor>,
    redis_dir: String,
    backup_dir: String,
}

impl InstanceLauncher {
    /// Create a launcher for servers installed per `config`
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: &RedisServerConfig) -> Self {
        Self {
            executor,
            redis_dir: config.redis_dir(),
            backup_dir: config.backup_dir.clone(),
        }
    }

    /// The start command for one instance
    pub fn start_command(&self, instance: &InstanceConfig) -> String {
        build_start_command(&self.redis_dir, &self.backup_dir, instance)
    }

    /// Apply machine-level tuning; failures are logged, never raised
    pub async fn tune(&self, machine: &Machine, process_count: u32) -> TuningReport {
        let mux_sessions = MUX_SESSIONS_PER_PROCESS * process_count;
        let mux_applied = self
            .executor
            .try_execute(
                machine,
                &format!(
                    "echo \"\nMaxSessions {mux_sessions}\" | sudo tee -a /etc/ssh/sshd_config"
                ),
            )
            .await;

        // Both halves are attempted even if the first fails; the commit
        // falls back to a PATH lookup where /usr/sbin/sysctl does not exist.
        let written = self
            .executor
            .try_execute(
                machine,
                &format!("echo \"{SYSCTL_TUNING}\" | sudo tee -a /etc/sysctl.conf"),
            )
            .await;
        let committed = self
            .executor
            .try_execute(machine, "sudo /usr/sbin/sysctl -p || sudo sysctl -p")
            .await;

        let report = TuningReport {
            mux_sessions: mux_applied,
            sysctl: written && committed,
        };
        if !report.all_applied() {
            tracing::info!(
                machine = %machine.name,
                mux_sessions = report.mux_sessions,
                sysctl = report.sysctl,
                "Failed to apply some server tuning, continuing"
            );
        }
        report
    }

    /// Tune the machine, then start one instance per planned port
    pub async fn start(&self, machine: &Machine, plan: &ServerPlan) -> BenchResult<TuningReport> {
        let report = self.tune(machine, plan.process_count).await;

        for instance in &plan.instances {
            let command = self.start_command(instance);
            tracing::debug!(machine = %machine.name, port = instance.port, "Starting instance");
            self.executor.execute(machine, &command).await?;
        }

        tracing::info!(
            machine = %machine.name,
            instances = plan.instances.len(),
            "Started server instances"
        );
        Ok(report)
    }

    /// Stop every instance in the plan; failures are logged
    pub async fn stop(&self, machine: &Machine, plan: &ServerPlan) {
        for port in plan.ports.iter() {
            let command = build_shutdown_command(&self.redis_dir, port);
            if !self.executor.try_execute(machine, &command).await {
                tracing::warn!(machine = %machine.name, port, "Failed to stop instance");
            }
        }
    }
}
