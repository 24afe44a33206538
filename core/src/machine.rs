//! Machines and their resource facts

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};
use crate::traits::RemoteExecutor;

/// A remote machine commands can be issued on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    /// Display name used in logs and errors
    pub name: String,

    /// Address the orchestrator reaches the machine on
    pub address: String,

    /// Address other machines in the benchmark reach it on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_ip: Option<String>,

    /// Login user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Machine {
    /// Create a machine reachable at `address`
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            internal_ip: None,
            user: None,
        }
    }

    /// Set the internal address
    pub fn with_internal_ip(mut self, ip: impl Into<String>) -> Self {
        self.internal_ip = Some(ip.into());
        self
    }

    /// Set the login user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Internal address, falling back to the external one
    pub fn endpoint_ip(&self) -> &str {
        self.internal_ip.as_deref().unwrap_or(&self.address)
    }
}

/// Read-only resource snapshot of one machine
///
/// Captured once before derivation and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineFacts {
    /// Total memory in KB
    pub total_memory_kb: u64,

    /// Logical CPUs on the machine
    pub num_cpus: u32,

    /// CPUs available to the benchmark (affinity/cgroup restricted)
    pub usable_cpus: u32,

    /// Hardware threads per physical core
    pub threads_per_core: u32,

    /// Whether CPU affinity masks can be set
    pub cpu_affinity: bool,
}

impl MachineFacts {
    /// Probe a machine over the executor
    pub async fn probe(executor: &dyn RemoteExecutor, machine: &Machine) -> BenchResult<Self> {
        let meminfo = executor.execute(machine, "cat /proc/meminfo").await?;
        let usable = executor.execute(machine, "nproc").await?;
        let all = executor.execute(machine, "nproc --all").await?;
        let lscpu = executor.execute(machine, "lscpu").await?;
        let cpu_affinity = executor.try_execute(machine, "taskset -p $$").await;

        let facts = Self {
            total_memory_kb: parse_mem_total_kb(&meminfo.stdout)?,
            num_cpus: parse_count(&all.stdout, "nproc --all")?,
            usable_cpus: parse_count(&usable.stdout, "nproc")?,
            threads_per_core: parse_threads_per_core(&lscpu.stdout)?,
            cpu_affinity,
        };

        tracing::info!(
            machine = %machine.name,
            total_memory_kb = facts.total_memory_kb,
            num_cpus = facts.num_cpus,
            usable_cpus = facts.usable_cpus,
            threads_per_core = facts.threads_per_core,
            cpu_affinity = facts.cpu_affinity,
            "Probed machine facts"
        );

        Ok(facts)
    }
}

/// Extract `MemTotal` (kB) from `/proc/meminfo`
pub fn parse_mem_total_kb(meminfo: &str) -> BenchResult<u64> {
    let line = meminfo
        .lines()
        .find(|l| l.starts_with("MemTotal:"))
        .ok_or_else(|| BenchError::parse("MemTotal missing from /proc/meminfo"))?;

    let mut parts = line["MemTotal:".len()..].split_whitespace();
    let value = parts
        .next()
        .ok_or_else(|| BenchError::parse(format!("empty MemTotal line: {line:?}")))?;
    match parts.next() {
        Some("kB") | None => {}
        Some(unit) => {
            return Err(BenchError::parse(format!(
                "unexpected MemTotal unit {unit:?}"
            )))
        }
    }
    value
        .parse()
        .map_err(|_| BenchError::parse(format!("invalid MemTotal value {value:?}")))
}

/// Extract `Thread(s) per core` from `lscpu`
pub fn parse_threads_per_core(lscpu: &str) -> BenchResult<u32> {
    let value = lscpu
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(key, _)| key.trim() == "Thread(s) per core")
        .map(|(_, value)| value.trim())
        .ok_or_else(|| BenchError::parse("Thread(s) per core missing from lscpu output"))?;
    value
        .parse()
        .map_err(|_| BenchError::parse(format!("invalid threads per core {value:?}")))
}

fn parse_count(output: &str, what: &str) -> BenchResult<u32> {
    let trimmed = output.trim();
    match trimmed.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(BenchError::parse(format!(
            "`{what}` returned {trimmed:?}, expected a positive integer"
        ))),
    }
}
