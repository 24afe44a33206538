//! Per-instance runtime parameter derivation
//!
//! Pure functions from [`MachineFacts`] and [`RedisServerConfig`] to the
//! port list and one [`InstanceConfig`] per port. Everything here runs once,
//! before any remote command that depends on it is issued.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{EvictionPolicy, PersistenceMode, RedisServerConfig};
use crate::error::{BenchError, BenchResult};
use crate::machine::MachineFacts;
use crate::sample::Metadata;
use crate::version::supports_io_threads;

/// Share of total machine memory handed to the instances combined
const MEMORY_SHARE_NUMERATOR: u64 = 9;
const MEMORY_SHARE_DENOMINATOR: u64 = 10;

/// Ordered instance ports: `base, base + 1, ..., base + n - 1`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSet(Vec<u16>);

impl PortSet {
    /// Ports for `count` instances starting at `base`
    ///
    /// Fails with a configuration error if the last port would exceed 65535.
    pub fn new(base: u16, count: u32) -> BenchResult<Self> {
        (0..count)
            .map(|i| {
                u16::try_from(i)
                    .ok()
                    .and_then(|offset| base.checked_add(offset))
                    .ok_or_else(|| {
                        BenchError::config(format!(
                            "{count} instances starting at port {base} exceed the port range"
                        ))
                    })
            })
            .collect::<BenchResult<Vec<_>>>()
            .map(Self)
    }

    /// Number of ports
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no ports
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the ports in order
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    /// Ports as a slice
    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }
}

/// Runtime parameters of one server instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Listening port
    pub port: u16,

    /// I/O thread count, `None` when the server version has no I/O threads
    pub io_threads: Option<u32>,

    /// Use I/O threads for reads
    pub io_threads_do_reads: bool,

    /// CPUs to pin I/O threads to
    pub cpu_affinity: Option<RangeInclusive<u32>>,

    /// Memory ceiling in KB
    pub max_memory_kb: u64,

    /// Eviction policy once the ceiling is hit
    pub eviction_policy: Option<EvictionPolicy>,

    /// Persistence mode
    pub persistence_mode: PersistenceMode,

    /// Keep the default snapshot policy
    pub snapshots_enabled: bool,
}

/// Number of server processes to run
///
/// An explicit count wins; 0 means one per usable CPU, which needs facts.
/// Without facts (before machines exist) 0 stays 0.
pub fn process_count(config: &RedisServerConfig, facts: Option<&MachineFacts>) -> BenchResult<u32> {
    let requested = config.total_num_processes;
    if requested < 0 {
        return Err(BenchError::config(format!(
            "total_num_processes must be >= 0, got {requested}"
        )));
    }
    if requested > 0 {
        return u32::try_from(requested)
            .map_err(|_| BenchError::config(format!("total_num_processes too large: {requested}")));
    }
    Ok(facts.map(|f| f.usable_cpus).unwrap_or(0))
}

/// I/O threads per instance: the explicit setting, else derived from topology
pub fn io_threads(config: &RedisServerConfig, facts: &MachineFacts) -> u32 {
    if let Some(n) = config.io_threads.filter(|n| *n > 0) {
        return n;
    }
    // Keep I/O threads within the number of physical cores.
    if facts.threads_per_core == 1 {
        facts.usable_cpus.saturating_sub(1)
    } else {
        facts.usable_cpus / 2
    }
}

/// Per-instance memory ceiling: floor(total * 0.9 / process_count)
pub fn max_memory_per_instance_kb(total_memory_kb: u64, process_count: u32) -> BenchResult<u64> {
    if process_count == 0 {
        return Err(BenchError::config(
            "process count must be at least 1 to partition memory",
        ));
    }
    let share = u128::from(total_memory_kb) * u128::from(MEMORY_SHARE_NUMERATOR);
    let per_instance =
        share / (u128::from(MEMORY_SHARE_DENOMINATOR) * u128::from(process_count));
    // per_instance <= total_memory_kb, so it fits back into u64
    Ok(per_instance as u64)
}

/// Everything derived for one server machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPlan {
    /// Server version the plan was derived for
    pub version: String,

    /// Number of instances
    pub process_count: u32,

    /// Instance ports
    pub ports: PortSet,

    /// One config per port, in port order
    pub instances: Vec<InstanceConfig>,
}

impl ServerPlan {
    /// Derive the plan for a machine
    ///
    /// Fails with a configuration error if the derived process count is 0.
    pub fn derive(config: &RedisServerConfig, facts: &MachineFacts) -> BenchResult<Self> {
        let process_count = process_count(config, Some(facts))?;
        if process_count == 0 {
            return Err(BenchError::config("derived process count is 0"));
        }

        let ports = PortSet::new(config.base_port, process_count)?;
        let max_memory_kb = max_memory_per_instance_kb(facts.total_memory_kb, process_count)?;
        let io_threads = supports_io_threads(&config.version).then(|| io_threads(config, facts));

        let cpu_affinity = if config.io_threads_cpu_affinity {
            if facts.cpu_affinity {
                Some(0..=facts.num_cpus.saturating_sub(1))
            } else {
                tracing::warn!("CPU affinity requested but not supported on the server");
                None
            }
        } else {
            None
        };

        let instances = ports
            .iter()
            .map(|port| InstanceConfig {
                port,
                io_threads,
                io_threads_do_reads: config.io_threads_do_reads,
                cpu_affinity: cpu_affinity.clone(),
                max_memory_kb,
                eviction_policy: config.eviction_policy,
                persistence_mode: config.persistence_mode(),
                snapshots_enabled: config.enable_snapshots,
            })
            .collect();

        tracing::debug!(
            process_count,
            max_memory_kb,
            io_threads = ?io_threads,
            "Derived server plan"
        );

        Ok(Self {
            version: config.version.clone(),
            process_count,
            ports,
            instances,
        })
    }

    /// Store metadata attached to every measured sample
    pub fn metadata(&self, config: &RedisServerConfig) -> Metadata {
        let io_threads = self
            .instances
            .first()
            .and_then(|i| i.io_threads)
            .unwrap_or(0);

        let mut metadata = Metadata::new();
        metadata.insert("redis_server_version".into(), json!(self.version));
        metadata.insert("redis_server_io_threads".into(), json!(io_threads));
        metadata.insert(
            "redis_server_io_threads_do_reads".into(),
            json!(config.io_threads_do_reads),
        );
        metadata.insert(
            "redis_server_io_threads_cpu_affinity".into(),
            json!(config.io_threads_cpu_affinity),
        );
        metadata.insert(
            "redis_server_enable_snapshots".into(),
            json!(config.enable_snapshots),
        );
        metadata.insert(
            "redis_server_num_processes".into(),
            json!(self.process_count),
        );
        metadata.insert("redis_aof".into(), json!(config.aof));
        metadata.insert(
            "redis_eviction_policy".into(),
            json!(config.eviction_policy.map(|p| p.as_str())),
        );
        metadata
    }
}
