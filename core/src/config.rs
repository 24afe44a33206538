//! Benchmark configuration types
//!
//! A single [`BenchmarkConfig`] is built once at start-up (defaults merged
//! with the user document by [`BenchmarkConfig::merged`]) and passed by
//! reference to every component.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BenchError, BenchResult};

/// Default port of the first server instance
pub const DEFAULT_PORT: u16 = 6379;

/// Eviction policy applied when an instance reaches its memory ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Reject writes once full
    #[serde(rename = "noeviction")]
    NoEviction,
    /// Evict least recently used keys
    AllkeysLru,
    /// Evict least recently used keys with an expiry set
    VolatileLru,
    /// Evict random keys
    AllkeysRandom,
    /// Evict random keys with an expiry set
    VolatileRandom,
    /// Evict keys with the nearest expiry
    VolatileTtl,
}

impl EvictionPolicy {
    /// The value passed to `--maxmemory-policy`
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::NoEviction => "noeviction",
            EvictionPolicy::AllkeysLru => "allkeys-lru",
            EvictionPolicy::VolatileLru => "volatile-lru",
            EvictionPolicy::AllkeysRandom => "allkeys-random",
            EvictionPolicy::VolatileRandom => "volatile-random",
            EvictionPolicy::VolatileTtl => "volatile-ttl",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistence mode of a server instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistenceMode {
    /// No persistence
    None,
    /// Periodic RDB snapshots only
    Snapshot,
    /// Append-only file
    AppendOnly,
}

impl PersistenceMode {
    /// Expand the `aof` / `enable_snapshots` flags into a mode
    pub fn from_flags(aof: bool, enable_snapshots: bool) -> Self {
        if aof {
            PersistenceMode::AppendOnly
        } else if enable_snapshots {
            PersistenceMode::Snapshot
        } else {
            PersistenceMode::None
        }
    }
}

/// Server (store) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisServerConfig {
    /// Server version (git tag) to build
    pub version: String,

    /// Explicit I/O thread count; derived from the machine when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub io_threads: Option<u32>,

    /// Use I/O threads for reads as well as writes
    pub io_threads_do_reads: bool,

    /// Pin I/O threads to CPUs
    pub io_threads_cpu_affinity: bool,

    /// Keep the default snapshot policy instead of disabling it
    pub enable_snapshots: bool,

    /// Number of server processes: 0 derives it from the CPU count
    pub total_num_processes: i64,

    /// Eviction policy; `None` leaves the server default in place
    pub eviction_policy: Option<EvictionPolicy>,

    /// Append-only persistence to the backup directory
    pub aof: bool,

    /// Port of the first instance; instance `i` listens on `base_port + i`
    pub base_port: u16,

    /// Directory the server source tree is cloned into
    pub install_dir: String,

    /// Directory append-only files are written to
    pub backup_dir: String,
}

impl Default for RedisServerConfig {
    fn default() -> Self {
        Self {
            version: "6.2.1".to_string(),
            io_threads: None,
            io_threads_do_reads: false,
            io_threads_cpu_affinity: false,
            enable_snapshots: false,
            total_num_processes: 1,
            eviction_policy: Some(EvictionPolicy::NoEviction),
            aof: false,
            base_port: DEFAULT_PORT,
            install_dir: "/opt/pkb".to_string(),
            backup_dir: "/scratch".to_string(),
        }
    }
}

impl RedisServerConfig {
    /// Persistence mode expanded from the bool flags
    pub fn persistence_mode(&self) -> PersistenceMode {
        PersistenceMode::from_flags(self.aof, self.enable_snapshots)
    }

    /// Directory holding the built server
    pub fn redis_dir(&self) -> String {
        format!("{}/redis", self.install_dir)
    }
}

/// Load generator (memtier_benchmark) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemtierConfig {
    /// Wire protocol
    pub protocol: String,

    /// Pipeline depths to sweep
    pub pipelines: Vec<u32>,

    /// Thread counts to sweep
    pub threads: Vec<u32>,

    /// Clients-per-thread counts to sweep
    pub clients: Vec<u32>,

    /// Set:Get ratio for the measured run
    pub ratio: String,

    /// Object size in bytes
    pub data_size: u32,

    /// Key pattern for the measured run
    pub key_pattern: String,

    /// Smallest key id
    pub key_minimum: u64,

    /// Largest key id
    pub key_maximum: u64,

    /// Requests per client when no run duration is set
    pub requests: u64,

    /// Run each sweep point for this many seconds instead of a request count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_duration_secs: Option<u64>,

    /// Pipeline depth used while preloading
    pub load_pipeline: u32,

    /// Directory the load generator source tree is cloned into
    pub install_dir: String,
}

impl Default for MemtierConfig {
    fn default() -> Self {
        Self {
            protocol: "redis".to_string(),
            pipelines: vec![1],
            threads: vec![4],
            clients: vec![50],
            ratio: "1:9".to_string(),
            data_size: 1024,
            key_pattern: "R:R".to_string(),
            key_minimum: 1,
            key_maximum: 10_000_000,
            requests: 10_000,
            run_duration_secs: None,
            load_pipeline: 100,
            install_dir: "/opt/pkb".to_string(),
        }
    }
}

/// Spec for one group of machines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmGroupSpec {
    /// Number of machines in the group
    pub vm_count: usize,

    /// Machine type override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,

    /// OS type override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,

    /// Attached scratch disks
    pub disk_count: usize,
}

impl Default for VmGroupSpec {
    fn default() -> Self {
        Self {
            vm_count: 1,
            machine_type: None,
            os_type: None,
            disk_count: 1,
        }
    }
}

/// Server and client machine groups
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmGroups {
    /// Store servers (exactly one is supported)
    pub servers: VmGroupSpec,
    /// Load generator clients
    pub clients: VmGroupSpec,
}

impl Default for VmGroups {
    fn default() -> Self {
        Self {
            servers: VmGroupSpec::default(),
            clients: VmGroupSpec {
                disk_count: 0,
                ..VmGroupSpec::default()
            },
        }
    }
}

/// Full benchmark configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Store server settings
    pub server: RedisServerConfig,

    /// Load generator settings
    pub memtier: MemtierConfig,

    /// Sample server CPU idle time during the run
    pub measure_cpu: bool,

    /// Machine group specs
    pub vm_groups: VmGroups,

    /// Client OS type override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_os_type: Option<String>,

    /// Server OS type override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_os_type: Option<String>,

    /// Client machine type override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_machine_type: Option<String>,

    /// Server machine type override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_machine_type: Option<String>,
}

impl BenchmarkConfig {
    /// Merge a user document over the defaults and apply group overrides
    ///
    /// Objects are merged recursively; any other value in `user` replaces
    /// the default outright.
    pub fn merged(user: Value) -> BenchResult<Self> {
        let mut base = serde_json::to_value(BenchmarkConfig::default())?;
        merge_json(&mut base, user);
        let mut config: BenchmarkConfig = serde_json::from_value(base)
            .map_err(|e| BenchError::config(format!("invalid benchmark config: {e}")))?;
        config.apply_overrides();
        Ok(config)
    }

    /// Push the top-level os/machine type overrides into the group specs
    pub fn apply_overrides(&mut self) {
        if let Some(os) = &self.client_os_type {
            self.vm_groups.clients.os_type = Some(os.clone());
        }
        if let Some(os) = &self.server_os_type {
            self.vm_groups.servers.os_type = Some(os.clone());
        }
        if let Some(mt) = &self.client_machine_type {
            self.vm_groups.clients.machine_type = Some(mt.clone());
        }
        if let Some(mt) = &self.server_machine_type {
            self.vm_groups.servers.machine_type = Some(mt.clone());
        }
        if !self.server.aof {
            self.vm_groups.servers.disk_count = 0;
        }
    }

    /// Validate user-supplied values before any remote work starts
    pub fn validate(&self) -> BenchResult<()> {
        if self.server.total_num_processes < 0 {
            return Err(BenchError::config(format!(
                "total_num_processes must be >= 0, got {}",
                self.server.total_num_processes
            )));
        }

        for (name, values) in [
            ("pipelines", &self.memtier.pipelines),
            ("threads", &self.memtier.threads),
            ("clients", &self.memtier.clients),
        ] {
            if values.is_empty() {
                return Err(BenchError::config(format!(
                    "memtier {name} must list at least one value"
                )));
            }
            if values.contains(&0) {
                return Err(BenchError::config(format!(
                    "memtier {name} values must be positive"
                )));
            }
        }

        if self.measure_cpu && self.memtier.run_duration_secs.is_none() {
            return Err(BenchError::config(
                "measure_cpu requires memtier.run_duration_secs",
            ));
        }

        Ok(())
    }
}

fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.server.version, "6.2.1");
        assert_eq!(config.server.total_num_processes, 1);
        assert_eq!(config.server.base_port, 6379);
        assert_eq!(
            config.server.eviction_policy,
            Some(EvictionPolicy::NoEviction)
        );
        assert_eq!(config.memtier.data_size, 1024);
        assert!(!config.measure_cpu);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merged_keeps_unset_defaults() {
        let config = BenchmarkConfig::merged(json!({
            "server": { "total_num_processes": 4, "aof": true },
            "memtier": { "pipelines": [1, 8] }
        }))
        .unwrap();

        assert_eq!(config.server.total_num_processes, 4);
        assert!(config.server.aof);
        assert_eq!(config.server.version, "6.2.1");
        assert_eq!(config.memtier.pipelines, vec![1, 8]);
        assert_eq!(config.memtier.threads, vec![4]);
        assert_eq!(config.vm_groups.servers.disk_count, 1);
    }

    #[test]
    fn test_merged_applies_overrides() {
        let config = BenchmarkConfig::merged(json!({
            "client_machine_type": "n2-standard-8",
            "server_os_type": "ubuntu2204"
        }))
        .unwrap();

        assert_eq!(
            config.vm_groups.clients.machine_type.as_deref(),
            Some("n2-standard-8")
        );
        assert_eq!(
            config.vm_groups.servers.os_type.as_deref(),
            Some("ubuntu2204")
        );
        // No append-only persistence, so no server disks
        assert_eq!(config.vm_groups.servers.disk_count, 0);
    }

    #[test]
    fn test_merged_rejects_unknown_eviction_policy() {
        let result = BenchmarkConfig::merged(json!({
            "server": { "eviction_policy": "most-recent" }
        }));
        assert!(matches!(result, Err(BenchError::Configuration(_))));
    }

    #[test]
    fn test_validation_negative_process_count() {
        let mut config = BenchmarkConfig::default();
        config.server.total_num_processes = -1;
        assert!(matches!(
            config.validate(),
            Err(BenchError::Configuration(_))
        ));
    }

    #[test]
    fn test_validation_empty_sweep_dimension() {
        let mut config = BenchmarkConfig::default();
        config.memtier.threads.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_measure_cpu_needs_duration() {
        let mut config = BenchmarkConfig::default();
        config.measure_cpu = true;
        assert!(config.validate().is_err());

        config.memtier.run_duration_secs = Some(60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_eviction_policy_round_trip_names() {
        for policy in [
            EvictionPolicy::NoEviction,
            EvictionPolicy::AllkeysLru,
            EvictionPolicy::VolatileLru,
            EvictionPolicy::AllkeysRandom,
            EvictionPolicy::VolatileRandom,
            EvictionPolicy::VolatileTtl,
        ] {
            let json = serde_json::to_string(&policy).unwrap();
            assert_eq!(json, format!("\"{}\"", policy.as_str()));
            assert_eq!(serde_json::from_str::<EvictionPolicy>(&json).unwrap(), policy);
        }
    }

    #[test]
    fn test_persistence_mode_from_flags() {
        assert_eq!(
            PersistenceMode::from_flags(true, true),
            PersistenceMode::AppendOnly
        );
        assert_eq!(
            PersistenceMode::from_flags(false, true),
            PersistenceMode::Snapshot
        );
        assert_eq!(
            PersistenceMode::from_flags(false, false),
            PersistenceMode::None
        );
    }
}
