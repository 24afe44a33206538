//! Server start command construction

use crate::config::PersistenceMode;
use crate::derive::InstanceConfig;

/// Build the detached start command for one instance
///
/// Flag order is fixed so identical configs always produce identical
/// commands.
pub fn build_start_command(redis_dir: &str, backup_dir: &str, instance: &InstanceConfig) -> String {
    let args = server_args(backup_dir, instance);
    format!(
        "nohup sudo {redis_dir}/src/redis-server {} &> /dev/null &",
        args.join(" ")
    )
}

/// Command-line flags for one instance, in their fixed order
pub fn server_args(backup_dir: &str, instance: &InstanceConfig) -> Vec<String> {
    let port = instance.port;
    let mut args = vec![format!("--port {port}"), "--protected-mode no".to_string()];

    if instance.persistence_mode == PersistenceMode::AppendOnly {
        args.push("--appendonly yes".to_string());
        args.push(format!("--appendfilename backup_{port}"));
        args.push(format!("--dir {backup_dir}"));
    }

    if let Some(io_threads) = instance.io_threads {
        // MADV_FREE/fork arm64 kernel bug check refuses to start otherwise
        args.push("--ignore-warnings ARM64-COW-BUG".to_string());
        args.push(format!("--io-threads {io_threads}"));
    }

    if !instance.snapshots_enabled {
        args.push("--save \"\"".to_string());
    }

    if instance.io_threads_do_reads {
        args.push("--io-threads-do-reads yes".to_string());
    }

    if let Some(cpus) = &instance.cpu_affinity {
        args.push(format!("--server_cpulist {}-{}", cpus.start(), cpus.end()));
    }

    if let Some(policy) = instance.eviction_policy {
        args.push(format!("--maxmemory-policy {policy}"));
    }

    args.push(format!("--maxmemory {}kb", instance.max_memory_kb));
    args
}

/// Command that stops one instance without persisting
pub fn build_shutdown_command(redis_dir: &str, port: u16) -> String {
    format!("{redis_dir}/src/redis-cli -p {port} shutdown nosave")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvictionPolicy;

    fn instance() -> InstanceConfig {
        InstanceConfig {
            port: 6379,
            io_threads: None,
            io_threads_do_reads: false,
            cpu_affinity: None,
            max_memory_kb: 900,
            eviction_policy: None,
            persistence_mode: PersistenceMode::None,
            snapshots_enabled: true,
        }
    }

    #[test]
    fn test_minimal_command() {
        let cmd = build_start_command("/opt/pkb/redis", "/scratch", &instance());
        assert_eq!(
            cmd,
            "nohup sudo /opt/pkb/redis/src/redis-server --port 6379 --protected-mode no \
             --maxmemory 900kb &> /dev/null &"
        );
    }

    #[test]
    fn test_all_flags_in_order() {
        let full = InstanceConfig {
            port: 6380,
            io_threads: Some(3),
            io_threads_do_reads: true,
            cpu_affinity: Some(0..=7),
            max_memory_kb: 1024,
            eviction_policy: Some(EvictionPolicy::AllkeysLru),
            persistence_mode: PersistenceMode::AppendOnly,
            snapshots_enabled: false,
        };

        assert_eq!(
            server_args("/scratch", &full),
            vec![
                "--port 6380",
                "--protected-mode no",
                "--appendonly yes",
                "--appendfilename backup_6380",
                "--dir /scratch",
                "--ignore-warnings ARM64-COW-BUG",
                "--io-threads 3",
                "--save \"\"",
                "--io-threads-do-reads yes",
                "--server_cpulist 0-7",
                "--maxmemory-policy allkeys-lru",
                "--maxmemory 1024kb",
            ]
        );
    }

    #[test]
    fn test_snapshot_mode_has_no_aof_flags() {
        let snap = InstanceConfig {
            persistence_mode: PersistenceMode::Snapshot,
            ..instance()
        };
        let args = server_args("/scratch", &snap);
        assert!(!args.iter().any(|a| a.starts_with("--appendonly")));
        assert!(!args.iter().any(|a| a.starts_with("--save")));
    }

    #[test]
    fn test_deterministic() {
        let a = build_start_command("/r", "/b", &instance());
        let b = build_start_command("/r", "/b", &instance());
        assert_eq!(a, b);
    }

    #[test]
    fn test_shutdown_command() {
        assert_eq!(
            build_shutdown_command("/opt/pkb/redis", 6381),
            "/opt/pkb/redis/src/redis-cli -p 6381 shutdown nosave"
        );
    }
}
