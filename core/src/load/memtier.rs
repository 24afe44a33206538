//! memtier_benchmark load generator
//!
//! Commands are issued through a [`RemoteExecutor`]; the measured run is
//! fanned out to every client at once and each client's "ALL STATS" table
//! is parsed into samples.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::config::MemtierConfig;
use crate::dispatch::Dispatcher;
use crate::error::{BenchError, BenchResult};
use crate::machine::Machine;
use crate::sample::{Metadata, Sample};
use crate::traits::{LoadGenerator, RemoteExecutor};

use super::sweep::SweepPoint;

/// Upstream source repository
pub const MEMTIER_GIT: &str = "https://github.com/RedisLabs/memtier_benchmark.git";

const MEMTIER_BIN: &str = "memtier_benchmark";

/// Table columns turned into samples: (column header, metric, unit, required)
const COLUMNS: &[(&str, &str, &str, bool)] = &[
    ("Ops/sec", "Ops Throughput", "ops/s", true),
    ("KB/sec", "KB Throughput", "KB/s", true),
    ("Avg. Latency", "Latency", "ms", false),
    ("Latency", "Latency", "ms", false),
    ("p50 Latency", "p50 Latency", "ms", false),
    ("p99 Latency", "p99 Latency", "ms", false),
    ("p99.9 Latency", "p99.9 Latency", "ms", false),
];

/// memtier_benchmark driven over a remote executor
pub struct Memtier {
    executor: Arc<dyn RemoteExecutor>,
    config: MemtierConfig,
}

impl Memtier {
    /// Create a generator with the given settings
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: MemtierConfig) -> Self {
        Self { executor, config }
    }

    fn memtier_dir(&self) -> String {
        format!("{}/memtier_benchmark", self.config.install_dir)
    }

    /// Preload command: every key in the range written once, in sequence
    pub fn load_command(&self, endpoint_ip: &str, port: u16) -> String {
        let c = &self.config;
        let args = [
            format!("-s {endpoint_ip}"),
            format!("-p {port}"),
            format!("-P {}", c.protocol),
            "-c 1".to_string(),
            "-t 1".to_string(),
            "--ratio 1:0".to_string(),
            "--key-pattern P:P".to_string(),
            format!("--key-minimum {}", c.key_minimum),
            format!("--key-maximum {}", c.key_maximum),
            format!("-d {}", c.data_size),
            format!("--pipeline {}", c.load_pipeline),
            "--requests allkeys".to_string(),
            "--hide-histogram".to_string(),
        ];
        format!("{MEMTIER_BIN} {}", args.join(" "))
    }

    /// Measurement command for one sweep point
    pub fn run_command(&self, point: &SweepPoint) -> String {
        let c = &self.config;
        let mut args = vec![
            format!("-s {}", point.endpoint.ip),
            format!("-p {}", point.endpoint.port),
            format!("-P {}", c.protocol),
            format!("-c {}", point.clients),
            format!("-t {}", point.threads),
            format!("--pipeline {}", point.pipeline),
            format!("--ratio {}", c.ratio),
            format!("--key-pattern {}", c.key_pattern),
            format!("--key-minimum {}", c.key_minimum),
            format!("--key-maximum {}", c.key_maximum),
            format!("-d {}", c.data_size),
        ];
        match c.run_duration_secs {
            Some(secs) => args.push(format!("--test-time {secs}")),
            None => args.push(format!("--requests {}", c.requests)),
        }
        args.push("--print-percentiles 50,99,99.9".to_string());
        args.push("--hide-histogram".to_string());
        format!("{MEMTIER_BIN} {}", args.join(" "))
    }

    fn point_metadata(&self, point: &SweepPoint, client_index: usize) -> Metadata {
        let c = &self.config;
        let mut metadata = Metadata::new();
        metadata.insert("memtier_protocol".into(), json!(c.protocol));
        metadata.insert("memtier_ratio".into(), json!(c.ratio));
        metadata.insert("memtier_data_size".into(), json!(c.data_size));
        metadata.insert("memtier_key_pattern".into(), json!(c.key_pattern));
        metadata.insert("memtier_key_maximum".into(), json!(c.key_maximum));
        match c.run_duration_secs {
            Some(secs) => metadata.insert("memtier_run_duration".into(), json!(secs)),
            None => metadata.insert("memtier_requests".into(), json!(c.requests)),
        };
        metadata.insert("pipeline".into(), json!(point.pipeline));
        metadata.insert("threads".into(), json!(point.threads));
        metadata.insert("clients".into(), json!(point.clients));
        metadata.insert("port".into(), json!(point.endpoint.port));
        metadata.insert("client_index".into(), json!(client_index));
        metadata
    }
}

#[async_trait]
impl LoadGenerator for Memtier {
    fn name(&self) -> &str {
        "memtier"
    }

    async fn install(&self, client: &Machine) -> BenchResult<()> {
        let install_dir = &self.config.install_dir;
        let memtier_dir = self.memtier_dir();

        tracing::info!(client = %client.name, "Installing memtier_benchmark");
        self.executor
            .execute(
                client,
                &format!("sudo mkdir -p {install_dir} && sudo chmod a+rwx {install_dir}"),
            )
            .await?;
        self.executor
            .execute(
                client,
                &format!("cd {install_dir} && rm -rf {memtier_dir} && git clone {MEMTIER_GIT}"),
            )
            .await?;
        self.executor
            .execute(
                client,
                &format!(
                    "cd {memtier_dir} && autoreconf -ivf && ./configure && make && sudo make install"
                ),
            )
            .await?;
        Ok(())
    }

    async fn load(&self, client: &Machine, endpoint_ip: &str, port: u16) -> BenchResult<()> {
        self.executor
            .execute(client, &self.load_command(endpoint_ip, port))
            .await?;
        Ok(())
    }

    async fn run(&self, clients: &[Machine], point: &SweepPoint) -> BenchResult<Vec<Sample>> {
        let command = self.run_command(point);
        let jobs: Vec<(usize, Machine)> = clients.iter().cloned().enumerate().collect();
        let executor = Arc::clone(&self.executor);

        let outputs = Dispatcher::new("memtier-run")
            .dispatch(jobs, move |(index, client)| {
                let executor = Arc::clone(&executor);
                let command = command.clone();
                async move {
                    let output = executor.execute(&client, &command).await?;
                    Ok((index, output.stdout))
                }
            })
            .await?;

        let mut samples = Vec::new();
        for (index, stdout) in outputs {
            let metadata = self.point_metadata(point, index);
            samples.extend(parse_all_stats(&stdout, &metadata)?);
        }
        Ok(samples)
    }
}

/// Parse the "ALL STATS" table's `Totals` row into samples
///
/// Fails if the table, its header or its `Totals` row is missing, or a
/// required column does not hold a number.
pub fn parse_all_stats(output: &str, metadata: &Metadata) -> BenchResult<Vec<Sample>> {
    let mut lines = output
        .lines()
        .skip_while(|line| line.trim() != "ALL STATS")
        .skip(1)
        .filter(|line| !line.trim().is_empty() && !line.starts_with("---") && !line.starts_with("==="));

    let header = lines
        .next()
        .ok_or_else(|| BenchError::parse("memtier output has no ALL STATS table"))?;
    let header: Vec<&str> = split_columns(header);
    if header.first() != Some(&"Type") {
        return Err(BenchError::parse(format!(
            "unexpected ALL STATS header: {header:?}"
        )));
    }

    let totals = lines
        .find(|line| line.starts_with("Totals"))
        .ok_or_else(|| BenchError::parse("ALL STATS table has no Totals row"))?;
    let values: Vec<&str> = totals.split_whitespace().collect();
    if values.len() != header.len() {
        return Err(BenchError::parse(format!(
            "Totals row has {} fields, header has {}",
            values.len(),
            header.len()
        )));
    }

    let mut samples = Vec::new();
    for &(column, metric, unit, required) in COLUMNS {
        let Some(position) = header.iter().position(|h| *h == column) else {
            if required {
                return Err(BenchError::parse(format!("ALL STATS has no {column} column")));
            }
            continue;
        };
        let value: f64 = values[position].parse().map_err(|_| {
            BenchError::parse(format!(
                "{column} value {:?} is not a number",
                values[position]
            ))
        })?;
        samples.push(Sample::new(metric, value, unit, metadata.clone()));
    }
    Ok(samples)
}

/// Split a header row on runs of two or more spaces
fn split_columns(line: &str) -> Vec<&str> {
    line.split("  ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::Endpoint;
    use crate::test_utils::{machines, MockExecutor};

    const OUTPUT: &str = "\
4         Threads
50        Connections per thread
10000     Requests per client


ALL STATS
============================================================================================================================
Type         Ops/sec     Hits/sec   Misses/sec    Avg. Latency     p50 Latency     p99 Latency   p99.9 Latency       KB/sec
----------------------------------------------------------------------------------------------------------------------------
Sets         1234.56          ---          ---         1.23400         1.10300         2.55900         3.00700       100.00
Gets        11111.11         0.00     11111.11         1.20000         1.09500         2.52700         2.99100       900.00
Waits           0.00          ---          ---             ---             ---             ---             ---          ---
Totals      12345.67         0.00     11111.11         1.22000         1.10300         2.55900         3.00700      1000.00
";

    fn point(port: u16) -> SweepPoint {
        SweepPoint {
            pipeline: 2,
            threads: 4,
            clients: 50,
            endpoint: Endpoint::new("10.0.0.9", port),
        }
    }

    #[test]
    fn test_parse_totals() {
        let samples = parse_all_stats(OUTPUT, &Metadata::new()).unwrap();
        let by_metric: Vec<(&str, f64, &str)> = samples
            .iter()
            .map(|s| (s.metric.as_str(), s.value, s.unit.as_str()))
            .collect();
        assert_eq!(
            by_metric,
            vec![
                ("Ops Throughput", 12345.67, "ops/s"),
                ("KB Throughput", 1000.0, "KB/s"),
                ("Latency", 1.22, "ms"),
                ("p50 Latency", 1.103, "ms"),
                ("p99 Latency", 2.559, "ms"),
                ("p99.9 Latency", 3.007, "ms"),
            ]
        );
    }

    #[test]
    fn test_parse_missing_table() {
        let err = parse_all_stats("connection refused", &Metadata::new()).unwrap_err();
        assert!(matches!(err, BenchError::Parse(_)));
    }

    #[test]
    fn test_parse_non_numeric_total() {
        let broken = OUTPUT.replace("12345.67", "n/a");
        assert!(matches!(
            parse_all_stats(&broken, &Metadata::new()),
            Err(BenchError::Parse(_))
        ));
    }

    #[test]
    fn test_run_command_uses_duration_when_set() {
        let executor = Arc::new(MockExecutor::new());
        let memtier = Memtier::new(
            executor,
            MemtierConfig {
                run_duration_secs: Some(60),
                ..Default::default()
            },
        );
        let cmd = memtier.run_command(&point(6380));
        assert!(cmd.starts_with("memtier_benchmark -s 10.0.0.9 -p 6380 -P redis -c 50 -t 4 --pipeline 2"));
        assert!(cmd.contains("--test-time 60"));
        assert!(!cmd.contains("--requests"));
    }

    #[test]
    fn test_load_command() {
        let memtier = Memtier::new(Arc::new(MockExecutor::new()), MemtierConfig::default());
        let cmd = memtier.load_command("10.0.0.9", 6379);
        assert!(cmd.contains("--ratio 1:0"));
        assert!(cmd.contains("--key-pattern P:P"));
        assert!(cmd.contains("--requests allkeys"));
        assert!(cmd.contains("--pipeline 100"));
    }

    #[tokio::test]
    async fn test_run_on_every_client() {
        let executor = Arc::new(MockExecutor::new().respond("memtier_benchmark", OUTPUT));
        let memtier = Memtier::new(executor.clone(), MemtierConfig::default());
        let clients = machines("client", 2);

        let samples = memtier.run(&clients, &point(6379)).await.unwrap();

        assert_eq!(samples.len(), 12);
        assert_eq!(samples[0].metadata["client_index"], 0);
        assert_eq!(samples[6].metadata["client_index"], 1);
        assert_eq!(samples[6].metadata["port"], 6379);
        let mut ran_on: Vec<String> = executor.calls().into_iter().map(|(m, _)| m).collect();
        ran_on.sort();
        assert_eq!(ran_on, vec!["client-0", "client-1"]);
    }

    #[tokio::test]
    async fn test_install_builds_from_source() {
        let executor = Arc::new(MockExecutor::new());
        let memtier = Memtier::new(executor.clone(), MemtierConfig::default());

        memtier.install(&machines("client", 1)[0]).await.unwrap();

        let calls = executor.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1].1.contains(MEMTIER_GIT));
        assert!(calls[2].1.ends_with("sudo make install"));
    }
}
