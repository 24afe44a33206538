//! Shared mocks for unit tests

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use crate::error::{BenchError, BenchResult};
use crate::load::SweepPoint;
use crate::machine::{Machine, MachineFacts};
use crate::sample::{Metadata, Sample};
use crate::traits::{CommandOutput, LoadGenerator, RemoteExecutor};

/// Executor that records every command and answers from a script
///
/// Responses and failures are matched by substring, first match wins.
/// Unmatched commands succeed with empty output.
#[derive(Default)]
pub(crate) struct MockExecutor {
    responses: Vec<(String, String)>,
    failures: Vec<String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(mut self, pattern: &str, stdout: &str) -> Self {
        self.responses.push((pattern.to_string(), stdout.to_string()));
        self
    }

    pub(crate) fn fail_on(mut self, pattern: &str) -> Self {
        self.failures.push(pattern.to_string());
        self
    }

    /// Script the probe commands of [`MachineFacts::probe`]
    pub(crate) fn with_facts(self, facts: MachineFacts) -> Self {
        self.respond(
            "cat /proc/meminfo",
            &format!("MemTotal:       {} kB\n", facts.total_memory_kb),
        )
        .respond("nproc --all", &format!("{}\n", facts.num_cpus))
        .respond("nproc", &format!("{}\n", facts.usable_cpus))
        .respond(
            "lscpu",
            &format!("Thread(s) per core:  {}\n", facts.threads_per_core),
        )
    }

    /// (machine name, command) pairs in issue order
    pub(crate) fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn commands_matching(&self, pattern: &str) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter(|(_, cmd)| cmd.contains(pattern))
            .collect()
    }
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, machine: &Machine, command: &str) -> BenchResult<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((machine.name.clone(), command.to_string()));

        if self.failures.iter().any(|p| command.contains(p.as_str())) {
            return Err(BenchError::remote(&machine.name, command, "scripted failure"));
        }

        let stdout = self
            .responses
            .iter()
            .find(|(p, _)| command.contains(p.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        Ok(CommandOutput::stdout(stdout))
    }
}

/// One recorded preload call
#[derive(Debug, Clone)]
pub(crate) struct LoadCall {
    pub(crate) client: String,
    pub(crate) endpoint_ip: String,
    pub(crate) port: u16,
    pub(crate) started: Instant,
    pub(crate) finished: Instant,
}

/// Load generator that records calls and emits one sample per run
#[derive(Default)]
pub(crate) struct MockGenerator {
    fail_load_ports: Vec<u16>,
    installs: Mutex<Vec<String>>,
    loads: Mutex<Vec<LoadCall>>,
    runs: Mutex<Vec<SweepPoint>>,
}

impl MockGenerator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_load_on(mut self, port: u16) -> Self {
        self.fail_load_ports.push(port);
        self
    }

    pub(crate) fn installs(&self) -> Vec<String> {
        self.installs.lock().unwrap().clone()
    }

    /// Preload calls in completion order
    pub(crate) fn loads(&self) -> Vec<LoadCall> {
        self.loads.lock().unwrap().clone()
    }

    pub(crate) fn runs(&self) -> Vec<SweepPoint> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl LoadGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn install(&self, client: &Machine) -> BenchResult<()> {
        self.installs.lock().unwrap().push(client.name.clone());
        Ok(())
    }

    async fn load(&self, client: &Machine, endpoint_ip: &str, port: u16) -> BenchResult<()> {
        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.loads.lock().unwrap().push(LoadCall {
            client: client.name.clone(),
            endpoint_ip: endpoint_ip.to_string(),
            port,
            started,
            finished: Instant::now(),
        });

        if self.fail_load_ports.contains(&port) {
            return Err(BenchError::remote(&client.name, "preload", "scripted failure"));
        }
        Ok(())
    }

    async fn run(&self, _clients: &[Machine], point: &SweepPoint) -> BenchResult<Vec<Sample>> {
        self.runs.lock().unwrap().push(point.clone());

        let mut metadata = Metadata::new();
        metadata.insert("pipeline".into(), json!(point.pipeline));
        metadata.insert("threads".into(), json!(point.threads));
        metadata.insert("clients".into(), json!(point.clients));
        metadata.insert("port".into(), json!(point.endpoint.port));
        Ok(vec![Sample::new("Ops Throughput", 1000.0, "ops/s", metadata)])
    }
}

pub(crate) fn facts(total_memory_kb: u64, cpus: u32, threads_per_core: u32) -> MachineFacts {
    MachineFacts {
        total_memory_kb,
        num_cpus: cpus,
        usable_cpus: cpus,
        threads_per_core,
        cpu_affinity: true,
    }
}

pub(crate) fn machines(prefix: &str, count: usize) -> Vec<Machine> {
    (0..count)
        .map(|i| {
            Machine::new(format!("{prefix}-{i}"), format!("203.0.113.{i}"))
                .with_internal_ip(format!("10.0.0.{i}"))
        })
        .collect()
}
