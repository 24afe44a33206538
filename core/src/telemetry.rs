//! Server CPU sampling via `top`
//!
//! `top` runs in batch mode in the background for the length of the
//! measured run, one summary line per second. Afterwards the `Cpu(s)`
//! lines are pulled back and turned into an idle-time series.

use std::sync::Arc;

use serde_json::json;

use crate::error::{BenchError, BenchResult};
use crate::machine::Machine;
use crate::sample::{Metadata, Sample, SequenceCounter};
use crate::traits::RemoteExecutor;

/// File `top` writes into on the server
pub const TOP_OUTPUT: &str = "top.txt";

/// Launcher script for the background `top`
pub const TOP_SCRIPT: &str = "top_script.sh";

/// Metric name of the idle series
pub const CPU_IDLE_METRIC: &str = "CPU Idle time";

const CPU_IDLE_UNIT: &str = "%Cpu(s)";
const CPU_HEADER: &str = "Cpu(s)";
const IDLE_FIELD: usize = 3;
const IDLE_LABEL: &str = "id";

/// Captures a CPU idle time series on one machine
pub struct CpuSampler {
    executor: Arc<dyn RemoteExecutor>,
    duration_secs: u64,
}

impl CpuSampler {
    /// Sample once per second for `duration_secs`
    pub fn new(executor: Arc<dyn RemoteExecutor>, duration_secs: u64) -> Self {
        Self {
            executor,
            duration_secs,
        }
    }

    /// Start `top` in the background; returns immediately
    pub async fn start(&self, machine: &Machine) -> BenchResult<()> {
        let top = format!("top -b -d 1 -n {} > {TOP_OUTPUT} &", self.duration_secs);
        self.executor
            .execute(machine, &format!("echo \"{top}\" > {TOP_SCRIPT}"))
            .await?;
        self.executor
            .execute(machine, &format!("bash {TOP_SCRIPT}"))
            .await?;
        tracing::info!(machine = %machine.name, secs = self.duration_secs, "Started CPU sampling");
        Ok(())
    }

    /// Fetch the captured lines and parse them
    pub async fn collect(&self, machine: &Machine) -> BenchResult<Vec<Sample>> {
        let output = self
            .executor
            .execute(machine, &format!("grep Cpu {TOP_OUTPUT}"))
            .await?;
        parse_cpu_idle(&output.stdout, &SequenceCounter::new())
    }
}

/// Parse `top` CPU summary lines into one idle sample per line
///
/// Fields after the `Cpu(s)` header are comma separated and the fourth is
/// `<value> id`. Any line not matching that shape fails the whole parse.
pub fn parse_cpu_idle(text: &str, sequence: &SequenceCounter) -> BenchResult<Vec<Sample>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let idle = parse_idle_field(line)?;
            let position = sequence.next();

            let mut metadata = Metadata::new();
            metadata.insert("time_series_sec".into(), json!(position));
            metadata.insert("cpu_idle_percent".into(), json!(idle.text));

            Ok(Sample::new(CPU_IDLE_METRIC, idle.value, CPU_IDLE_UNIT, metadata).with_sequence(position))
        })
        .collect()
}

struct IdleField<'a> {
    text: &'a str,
    value: f64,
}

fn parse_idle_field(line: &str) -> BenchResult<IdleField<'_>> {
    let (_, fields) = line
        .split_once(CPU_HEADER)
        .ok_or_else(|| BenchError::parse(format!("no {CPU_HEADER} header in {line:?}")))?;
    let fields = fields.trim_start_matches([':', ',']);

    let field = fields
        .split(',')
        .nth(IDLE_FIELD)
        .ok_or_else(|| BenchError::parse(format!("missing idle field in {line:?}")))?;

    let mut parts = field.split_whitespace();
    let (Some(text), Some(label), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(BenchError::parse(format!("malformed idle field {field:?}")));
    };
    if label != IDLE_LABEL {
        return Err(BenchError::parse(format!(
            "expected {IDLE_LABEL:?} label, found {label:?} in {line:?}"
        )));
    }

    let value = text
        .parse()
        .map_err(|_| BenchError::parse(format!("idle value {text:?} is not a number")))?;
    Ok(IdleField { text, value })
}
