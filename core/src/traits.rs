//! Core traits for external collaborators
//!
//! These traits are defined in core so that the orchestration logic can be
//! driven against any transport or load generator. Implementations live in
//! their respective crates (remote/) or modules (load::memtier).

use async_trait::async_trait;

use crate::config::BenchmarkConfig;
use crate::error::BenchResult;
use crate::load::SweepPoint;
use crate::machine::Machine;
use crate::sample::Sample;

// ============================================================================
// Remote Executor Trait
// ============================================================================

/// Captured output of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Output with the given stdout and empty stderr
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// Executes command strings on named remote machines
///
/// Timeouts, retries and authentication are the implementation's concern.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Transport identifier (e.g., "ssh", "local")
    fn name(&self) -> &str;

    /// Run `command` on `machine` and return its captured output
    ///
    /// Fails with `BenchError::RemoteExecution` when the command exits
    /// non-zero or the transport fails.
    async fn execute(&self, machine: &Machine, command: &str) -> BenchResult<CommandOutput>;

    /// Non-raising variant for best-effort operations
    async fn try_execute(&self, machine: &Machine, command: &str) -> bool {
        match self.execute(machine, command).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(machine = %machine.name, error = %e, "Best-effort command failed");
                false
            }
        }
    }
}

// ============================================================================
// Load Generator Trait
// ============================================================================

/// Load generator driven by the [`LoadDriver`](crate::load::LoadDriver)
///
/// The workload-generation algorithm itself is the implementation's
/// business; the driver only decides what runs where.
#[async_trait]
pub trait LoadGenerator: Send + Sync {
    /// Generator identifier (e.g., "memtier")
    fn name(&self) -> &str;

    /// Install the generator on one client machine
    async fn install(&self, client: &Machine) -> BenchResult<()>;

    /// Populate the instance at `endpoint_ip:port` from one client
    async fn load(&self, client: &Machine, endpoint_ip: &str, port: u16) -> BenchResult<()>;

    /// Run one measurement at a sweep point and return its samples
    async fn run(&self, clients: &[Machine], point: &SweepPoint) -> BenchResult<Vec<Sample>>;
}

// ============================================================================
// Benchmark Lifecycle Trait
// ============================================================================

/// The ordered benchmark phases
///
/// Phases run strictly in declaration order. `run` may be invoked more than
/// once against one `prepare`; whether that is meaningful for the server
/// state is the caller's concern.
#[async_trait]
pub trait BenchmarkLifecycle: Send + Sync {
    /// Mutable state carried between phases
    type Spec: Send;

    /// Reject invalid or contradictory configuration
    fn check_prerequisites(&self, config: &BenchmarkConfig) -> BenchResult<()>;

    /// Merge a user document over the benchmark defaults
    fn get_config(&self, user_config: serde_json::Value) -> BenchResult<BenchmarkConfig>;

    /// Install, start and preload
    async fn prepare(&self, spec: &mut Self::Spec) -> BenchResult<()>;

    /// Measure and return the final sample collection
    async fn run(&self, spec: &Self::Spec) -> BenchResult<Vec<Sample>>;

    /// Release whatever `prepare` left behind
    async fn cleanup(&self, spec: &mut Self::Spec) -> BenchResult<()>;
}
