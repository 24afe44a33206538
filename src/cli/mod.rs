//! CLI argument parsing and command dispatch

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use redis_bench_core::{
    BenchmarkBuilder, BenchmarkConfig, BenchmarkLifecycle, BenchmarkSpec, Machine,
    RedisMemtierBenchmark, RemoteExecutor, Sample,
};
use redis_bench_remote::{LocalExecutor, SshExecutor};
use redis_bench_report::{CsvExporter, JsonExporter};
use serde::Deserialize;

/// redis-bench - Redis benchmarks driven by memtier across remote machines
#[derive(Parser, Debug)]
#[command(name = "redis-bench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install, start, preload and measure, then shut the servers down
    Run(RunArgs),
    /// Check a configuration file without touching any machine
    Validate {
        /// Path to the JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the configuration merged over the defaults
    ShowConfig {
        /// Path to the JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the JSON machine inventory ({"servers": [...], "clients": [...]})
    #[arg(short, long)]
    pub inventory: PathBuf,

    /// Login user for machines that do not name one
    #[arg(long, env = "REDIS_BENCH_SSH_USER")]
    pub ssh_user: Option<String>,

    /// Private key passed to ssh
    #[arg(long, env = "REDIS_BENCH_SSH_KEY")]
    pub ssh_key: Option<String>,

    /// Per-command timeout in seconds
    #[arg(long)]
    pub command_timeout: Option<u64>,

    /// Run every command on this host instead of over ssh
    #[arg(long)]
    pub local: bool,

    /// Leave the servers running after the run
    #[arg(long)]
    pub skip_cleanup: bool,

    /// Output directory for results
    #[arg(long, default_value = "results")]
    pub output_dir: PathBuf,

    /// Export results to JSON
    #[arg(long)]
    pub json: bool,

    /// Export results to CSV
    #[arg(long)]
    pub csv: bool,
}

/// Machines taking part in a run
#[derive(Debug, Deserialize)]
pub struct Inventory {
    /// Server machines
    pub servers: Vec<Machine>,
    /// Client machines
    pub clients: Vec<Machine>,
}

impl Cli {
    /// Execute the selected subcommand
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => run(args).await,
            Commands::Validate { config } => {
                let config = merged_config(config.as_deref())?;
                benchmark(Arc::new(LocalExecutor::new()))?
                    .check_prerequisites(&config)
                    .context("Configuration is invalid")?;
                println!("Configuration is valid");
                Ok(())
            }
            Commands::ShowConfig { config } => {
                let config = merged_config(config.as_deref())?;
                println!("{}", serde_json::to_string_pretty(&config)?);
                Ok(())
            }
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let inventory = load_inventory(&args.inventory)?;
    let executor = executor(&args);
    tracing::info!(
        transport = executor.name(),
        servers = inventory.servers.len(),
        clients = inventory.clients.len(),
        "Starting redis-bench"
    );

    let benchmark = benchmark(executor)?;
    let config = benchmark.get_config(user_config(args.config.as_deref())?)?;
    benchmark
        .check_prerequisites(&config)
        .context("Configuration is invalid")?;

    let mut spec = BenchmarkSpec::new(config, inventory.servers, inventory.clients);
    let outcome = prepare_and_run(&benchmark, &mut spec).await;

    if args.skip_cleanup {
        tracing::info!("Skipping cleanup, servers left running");
    } else if let Err(e) = benchmark.cleanup(&mut spec).await {
        tracing::warn!(error = %e, "Cleanup failed");
    }

    let samples = outcome?;
    print_results(&samples);
    export(&args, &samples)
}

async fn prepare_and_run(
    benchmark: &RedisMemtierBenchmark,
    spec: &mut BenchmarkSpec,
) -> Result<Vec<Sample>> {
    benchmark.prepare(spec).await.context("Prepare failed")?;
    let samples = benchmark.run(spec).await.context("Run failed")?;
    Ok(samples)
}

fn executor(args: &RunArgs) -> Arc<dyn RemoteExecutor> {
    let timeout = args.command_timeout.map(Duration::from_secs);
    if args.local {
        let mut local = LocalExecutor::new();
        if let Some(timeout) = timeout {
            local = local.command_timeout(timeout);
        }
        return Arc::new(local);
    }

    let mut ssh = SshExecutor::new().connect_timeout(Duration::from_secs(30));
    if let Some(user) = &args.ssh_user {
        ssh = ssh.user(user.clone());
    }
    if let Some(key) = &args.ssh_key {
        ssh = ssh.identity_file(key.clone());
    }
    if let Some(timeout) = timeout {
        ssh = ssh.command_timeout(timeout);
    }
    Arc::new(ssh)
}

fn benchmark(executor: Arc<dyn RemoteExecutor>) -> Result<RedisMemtierBenchmark> {
    Ok(BenchmarkBuilder::new().executor(executor).build()?)
}

/// Read the user configuration document; no file means all defaults
pub fn user_config(path: Option<&Path>) -> Result<serde_json::Value> {
    let Some(path) = path else {
        return Ok(serde_json::json!({}));
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in config: {}", path.display()))
}

fn merged_config(path: Option<&Path>) -> Result<BenchmarkConfig> {
    Ok(BenchmarkConfig::merged(user_config(path)?)?)
}

/// Read the machine inventory
pub fn load_inventory(path: &Path) -> Result<Inventory> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid inventory: {}", path.display()))
}

fn print_results(samples: &[Sample]) {
    println!("\n{}", "=".repeat(70));
    println!("   Results ({} samples)", samples.len());
    println!("{}", "=".repeat(70));
    for sample in samples {
        let port = sample
            .metadata
            .get("port")
            .map(|p| p.to_string())
            .unwrap_or_default();
        println!(
            "  {:<16} {:>14.3} {:<10} {}",
            sample.metric, sample.value, sample.unit, port
        );
    }
    println!("{}", "=".repeat(70));
}

fn export(args: &RunArgs, samples: &[Sample]) -> Result<()> {
    if !(args.json || args.csv) {
        return Ok(());
    }

    std::fs::create_dir_all(&args.output_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            args.output_dir.display()
        )
    })?;

    if args.json {
        let path = args.output_dir.join("results.json");
        JsonExporter::export(samples, &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("JSON results: {}", path.display());
    }
    if args.csv {
        let path = args.output_dir.join("results.csv");
        CsvExporter::export(samples, &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("CSV results: {}", path.display());
    }
    Ok(())
}
