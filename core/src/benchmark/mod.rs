//! Redis + memtier benchmark lifecycle
//!
//! [`RedisMemtierBenchmark`] drives the phases in order:
//! - `check_prerequisites`: reject contradictory configuration
//! - `prepare`: derive the server plan, install, tune, start and preload
//! - `run`: measurement sweep, optional server CPU sampling, aggregation
//! - `cleanup`: best-effort shutdown of the started instances
//!
//! # Example
//!
//! ```ignore
//! use redis_bench_core::{BenchmarkBuilder, BenchmarkLifecycle, BenchmarkSpec};
//!
//! let benchmark = BenchmarkBuilder::new().executor(executor).build()?;
//! let config = benchmark.get_config(user_config)?;
//! benchmark.check_prerequisites(&config)?;
//!
//! let mut spec = BenchmarkSpec::new(config, servers, clients);
//! benchmark.prepare(&mut spec).await?;
//! let samples = benchmark.run(&spec).await?;
//! benchmark.cleanup(&mut spec).await?;
//! ```

mod aggregator;
mod builder;
mod executor;

pub use aggregator::aggregate_samples;
pub use builder::BenchmarkBuilder;
pub use executor::{BenchmarkSpec, RedisMemtierBenchmark};
