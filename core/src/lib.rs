//! redis-bench-core: Orchestration core for Redis benchmarks driven by memtier
//!
//! This crate holds everything between the configuration and the remote
//! machines:
//!
//! - Parameter derivation (ports, memory ceilings, I/O threads)
//! - Bounded-concurrency dispatch across machines
//! - Server install, tuning and instance launch
//! - Preload and measurement sweep through a load generator
//! - Sample aggregation and CPU telemetry
//! - The benchmark lifecycle and its error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod benchmark;
pub mod config;
pub mod derive;
pub mod dispatch;
pub mod error;
pub mod load;
pub mod machine;
pub mod sample;
pub mod server;
pub mod telemetry;
pub mod traits;
pub mod version;

#[cfg(test)]
mod test_utils;

pub use benchmark::{aggregate_samples, BenchmarkBuilder, BenchmarkSpec, RedisMemtierBenchmark};
pub use config::*;
pub use derive::{InstanceConfig, PortSet, ServerPlan};
pub use dispatch::Dispatcher;
pub use error::*;
pub use load::{Endpoint, LoadDriver, Memtier, SweepPoint};
pub use machine::{Machine, MachineFacts};
pub use sample::{Metadata, Sample, SequenceCounter};
pub use server::{InstanceLauncher, TuningReport};
pub use telemetry::CpuSampler;
pub use traits::*;
pub use version::Version;
