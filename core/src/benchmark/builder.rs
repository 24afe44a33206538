//! Builder pattern for benchmark construction

use std::sync::Arc;

use crate::error::{BenchError, BenchResult};
use crate::traits::{LoadGenerator, RemoteExecutor};

use super::executor::RedisMemtierBenchmark;

/// Builder for a [`RedisMemtierBenchmark`]
///
/// # Example
///
/// ```ignore
/// let benchmark = BenchmarkBuilder::new()
///     .executor(Arc::new(SshExecutor::new()))
///     .build()?;
/// ```
pub struct BenchmarkBuilder {
    executor: Option<Arc<dyn RemoteExecutor>>,
    generator: Option<Arc<dyn LoadGenerator>>,
}

impl BenchmarkBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self {
            executor: None,
            generator: None,
        }
    }

    /// Set the transport used for every remote command
    pub fn executor(mut self, executor: Arc<dyn RemoteExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Replace the load generator (memtier over the executor by default)
    pub fn generator(mut self, generator: Arc<dyn LoadGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the benchmark
    ///
    /// # Errors
    ///
    /// Returns an error if no executor was set.
    pub fn build(self) -> BenchResult<RedisMemtierBenchmark> {
        let executor = self
            .executor
            .ok_or_else(|| BenchError::missing_config("executor"))?;

        Ok(RedisMemtierBenchmark::new(executor, self.generator))
    }
}

impl Default for BenchmarkBuilder {
    fn default() -> Self {
        Self::new()
    }
}
