//! Benchmark phase execution

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::BenchmarkConfig;
use crate::derive::ServerPlan;
use crate::dispatch::Dispatcher;
use crate::error::{BenchError, BenchResult};
use crate::load::{validate_sweep, LoadDriver, Memtier};
use crate::machine::{Machine, MachineFacts};
use crate::sample::Sample;
use crate::server::{install_server, InstanceLauncher};
use crate::telemetry::CpuSampler;
use crate::traits::{BenchmarkLifecycle, LoadGenerator, RemoteExecutor};

use super::aggregator::aggregate_samples;

/// State carried from `prepare` through `cleanup`
#[derive(Debug, Clone)]
pub struct BenchmarkSpec {
    /// Merged configuration
    pub config: BenchmarkConfig,

    /// Server machines; exactly one is supported
    pub servers: Vec<Machine>,

    /// Client machines; the first one also preloads
    pub clients: Vec<Machine>,

    /// Address the clients target, set by `prepare`
    pub endpoint_ip: Option<String>,

    /// Instances started by `prepare`
    pub plan: Option<ServerPlan>,
}

impl BenchmarkSpec {
    /// Create a spec that has not been prepared yet
    pub fn new(config: BenchmarkConfig, servers: Vec<Machine>, clients: Vec<Machine>) -> Self {
        Self {
            config,
            servers,
            clients,
            endpoint_ip: None,
            plan: None,
        }
    }

    fn server(&self) -> BenchResult<&Machine> {
        match self.servers.as_slice() {
            [server] => Ok(server),
            servers => Err(BenchError::preparation(format!(
                "expected exactly 1 server, found {}",
                servers.len()
            ))),
        }
    }

    fn prepared(&self) -> BenchResult<(&str, &ServerPlan)> {
        match (self.endpoint_ip.as_deref(), self.plan.as_ref()) {
            (Some(ip), Some(plan)) => Ok((ip, plan)),
            _ => Err(BenchError::preparation("benchmark has not been prepared")),
        }
    }
}

/// Redis server benchmarked with a load generator from client machines
pub struct RedisMemtierBenchmark {
    executor: Arc<dyn RemoteExecutor>,
    generator: Option<Arc<dyn LoadGenerator>>,
}

impl RedisMemtierBenchmark {
    pub(crate) fn new(
        executor: Arc<dyn RemoteExecutor>,
        generator: Option<Arc<dyn LoadGenerator>>,
    ) -> Self {
        Self {
            executor,
            generator,
        }
    }

    fn generator(&self, config: &BenchmarkConfig) -> Arc<dyn LoadGenerator> {
        match &self.generator {
            Some(generator) => Arc::clone(generator),
            None => Arc::new(Memtier::new(
                Arc::clone(&self.executor),
                config.memtier.clone(),
            )),
        }
    }

    fn driver(&self, config: &BenchmarkConfig) -> LoadDriver {
        LoadDriver::new(self.generator(config), config.memtier.clone())
    }

    fn launcher(&self, config: &BenchmarkConfig) -> InstanceLauncher {
        InstanceLauncher::new(Arc::clone(&self.executor), &config.server)
    }

    async fn install_generator(&self, config: &BenchmarkConfig, clients: &[Machine]) -> BenchResult<()> {
        let generator = self.generator(config);
        tracing::info!(
            generator = generator.name(),
            clients = clients.len(),
            "Installing load generator"
        );
        Dispatcher::new("generator-install")
            .dispatch(clients.to_vec(), move |client| {
                let generator = Arc::clone(&generator);
                async move { generator.install(&client).await }
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BenchmarkLifecycle for RedisMemtierBenchmark {
    type Spec = BenchmarkSpec;

    fn check_prerequisites(&self, config: &BenchmarkConfig) -> BenchResult<()> {
        config.validate()?;

        // A derived process count is only known after probing the server;
        // `prepare` repeats this check then.
        let explicit = config.server.total_num_processes;
        if explicit > 1 {
            validate_sweep(&config.memtier, explicit as usize)?;
        }
        Ok(())
    }

    fn get_config(&self, user_config: serde_json::Value) -> BenchResult<BenchmarkConfig> {
        BenchmarkConfig::merged(user_config)
    }

    async fn prepare(&self, spec: &mut BenchmarkSpec) -> BenchResult<()> {
        self.check_prerequisites(&spec.config)?;
        let server = spec.server()?.clone();
        if spec.clients.is_empty() {
            return Err(BenchError::preparation("no client machines"));
        }
        let config = spec.config.clone();

        let facts = MachineFacts::probe(self.executor.as_ref(), &server).await?;
        let plan = ServerPlan::derive(&config.server, &facts)?;
        validate_sweep(&config.memtier, plan.ports.len())?;

        self.install_generator(&config, &spec.clients).await?;
        install_server(self.executor.as_ref(), &server, &config.server).await?;

        // Recorded before launching so cleanup covers a partial start
        let ports = plan.ports.as_slice().to_vec();
        let plan = spec.plan.insert(plan);
        self.launcher(&config).start(&server, plan).await?;

        let endpoint_ip = server.endpoint_ip().to_string();
        if endpoint_ip.is_empty() {
            return Err(BenchError::preparation(format!(
                "server {} has no address",
                server.name
            )));
        }
        spec.endpoint_ip = Some(endpoint_ip.clone());

        self.driver(&config)
            .load(&spec.clients, &endpoint_ip, &ports)
            .await?;

        tracing::info!(
            server = %server.name,
            endpoint = %endpoint_ip,
            instances = ports.len(),
            "Benchmark prepared"
        );
        Ok(())
    }

    async fn run(&self, spec: &BenchmarkSpec) -> BenchResult<Vec<Sample>> {
        let (endpoint_ip, plan) = spec.prepared()?;
        let server = spec.server()?;
        let config = &spec.config;

        let sampler = if config.measure_cpu {
            let duration = config
                .memtier
                .run_duration_secs
                .ok_or_else(|| BenchError::config("measure_cpu requires memtier.run_duration_secs"))?;
            let sampler = CpuSampler::new(Arc::clone(&self.executor), duration);
            sampler.start(server).await?;
            Some(sampler)
        } else {
            None
        };

        let raw = self
            .driver(config)
            .run(&spec.clients, endpoint_ip, plan.ports.as_slice())
            .await?;

        let auxiliary = match &sampler {
            Some(sampler) => Some(sampler.collect(server).await?),
            None => None,
        };

        let samples = aggregate_samples(raw, &plan.metadata(&config.server), auxiliary);
        tracing::info!(samples = samples.len(), "Benchmark run complete");
        Ok(samples)
    }

    async fn cleanup(&self, spec: &mut BenchmarkSpec) -> BenchResult<()> {
        if let Some(plan) = spec.plan.take() {
            if let Some(server) = spec.servers.first() {
                self.launcher(&spec.config).stop(server, &plan).await;
            }
        }
        spec.endpoint_ip = None;
        Ok(())
    }
}
