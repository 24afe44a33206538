//! Preload and measurement sweep orchestration

use std::sync::Arc;

use crate::config::MemtierConfig;
use crate::dispatch::Dispatcher;
use crate::error::{BenchError, BenchResult};
use crate::machine::Machine;
use crate::sample::Sample;
use crate::traits::LoadGenerator;

use super::sweep::{sweep_points, validate_sweep, Endpoint};

/// Ports preloaded per wave
pub const PRELOAD_BATCH_SIZE: usize = 4;

/// Concurrent preload jobs within one wave
pub const PRELOAD_MAX_CONCURRENCY: usize = 10;

/// Split ports into preload waves
pub fn preload_batches(ports: &[u16]) -> Vec<Vec<u16>> {
    ports
        .chunks(PRELOAD_BATCH_SIZE)
        .map(<[u16]>::to_vec)
        .collect()
}

/// Drives a [`LoadGenerator`] through preload and the measurement sweep
pub struct LoadDriver {
    generator: Arc<dyn LoadGenerator>,
    config: MemtierConfig,
}

impl LoadDriver {
    /// Create a driver for `generator` using the sweep in `config`
    pub fn new(generator: Arc<dyn LoadGenerator>, config: MemtierConfig) -> Self {
        Self { generator, config }
    }

    /// Dispatcher used for each preload wave
    pub fn preload_dispatcher() -> Dispatcher {
        Dispatcher::new("preload").max_concurrency(PRELOAD_MAX_CONCURRENCY)
    }

    /// Populate every port from the first client, one wave at a time
    pub async fn load(&self, clients: &[Machine], endpoint_ip: &str, ports: &[u16]) -> BenchResult<()> {
        check_endpoint(clients, endpoint_ip)?;
        let client = clients[0].clone();
        let endpoint_ip = endpoint_ip.to_string();

        for (wave, batch) in preload_batches(ports).into_iter().enumerate() {
            tracing::info!(
                client = %client.name,
                wave,
                ports = ?batch,
                "Preloading"
            );

            let generator = Arc::clone(&self.generator);
            let client = client.clone();
            let endpoint_ip = endpoint_ip.clone();
            Self::preload_dispatcher()
                .dispatch(batch, move |port| {
                    let generator = Arc::clone(&generator);
                    let client = client.clone();
                    let endpoint_ip = endpoint_ip.clone();
                    async move { generator.load(&client, &endpoint_ip, port).await }
                })
                .await?;
        }
        Ok(())
    }

    /// Run the full sweep and return the samples in sweep order
    ///
    /// The multi-endpoint restriction is checked before anything runs.
    pub async fn run(
        &self,
        clients: &[Machine],
        endpoint_ip: &str,
        ports: &[u16],
    ) -> BenchResult<Vec<Sample>> {
        check_endpoint(clients, endpoint_ip)?;
        validate_sweep(&self.config, ports.len())?;

        let endpoints: Vec<Endpoint> = ports
            .iter()
            .map(|&port| Endpoint::new(endpoint_ip, port))
            .collect();
        let points = sweep_points(&self.config, &endpoints);

        tracing::info!(
            generator = self.generator.name(),
            points = points.len(),
            "Starting measurement sweep"
        );

        let mut samples = Vec::new();
        for point in &points {
            tracing::info!(
                endpoint = %point.endpoint,
                pipeline = point.pipeline,
                threads = point.threads,
                clients = point.clients,
                "Running sweep point"
            );
            samples.extend(self.generator.run(clients, point).await?);
        }
        Ok(samples)
    }
}

fn check_endpoint(clients: &[Machine], endpoint_ip: &str) -> BenchResult<()> {
    if endpoint_ip.is_empty() {
        return Err(BenchError::preparation("endpoint IP is not resolved"));
    }
    if clients.is_empty() {
        return Err(BenchError::preparation("no client machines"));
    }
    Ok(())
}
