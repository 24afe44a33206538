//! Measurement sweep expansion

use std::fmt;

use crate::config::MemtierConfig;
use crate::error::{BenchError, BenchResult};

/// One store instance address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Address the clients connect to
    pub ip: String,
    /// Instance port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// One combination of load-generator settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPoint {
    /// Pipeline depth
    pub pipeline: u32,
    /// Client threads
    pub threads: u32,
    /// Connections per thread
    pub clients: u32,
    /// Target instance
    pub endpoint: Endpoint,
}

/// Reject sweeps over pipelines, threads or clients when more than one
/// endpoint is targeted
pub fn validate_sweep(config: &MemtierConfig, endpoint_count: usize) -> BenchResult<()> {
    if endpoint_count <= 1 {
        return Ok(());
    }

    let swept = [
        config.pipelines.len(),
        config.threads.len(),
        config.clients.len(),
    ];
    if swept.iter().any(|&len| len != 1) {
        return Err(BenchError::config(format!(
            "running against {endpoint_count} endpoints requires exactly one pipeline, \
             thread and client setting"
        )));
    }
    Ok(())
}

/// Expand the full Cartesian sweep
///
/// Order is pipelines, then threads, then clients, then endpoints, with
/// the last varying fastest.
pub fn sweep_points(config: &MemtierConfig, endpoints: &[Endpoint]) -> Vec<SweepPoint> {
    let mut points = Vec::with_capacity(
        config.pipelines.len() * config.threads.len() * config.clients.len() * endpoints.len(),
    );
    for &pipeline in &config.pipelines {
        for &threads in &config.threads {
            for &clients in &config.clients {
                for endpoint in endpoints {
                    points.push(SweepPoint {
                        pipeline,
                        threads,
                        clients,
                        endpoint: endpoint.clone(),
                    });
                }
            }
        }
    }
    points
}
