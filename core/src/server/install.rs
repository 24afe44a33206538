//! Server installation from source

use crate::config::RedisServerConfig;
use crate::error::BenchResult;
use crate::machine::Machine;
use crate::traits::RemoteExecutor;

/// Upstream source repository
pub const REDIS_GIT: &str = "https://github.com/redis/redis.git";

/// Clone and build the configured server version on `machine`
pub async fn install_server(
    executor: &dyn RemoteExecutor,
    machine: &Machine,
    config: &RedisServerConfig,
) -> BenchResult<()> {
    let install_dir = &config.install_dir;
    let redis_dir = config.redis_dir();

    tracing::info!(machine = %machine.name, version = %config.version, "Installing redis server");

    executor
        .execute(
            machine,
            &format!("sudo mkdir -p {install_dir} && sudo chmod a+rwx {install_dir}"),
        )
        .await?;
    executor
        .execute(
            machine,
            &format!("cd {install_dir} && rm -rf {redis_dir} && git clone {REDIS_GIT}"),
        )
        .await?;
    executor
        .execute(
            machine,
            &format!("cd {redis_dir} && git checkout {} && make", config.version),
        )
        .await?;
    Ok(())
}
