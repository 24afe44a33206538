//! Redis server install, launch and shutdown

mod command;
mod install;
mod launcher;

pub use command::{build_shutdown_command, build_start_command, server_args};
pub use install::{install_server, REDIS_GIT};
pub use launcher::{InstanceLauncher, TuningReport};
