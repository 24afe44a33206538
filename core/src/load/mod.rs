//! Load generation: preload, measurement sweep and the memtier generator

mod driver;
mod memtier;
mod sweep;

pub use driver::{preload_batches, LoadDriver, PRELOAD_BATCH_SIZE, PRELOAD_MAX_CONCURRENCY};
pub use memtier::{parse_all_stats, Memtier, MEMTIER_GIT};
pub use sweep::{sweep_points, validate_sweep, Endpoint, SweepPoint};
