pub mod barrier;
pub mod error;
mod metrics;
mod persist;
mod server;

pub use barrier::BatchBarrier;
pub use error::LeaderErr;
pub use metrics::{LeaderMetrics, Phase};
pub use persist::{load_params, save_params};
pub use server::{Leader, LeaderConfig};

/// The leader module's result type.
pub type Result<T> = std::result::Result<T, LeaderErr>;
