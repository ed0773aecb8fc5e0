mod actor;
mod client;
mod config;
pub mod error;
mod metrics;

pub use actor::Actor;
pub use client::LeaderClient;
pub use config::ActorConfig;
pub use error::WorkerErr;
pub use metrics::ActorMetrics;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;
