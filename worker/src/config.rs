use std::num::NonZeroUsize;

use comms::{
    scenario::{Assignment, Catalog, Scenario},
    specs::TrainSpec,
};

/// Immutable per-worker configuration, identical across the run except for
/// the worker index.
#[derive(Debug, Clone)]
pub struct ActorConfig {
    /// This worker's index within the cluster.
    pub worker: usize,
    /// Total registered workers; must match the leader's view.
    pub workers: NonZeroUsize,
    pub catalog: Catalog,
    pub spec: TrainSpec,
}

impl ActorConfig {
    /// This worker's contiguous slice of the catalog.
    pub fn assignment(&self) -> Assignment {
        debug_assert!(self.worker < self.workers.get());
        self.catalog.partition(self.workers)[self.worker]
    }

    /// The scenarios this worker trains against, in catalog order.
    pub fn scenarios(&self) -> Vec<Scenario> {
        self.catalog.slice(self.assignment()).to_vec()
    }
}
