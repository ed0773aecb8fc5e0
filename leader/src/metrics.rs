/// Where the leader currently is in its batch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    WaitingForBatch,
    Aggregating,
    Updating,
    Broadcasting,
    Shutdown,
}

/// Observable leader-side counters.
///
/// Shared with the connection tasks behind a mutex; every anomaly the run
/// tolerates (stalls, rejected submissions, missed acks) leaves a mark here
/// instead of vanishing.
#[derive(Debug, Default, Clone)]
pub struct LeaderMetrics {
    pub phase: Phase,
    pub batches_completed: u64,
    /// Diagnostic ticks spent waiting on a stalled batch.
    pub stalled_ticks: u64,
    /// Workers withdrawn under the opt-in stall policy.
    pub workers_withdrawn: u64,
    /// Submissions rejected for carrying an already-closed batch number.
    pub rejected_submissions: u64,
    /// Submissions buffered because they arrived ahead of their batch.
    pub buffered_submissions: u64,
    /// Broadcasts that ran out the acknowledgement timeout.
    pub ack_timeouts: u64,
}
