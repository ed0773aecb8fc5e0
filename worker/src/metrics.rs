/// Observable worker-side counters.
///
/// Discarded episodes never vanish silently: every one leaves a mark here
/// alongside its log record.
#[derive(Debug, Default, Clone)]
pub struct ActorMetrics {
    pub episodes_run: u64,
    /// Episodes spoiled by transport failures and dropped.
    pub episodes_discarded: u64,
    /// Scenario reruns attempted after a transport failure.
    pub transport_retries: u64,
    /// Scenarios given up on for a batch after exhausting retries.
    pub scenarios_skipped: u64,
    pub batches_submitted: u64,
    /// Latest installed parameter version.
    pub last_version: u64,
    /// Whether the run ended through the cancellation path.
    pub cancelled: bool,
}
