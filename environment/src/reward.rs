//! The per-interval reward signal.

use comms::{specs::RewardSpec, trajectory::StateVector};

/// Reward for one control interval.
///
/// A pure function of the interval state: a throughput term minus delay and
/// loss penalties, weighted by the run's reward spec. No cross-episode or
/// hidden state feeds into it.
pub fn interval_reward(spec: &RewardSpec, state: &StateVector) -> f32 {
    let throughput = (1.0 + state.delivery_pps).ln();
    let delay = (1.0 + state.queue_delay_ms).ln();

    spec.throughput * throughput - spec.delay * delay - spec.loss * state.loss_rate
}
