//! Trajectory data model shared by the environment, the policy and the
//! control plane.

use crate::scenario::Scenario;

/// Number of features in a [`StateVector`].
pub const STATE_DIM: usize = 6;

/// Features computed from one control interval of feedback statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StateVector {
    /// Smoothed round-trip time, milliseconds.
    pub srtt_ms: f32,
    /// Queueing indicator: one-way delay above the episode minimum, ms.
    pub queue_delay_ms: f32,
    /// Delivered packets per second over the last interval.
    pub delivery_pps: f32,
    /// Sent packets per second over the last interval.
    pub send_pps: f32,
    /// Fraction of window slots counted as lost in the last interval.
    pub loss_rate: f32,
    /// Congestion window in effect during the interval, packets.
    pub cwnd: f32,
}

impl StateVector {
    /// Flattens the state into a fixed-length feature vector.
    pub fn features(&self) -> [f32; STATE_DIM] {
        [
            self.srtt_ms,
            self.queue_delay_ms,
            self.delivery_pps,
            self.send_pps,
            self.loss_rate,
            self.cwnd,
        ]
    }
}

/// A congestion window adjustment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CwndOp {
    Scale(f64),
    Shift(f64),
    Hold,
}

/// The fixed action set: every action is an index into this table.
pub const ACTION_SET: [CwndOp; 5] = [
    CwndOp::Scale(0.5),
    CwndOp::Shift(-10.0),
    CwndOp::Hold,
    CwndOp::Shift(10.0),
    CwndOp::Scale(2.0),
];

/// Number of discrete actions.
pub const ACTION_CNT: usize = ACTION_SET.len();

/// A policy-chosen action, an index into [`ACTION_SET`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Action(pub u8);

impl Action {
    /// The window adjustment this action stands for.
    pub fn op(self) -> CwndOp {
        ACTION_SET[self.0 as usize % ACTION_CNT]
    }

    /// Applies the adjustment to `cwnd`, clamped to `[min, max]`.
    pub fn apply(self, cwnd: f64, min: f64, max: f64) -> f64 {
        let next = match self.op() {
            CwndOp::Scale(factor) => cwnd * factor,
            CwndOp::Shift(delta) => cwnd + delta,
            CwndOp::Hold => cwnd,
        };

        next.clamp(min, max)
    }
}

/// One control step: the observed state, the chosen action and, under a
/// reward-driven algorithm, the reward earned over the interval.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Step {
    pub state: StateVector,
    pub action: Action,
    pub reward: Option<f32>,
}

/// One complete bounded run of a sender against a single scenario.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Episode {
    pub scenario: Scenario,
    pub steps: Vec<Step>,
}

impl Episode {
    /// Sum of the per-step rewards, if every step carries one.
    pub fn episode_return(&self) -> Option<f32> {
        self.steps.iter().map(|s| s.reward).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_clamps_to_bounds() {
        let doubled = Action(4).apply(800.0, 2.0, 1000.0);
        assert_eq!(doubled, 1000.0);

        let halved = Action(0).apply(3.0, 2.0, 1000.0);
        assert_eq!(halved, 2.0);
    }

    #[test]
    fn hold_keeps_cwnd() {
        assert_eq!(Action(2).apply(42.0, 2.0, 1000.0), 42.0);
    }

    #[test]
    fn episode_return_requires_all_rewards() {
        let state = StateVector::default();
        let with = Step {
            state,
            action: Action(2),
            reward: Some(1.5),
        };
        let without = Step {
            state,
            action: Action(2),
            reward: None,
        };
        let scenario = Scenario {
            topology: 0,
            traffic: 0,
        };

        let complete = Episode {
            scenario,
            steps: vec![with.clone(), with.clone()],
        };
        assert_eq!(complete.episode_return(), Some(3.0));

        let partial = Episode {
            scenario,
            steps: vec![with, without],
        };
        assert_eq!(partial.episode_return(), None);
    }
}
