//! Imitation-style policy: corrects itself toward a shadow expert.

use comms::trajectory::{ACTION_CNT, Action, Episode, StateVector};

use crate::{ModelParameters, Policy, Result, best_action, check_shape, nudge};

/// A linear scorer trained by imitation.
///
/// The shadow expert is a bandwidth-delay-product rule: it labels each state
/// with the action that moves the window closest to `delivery_rate * srtt`.
/// Updates pull the scorer toward the expert's labels and ignore rewards
/// entirely.
pub struct ShadowPolicy {
    params: ModelParameters,
    lr: f32,
}

impl ShadowPolicy {
    pub fn new(lr: f32) -> Self {
        Self {
            params: ModelParameters::new(0, vec![0.0; crate::PARAM_DIM]),
            lr,
        }
    }

    /// The expert label for one state.
    fn expert(state: &StateVector) -> usize {
        let bdp = f64::from(state.delivery_pps) * f64::from(state.srtt_ms) / 1_000.0;
        let target = bdp.max(1.0);
        let cwnd = f64::from(state.cwnd);

        (0..ACTION_CNT).fold(0, |best, action| {
            let candidate = Action(action as u8).apply(cwnd, 1.0, f64::MAX);
            let incumbent = Action(best as u8).apply(cwnd, 1.0, f64::MAX);

            if (candidate - target).abs() < (incumbent - target).abs() {
                action
            } else {
                best
            }
        })
    }
}

impl Policy for ShadowPolicy {
    fn decide(&self, state: &StateVector) -> Action {
        Action(best_action(&self.params.blob, &state.features()) as u8)
    }

    fn update(&mut self, batch: &[Episode]) -> Result<ModelParameters> {
        if batch.is_empty() {
            return Err(crate::PolicyErr::EmptyBatch);
        }

        let mut blob = self.params.blob.clone();

        for episode in batch {
            for step in &episode.steps {
                let features = step.state.features();
                let label = Self::expert(&step.state);
                let chosen = best_action(&blob, &features);

                if chosen != label {
                    nudge(&mut blob, label, self.lr, &features);
                    nudge(&mut blob, chosen, -self.lr, &features);
                }
            }
        }

        self.params = self.params.next(blob);
        Ok(self.params.clone())
    }

    fn snapshot(&self) -> ModelParameters {
        self.params.clone()
    }

    fn install(&mut self, params: &ModelParameters) -> Result<()> {
        check_shape(&params.blob)?;
        self.params = params.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use comms::scenario::Scenario;
    use comms::trajectory::Step;

    use super::*;

    fn state() -> StateVector {
        StateVector {
            srtt_ms: 100.0,
            queue_delay_ms: 0.0,
            delivery_pps: 500.0,
            send_pps: 500.0,
            loss_rate: 0.0,
            cwnd: 15.0,
        }
    }

    fn episode(steps: usize) -> Episode {
        Episode {
            scenario: Scenario {
                topology: 0,
                traffic: 0,
            },
            steps: (0..steps)
                .map(|_| Step {
                    state: state(),
                    action: Action(2),
                    reward: None,
                })
                .collect(),
        }
    }

    #[test]
    fn expert_grows_window_under_large_bdp() {
        // BDP of 50 packets against a window of 15: doubling gets closest.
        assert_eq!(ShadowPolicy::expert(&state()), 4);
    }

    #[test]
    fn update_moves_decisions_toward_the_expert() {
        let mut policy = ShadowPolicy::new(0.01);

        for _ in 0..5 {
            policy.update(&[episode(8)]).unwrap();
        }

        assert_eq!(policy.decide(&state()), Action(4));
    }

    #[test]
    fn update_bumps_version_once_per_batch() {
        let mut policy = ShadowPolicy::new(0.01);
        assert_eq!(policy.snapshot().version, 0);

        let first = policy.update(&[episode(1)]).unwrap();
        let second = policy.update(&[episode(1)]).unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
    }

    #[test]
    fn rewardless_steps_are_fine() {
        let mut policy = ShadowPolicy::new(0.01);
        assert!(policy.update(&[episode(3)]).is_ok());
    }

    #[test]
    fn install_rejects_wrong_shape() {
        let mut policy = ShadowPolicy::new(0.01);
        let bad = ModelParameters::new(1, vec![0.0; 3]);
        assert!(policy.install(&bad).is_err());
    }

    #[test]
    fn empty_batch_is_an_error() {
        let mut policy = ShadowPolicy::new(0.01);
        assert!(policy.update(&[]).is_err());
    }
}
