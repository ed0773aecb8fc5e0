//! Reward-driven policy: scales preference updates by episode returns.

use comms::trajectory::{Action, Episode, StateVector};

use crate::{ModelParameters, Policy, PolicyErr, Result, best_action, check_shape, nudge};

/// A linear scorer trained on whole-trajectory returns.
///
/// Every step's chosen action is reinforced in proportion to how much its
/// episode's return beats the batch mean. Requires a reward on every step;
/// a rewardless episode is a caller error, not something to guess around.
pub struct ReturnsPolicy {
    params: ModelParameters,
    lr: f32,
}

impl ReturnsPolicy {
    pub fn new(lr: f32) -> Self {
        Self {
            params: ModelParameters::new(0, vec![0.0; crate::PARAM_DIM]),
            lr,
        }
    }
}

impl Policy for ReturnsPolicy {
    fn decide(&self, state: &StateVector) -> Action {
        Action(best_action(&self.params.blob, &state.features()) as u8)
    }

    fn update(&mut self, batch: &[Episode]) -> Result<ModelParameters> {
        if batch.is_empty() {
            return Err(PolicyErr::EmptyBatch);
        }

        let mut returns = Vec::with_capacity(batch.len());
        for episode in batch {
            let ret = episode
                .episode_return()
                .ok_or(PolicyErr::MissingReward {
                    scenario: episode.scenario,
                })?;
            returns.push(ret);
        }

        let baseline = returns.iter().sum::<f32>() / returns.len() as f32;
        let mut blob = self.params.blob.clone();

        for (episode, ret) in batch.iter().zip(&returns) {
            let advantage = ret - baseline;

            for step in &episode.steps {
                nudge(
                    &mut blob,
                    step.action.0 as usize,
                    self.lr * advantage,
                    &step.state.features(),
                );
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
