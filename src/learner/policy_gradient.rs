//! REINFORCE policy-gradient learner with an optional value baseline.
//!
//! Works through the same trainable-network abstraction as the DQN path:
//! the policy step nudges the logits along `A_t * (onehot(a_t) - softmax)`
//! by training toward displaced logit targets, and the baseline (when
//! present) regresses toward the discounted returns under MSE.

use serde::{Deserialize, Serialize};

use super::masked_softmax_entropy;
use crate::codec::{ActionMask, ACTION_SPACE};
use crate::neural::TrainableNetwork;
use crate::{ChessRlError, Result};

/// One step of an episode trajectory, in play order.
#[derive(Debug, Clone)]
pub struct TrajectoryStep {
    pub state: Vec<f64>,
    pub action: usize,
    pub reward: f64,
    pub legal_mask: ActionMask,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PgUpdateResult {
    pub policy_loss: f64,
    pub value_loss: f64,
    pub entropy: f64,
    pub gradient_norm: f64,
    pub steps: usize,
}

pub struct PolicyGradientLearner<N: TrainableNetwork> {
    policy: N,
    baseline: Option<N>,
    gamma: f64,
    /// Scale of the logit displacement per unit advantage.
    step_scale: f64,
}

impl<N: TrainableNetwork> PolicyGradientLearner<N> {
    pub fn new(policy: N, baseline: Option<N>, gamma: f64) -> PolicyGradientLearner<N> {
        PolicyGradientLearner {
            policy,
            baseline,
            gamma,
            step_scale: 1.0,
        }
    }

    pub fn policy(&self) -> &N {
        &self.policy
    }

    /// Discounted returns `G_t = sum_k gamma^k r_{t+k}`, play order.
    fn discounted_returns(&self, trajectory: &[TrajectoryStep]) -> Vec<f64> {
        let mut returns = vec![0.0; trajectory.len()];
        let mut running = 0.0;
        for (index, step) in trajectory.iter().enumerate().rev() {
            running = step.reward + self.gamma * running;
            returns[index] = running;
        }
        returns
    }

    pub fn update(&mut self, trajectory: &[TrajectoryStep]) -> Result<PgUpdateResult> {
        if trajectory.is_empty() {
            return Ok(PgUpdateResult {
                policy_loss: 0.0,
                value_loss: 0.0,
                entropy: 0.0,
                gradient_norm: 0.0,
                steps: 0,
            });
        }
        for (index, step) in trajectory.iter().enumerate() {
            if step.action >= ACTION_SPACE {
                return Err(ChessRlError::Codec(format!(
                    "trajectory step {} has action {} outside [0, {})",
                    index, step.action, ACTION_SPACE
                )));
            }
            if step.state.len() != self.policy.input_len() {
                return Err(ChessRlError::Learner(format!(
                    "trajectory step {} has {} features, policy expects {}",
                    index,
                    step.state.len(),
                    self.policy.input_len()
                )));
            }
        }

        let returns = self.discounted_returns(trajectory);
        let states: Vec<Vec<f64>> = trajectory.iter().map(|s| s.state.clone()).collect();

        // Advantage: subtract the baseline value when one exists.
        let advantages: Vec<f64> = match &self.baseline {
            Some(baseline) => {
                let values = baseline.forward_batch(&states)?;
                returns
                    .iter()
                    .zip(&values)
                    .map(|(&g, v)| g - v.first().copied().unwrap_or(0.0) as f64)
                    .collect()
            }
            None => returns.clone(),
        };

        let logits = self.policy.forward_batch(&states)?;
        let mut targets = Vec::with_capacity(trajectory.len());
        let mut entropy = 0.0;
        let mut gradient_norm = 0.0;

        for (row, step) in trajectory.iter().enumerate() {
            let legal: Vec<usize> = step.legal_mask.indices().collect();
            if legal.is_empty() {
                return Err(ChessRlError::Codec(format!(
                    "trajectory step {} has an empty legal mask",
                    row
                )));
            }
            entropy += masked_softmax_entropy(&logits[row], &legal);

            let probs = masked_softmax(&logits[row], &legal);
            let mut target_row = logits[row].clone();
            let mut sq_norm = 0.0;
            for (&index, &p) in legal.iter().zip(&probs) {
                let indicator = if index == step.action { 1.0 } else { 0.0 };
                let direction = advantages[row] * (indicator - p);
                target_row[index] += (self.step_scale * direction) as f32;
                sq_norm += direction * direction;
            }
            gradient_norm += sq_norm.sqrt();
            targets.push(target_row);
        }

        let policy_loss = self.policy.train_batch(&states, &targets)?;

        let value_loss = match &mut self.baseline {
            Some(baseline) => {
                let value_targets: Vec<Vec<f32>> =
                    returns.iter().map(|&g| vec![g as f32]).collect();
                baseline.train_batch(&states, &value_targets)?
            }
            None => 0.0,
        };

        let steps = trajectory.len();
        Ok(PgUpdateResult {
            policy_loss,
            value_loss,
            entropy: entropy / steps as f64,
            gradient_norm: gradient_norm / steps as f64,
            steps,
        })
    }
}

fn masked_softmax(logits: &[f32], legal: &[usize]) -> Vec<f64> {
    let max_logit = legal
        .iter()
        .map(|&i| logits[i] as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = legal
        .iter()
        .map(|&i| (logits[i] as f64 - max_logit).exp())
        .collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|&e| e / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::WeightMap;

    struct LinearStub {
        rows: Vec<f32>,
        width: usize,
        last_targets: Option<Vec<Vec<f32>>>,
    }

    impl LinearStub {
        fn new(rows: Vec<f32>, width: usize) -> LinearStub {
            LinearStub {
                rows,
                width,
                last_targets: None,
            }
        }
    }

    impl TrainableNetwork for LinearStub {
        fn input_len(&self) -> usize {
            3
        }

        fn output_len(&self) -> usize {
            self.width
        }

        fn forward_batch(&self, states: &[Vec<f64>]) -> Result<Vec<Vec<f32>>> {
            Ok(states.iter().map(|_| self.rows.clone()).collect())
        }

        fn train_batch(&mut self, _states: &[Vec<f64>], targets: &[Vec<f32>]) -> Result<f64> {
            self.last_targets = Some(targets.to_vec());
            Ok(0.5)
        }

        fn copy_weights_to(&self, other: &mut LinearStub) -> Result<()> {
            other.rows = self.rows.clone();
            Ok(())
        }

        fn export_weights(&self) -> WeightMap {
            WeightMap::new()
        }

        fn import_weights(&mut self, _weights: &WeightMap) -> Result<()> {
            Ok(())
        }
    }

    fn mask_of(indices: &[usize]) -> ActionMask {
        let mut mask = ActionMask::empty();
        for &i in indices {
            mask.set(i);
        }
        mask
    }

    fn step(action: usize, reward: f64) -> TrajectoryStep {
        TrajectoryStep {
            state: vec![0.0; 3],
            action,
            reward,
            legal_mask: mask_of(&[0, 1]),
        }
    }

    #[test]
    fn test_discounted_returns() {
        let learner = PolicyGradientLearner::new(
            LinearStub::new(vec![0.0; ACTION_SPACE], ACTION_SPACE),
            None,
            0.5,
        );
        let trajectory = vec![step(0, 1.0), step(1, 0.0), step(0, 4.0)];
        let returns = learner.discounted_returns(&trajectory);
        // G_2 = 4, G_1 = 0 + 0.5*4 = 2, G_0 = 1 + 0.5*2 = 2
        assert_eq!(returns, vec![2.0, 2.0, 4.0]);
    }

    #[test]
    fn test_positive_advantage_raises_taken_action() {
        let mut learner = PolicyGradientLearner::new(
            LinearStub::new(vec![0.0; ACTION_SPACE], ACTION_SPACE),
            None,
            1.0,
        );
        let result = learner.update(&[step(0, 1.0)]).unwrap();
        assert_eq!(result.steps, 1);
        let targets = learner.policy.last_targets.as_ref().unwrap();
        // Equal logits over {0, 1}: p = 0.5 each, advantage 1.
        assert!((targets[0][0] - 0.5).abs() < 1e-6);
        assert!((targets[0][1] - -0.5).abs() < 1e-6);
    }

    #[test]
    fn test_baseline_reduces_advantage_and_trains_value() {
        let policy = LinearStub::new(vec![0.0; ACTION_SPACE], ACTION_SPACE);
        let baseline = LinearStub::new(vec![1.0], 1);
        let mut learner = PolicyGradientLearner::new(policy, Some(baseline), 1.0);
        let result = learner.update(&[step(0, 1.0)]).unwrap();
        // Return 1.0 minus baseline 1.0: zero advantage, logits untouched.
        let targets = learner.policy.last_targets.as_ref().unwrap();
        assert_eq!(targets[0][0], 0.0);
        assert!(result.value_loss > 0.0);
        let value_targets = learner.baseline.as_ref().unwrap().last_targets.as_ref().unwrap();
        assert_eq!(value_targets[0], vec![1.0]);
    }

    #[test]
    fn test_empty_trajectory_is_noop() {
        let mut learner = PolicyGradientLearner::new(
            LinearStub::new(vec![0.0; ACTION_SPACE], ACTION_SPACE),
            None,
            0.99,
        );
        let result = learner.update(&[]).unwrap();
        assert_eq!(result.steps, 0);
    }
}
