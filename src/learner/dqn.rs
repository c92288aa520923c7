//! Deep Q-Network learner.
//!
//! Maintains an online and a target network of identical architecture.
//! Bootstrap targets always max over the *legal* actions of the successor
//! state; an unmasked argmax silently learns from illegal moves and is
//! treated as a correctness bug here. The target network is refreshed from
//! the online one on a fixed update cadence.

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{masked_softmax_entropy, UpdateResult};
use crate::codec::ACTION_SPACE;
use crate::neural::TrainableNetwork;
use crate::replay::{ReplayBuffer, Transition};
use crate::{ChessRlError, Result};

#[derive(Debug, Clone, Copy)]
pub struct DqnParams {
    pub gamma: f64,
    pub batch_size: usize,
    pub target_sync_frequency: u64,
    pub min_replay_size: usize,
    pub double_dqn: bool,
}

pub struct DqnLearner<N: TrainableNetwork> {
    online: N,
    target: N,
    buffer: ReplayBuffer,
    params: DqnParams,
    update_count: u64,
    last_sync_at: u64,
    rng: StdRng,
}

impl<N: TrainableNetwork> DqnLearner<N> {
    /// Build a learner and synchronize the target network so both start
    /// from identical parameters.
    pub fn new(online: N, mut target: N, buffer: ReplayBuffer, params: DqnParams, seed: u64) -> Result<DqnLearner<N>> {
        online.copy_weights_to(&mut target)?;
        Ok(DqnLearner {
            online,
            target,
            buffer,
            params,
            update_count: 0,
            last_sync_at: 0,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn online(&self) -> &N {
        &self.online
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn last_sync_at(&self) -> u64 {
        self.last_sync_at
    }

    /// Validate and enqueue fresh experiences without training.
    pub fn push(&mut self, experiences: Vec<Transition>) -> Result<()> {
        for transition in experiences {
            self.validate_transition(&transition)?;
            self.buffer.add(transition);
        }
        Ok(())
    }

    /// Enqueue experiences, then run one batched update if the buffer holds
    /// enough transitions; otherwise return the quiescent result.
    pub fn update(&mut self, experiences: Vec<Transition>) -> Result<UpdateResult> {
        self.push(experiences)?;
        self.train_step()
    }

    fn validate_transition(&self, transition: &Transition) -> Result<()> {
        if transition.state.len() != self.online.input_len()
            || transition.next_state.len() != self.online.input_len()
        {
            return Err(ChessRlError::Learner(format!(
                "encoded state width {} does not match network input {}",
                transition.state.len(),
                self.online.input_len()
            )));
        }
        if transition.action >= ACTION_SPACE {
            return Err(ChessRlError::Codec(format!(
                "action index {} outside [0, {})",
                transition.action, ACTION_SPACE
            )));
        }
        if !transition.done {
            match &transition.next_legal_mask {
                Some(mask) if !mask.is_empty() => {}
                _ => {
                    return Err(ChessRlError::Codec(
                        "non-terminal transition without a legal mask for its successor"
                            .to_string(),
                    ))
                }
            }
        }
        Ok(())
    }

    /// One batched update over a sampled batch.
    pub fn train_step(&mut self) -> Result<UpdateResult> {
        let threshold = self.params.min_replay_size.max(self.params.batch_size);
        if self.buffer.size() < threshold {
            return Ok(UpdateResult::quiescent());
        }

        let samples = self.buffer.sample(self.params.batch_size, &mut self.rng)?;
        let indices: Vec<usize> = samples.iter().map(|s| s.index).collect();
        let weights: Vec<f64> = samples.iter().map(|s| s.weight).collect();

        let mut states = Vec::with_capacity(indices.len());
        let mut next_states = Vec::with_capacity(indices.len());
        for &index in &indices {
            let t = self.buffer.get(index);
            states.push(t.state.clone());
            next_states.push(t.next_state.clone());
        }

        let q_pred = self.online.forward_batch(&states)?;
        let q_next_target = self.target.forward_batch(&next_states)?;
        let q_next_online = if self.params.double_dqn {
            Some(self.online.forward_batch(&next_states)?)
        } else {
            None
        };
        for row in &q_pred {
            if row.iter().any(|v| !v.is_finite()) {
                return Err(ChessRlError::Learner(
                    "NaN/Inf in online network output".to_string(),
                ));
            }
        }

        let mut targets: Vec<Vec<f32>> = Vec::with_capacity(indices.len());
        let mut td_errors = Vec::with_capacity(indices.len());
        let mut gradient_norm = 0.0;
        let mut entropy = 0.0;
        let mut q_sum = 0.0;
        let mut target_sum = 0.0;

        for (row, &index) in indices.iter().enumerate() {
            let transition = self.buffer.get(index);
            let action = transition.action;

            let bootstrap = if transition.done {
                transition.reward
            } else {
                let legal: Vec<usize> = transition
                    .next_legal_mask
                    .as_ref()
                    .map(|m| m.indices().collect())
                    .unwrap_or_default();
                // Empty legal set on a mis-tagged terminal bootstraps to 0.
                let next_value = match &q_next_online {
                    Some(online_rows) if !legal.is_empty() => {
                        let best = legal
                            .iter()
                            .copied()
                            .max_by(|&a, &b| {
                                online_rows[row][a]
                                    .partial_cmp(&online_rows[row][b])
                                    .unwrap_or(std::cmp::Ordering::Equal)
                            })
                            .unwrap_or(legal[0]);
                        q_next_target[row][best] as f64
                    }
                    None if !legal.is_empty() => legal
                        .iter()
                        .map(|&a| q_next_target[row][a] as f64)
                        .fold(f64::NEG_INFINITY, f64::max),
                    _ => 0.0,
                };
                transition.reward + self.params.gamma * next_value
            };

            let predicted = q_pred[row][action] as f64;
            let td_error = predicted - bootstrap;
            // Importance weight folded into the target displacement: for MSE
            // this scales the gradient of the taken action by exactly w.
            let adjusted = predicted + weights[row] * (bootstrap - predicted);

            let mut target_row = q_pred[row].clone();
            target_row[action] = adjusted as f32;

            // Only the taken-action entry differs from the prediction, so
            // the per-sample norm collapses to that single component.
            gradient_norm += (2.0 / ACTION_SPACE as f64) * (adjusted - predicted).abs();
            entropy += masked_softmax_entropy(
                &q_pred[row],
                &transition.legal_mask.indices().collect::<Vec<_>>(),
            );
            q_sum += predicted;
            target_sum += bootstrap;

            targets.push(target_row);
            td_errors.push(td_error);
        }

        let batch = indices.len();
        let loss = self.online.train_batch(&states, &targets)?;
        self.buffer.update_priorities(&indices, &td_errors)?;

        self.update_count += 1;
        let mut synced = false;
        if self.update_count % self.params.target_sync_frequency == 0 {
            self.online.copy_weights_to(&mut self.target)?;
            self.last_sync_at = self.update_count;
            synced = true;
            log::info!("target network synced at update {}", self.update_count);
        }

        Ok(UpdateResult {
            loss,
            gradient_norm: gradient_norm / batch as f64,
            policy_entropy: entropy / batch as f64,
            q_mean: q_sum / batch as f64,
            target_mean: target_sum / batch as f64,
            batch_size: batch,
            synced_target: synced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ActionMask;
    use crate::neural::WeightMap;
    use assert_matches::assert_matches;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Deterministic stand-in network: fixed forward output, records every
    /// training call.
    struct StubNet {
        output: Vec<f32>,
        trained: Rc<RefCell<Vec<Vec<Vec<f32>>>>>,
        input_len: usize,
    }

    impl StubNet {
        fn new(output: Vec<f32>, input_len: usize) -> StubNet {
            StubNet {
                output,
                trained: Rc::new(RefCell::new(Vec::new())),
                input_len,
            }
        }
    }

    impl TrainableNetwork for StubNet {
        fn input_len(&self) -> usize {
            self.input_len
        }

        fn output_len(&self) -> usize {
            ACTION_SPACE
        }

        fn forward_batch(&self, states: &[Vec<f64>]) -> Result<Vec<Vec<f32>>> {
            Ok(states.iter().map(|_| self.output.clone()).collect())
        }

        fn train_batch(&mut self, _states: &[Vec<f64>], targets: &[Vec<f32>]) -> Result<f64> {
            self.trained.borrow_mut().push(targets.to_vec());
            Ok(0.25)
        }

        fn copy_weights_to(&self, other: &mut StubNet) -> Result<()> {
            other.output = self.output.clone();
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

    fn transition(action: usize, reward: f64, done: bool, next_legal: &[usize]) -> Transition {
        Transition {
            state: vec![0.0; 4],
            action,
            reward,
            next_state: vec![0.0; 4],
            done,
            legal_mask: mask_of(&[action]),
            next_legal_mask: if done { None } else { Some(mask_of(next_legal)) },
        }
    }

    fn learner_with(
        online_q: Vec<f32>,
        target_q: Vec<f32>,
        params: DqnParams,
    ) -> DqnLearner<StubNet> {
        let online = StubNet::new(online_q, 4);
        // The constructor syncs target from online; re-seed the target
        // output afterwards to model Q-hat diverging from Q.
        let mut learner = DqnLearner::new(
            online,
            StubNet::new(vec![0.0; ACTION_SPACE], 4),
            ReplayBuffer::uniform(64),
            params,
            9,
        )
        .unwrap();
        learner.target.output = target_q;
        learner
    }

    fn base_params() -> DqnParams {
        DqnParams {
            gamma: 0.5,
            batch_size: 1,
            target_sync_frequency: 1_000,
            min_replay_size: 1,
            double_dqn: false,
        }
    }

    #[test]
    fn test_masked_bootstrap_ignores_illegal_peak() {
        // Q-hat(s') = [5, 100, 1, -3, 0, ...]; only actions {0, 2} legal.
        let mut target_q = vec![0.0f32; ACTION_SPACE];
        target_q[0] = 5.0;
        target_q[1] = 100.0;
        target_q[2] = 1.0;
        target_q[3] = -3.0;
        let mut learner = learner_with(vec![0.0; ACTION_SPACE], target_q, base_params());

        let result = learner
            .update(vec![transition(7, 1.0, false, &[0, 2])])
            .unwrap();
        assert_eq!(result.batch_size, 1);
        // y = 1.0 + 0.5 * max(5, 1) = 3.5; the 100 at illegal index 1 is ignored.
        assert!((result.target_mean - 3.5).abs() < 1e-6);
        let trained = learner.online.trained.borrow();
        let target_row = &trained[0][0];
        assert!((target_row[7] - 3.5).abs() < 1e-6);
        // All other entries keep the predicted value.
        assert_eq!(target_row[0], 0.0);
        assert_eq!(target_row[1], 0.0);
    }

    #[test]
    fn test_terminal_target_is_reward() {
        let mut learner =
            learner_with(vec![0.0; ACTION_SPACE], vec![9.0; ACTION_SPACE], base_params());
        let result = learner.update(vec![transition(3, -1.0, true, &[])]).unwrap();
        assert!((result.target_mean - -1.0).abs() < 1e-9);
        let trained = learner.online.trained.borrow();
        assert!((trained[0][0][3] - -1.0).abs() < 1e-6);
    }

    #[test]
    fn test_underfilled_buffer_is_quiescent() {
        let mut params = base_params();
        params.batch_size = 8;
        params.min_replay_size = 8;
        let mut learner =
            learner_with(vec![0.0; ACTION_SPACE], vec![0.0; ACTION_SPACE], params);
        let result = learner.update(vec![transition(0, 0.0, false, &[1])]).unwrap();
        assert!(result.is_quiescent());
    }

    #[test]
    fn test_target_sync_cadence() {
        let mut params = base_params();
        params.target_sync_frequency = 2;
        let mut learner =
            learner_with(vec![0.0; ACTION_SPACE], vec![0.0; ACTION_SPACE], params);

        let first = learner.update(vec![transition(0, 0.0, false, &[1])]).unwrap();
        assert!(!first.synced_target);
        assert_eq!(learner.last_sync_at(), 0);

        let second = learner.update(vec![transition(1, 0.0, false, &[2])]).unwrap();
        assert!(second.synced_target);
        assert_eq!(learner.last_sync_at(), 2);
        assert_eq!(learner.update_count(), 2);

        let third = learner.update(vec![transition(2, 0.0, false, &[3])]).unwrap();
        assert!(!third.synced_target);
        assert_eq!(learner.last_sync_at(), 2);
    }

    #[test]
    fn test_rejects_out_of_range_action() {
        let mut learner =
            learner_with(vec![0.0; ACTION_SPACE], vec![0.0; ACTION_SPACE], base_params());
        let mut bad = transition(0, 0.0, false, &[1]);
        bad.action = ACTION_SPACE;
        assert_matches!(learner.update(vec![bad]), Err(ChessRlError::Codec(_)));
    }

    #[test]
    fn test_rejects_missing_next_mask() {
        let mut learner =
            learner_with(vec![0.0; ACTION_SPACE], vec![0.0; ACTION_SPACE], base_params());
        let mut bad = transition(0, 0.0, false, &[1]);
        bad.next_legal_mask = None;
        assert_matches!(learner.update(vec![bad]), Err(ChessRlError::Codec(_)));
    }

    #[test]
    fn test_rejects_feature_width_mismatch() {
        let mut learner =
            learner_with(vec![0.0; ACTION_SPACE], vec![0.0; ACTION_SPACE], base_params());
        let mut bad = transition(0, 0.0, false, &[1]);
        bad.state = vec![0.0; 7];
        assert_matches!(learner.update(vec![bad]), Err(ChessRlError::Learner(_)));
    }

    #[test]
    fn test_double_dqn_uses_online_argmax() {
        // Online net prefers action 2 among the legal {0, 2}; target values
        // differ so plain DQN would bootstrap from action 0 instead.
        let mut online_q = vec![0.0f32; ACTION_SPACE];
        online_q[0] = 1.0;
        online_q[2] = 4.0;
        let mut target_q = vec![0.0f32; ACTION_SPACE];
        target_q[0] = 8.0;
        target_q[2] = 2.0;
        let mut params = base_params();
        params.double_dqn = true;
        let mut learner = learner_with(online_q, target_q, params);

        let result = learner
            .update(vec![transition(5, 0.0, false, &[0, 2])])
            .unwrap();
        // y = 0 + 0.5 * Q-hat(argmax_online) = 0.5 * 2.0
        assert!((result.target_mean - 1.0).abs() < 1e-6);
    }
}
