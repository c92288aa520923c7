//! Playing agents.
//!
//! One small trait instead of an inheritance tree: every agent picks an
//! action index given the position, its encoded features and the legality
//! mask. Network-driven agents ignore the raw position; search agents
//! ignore the features.

pub mod heuristic;
pub mod minimax;

use rand::rngs::StdRng;
use rand::Rng;

use crate::codec::{encode_move, ActionMask};
use crate::engine::ChessEngine;
use crate::exploration::ExplorationPolicy;
use crate::neural::TrainableNetwork;
use crate::{ChessRlError, Result};

pub use heuristic::HeuristicAgent;
pub use minimax::MinimaxAgent;

pub trait Agent<E: ChessEngine> {
    fn name(&self) -> &str;

    /// Pick a legal action index for the current position.
    fn select_action(
        &mut self,
        engine: &E,
        state: &E::State,
        features: &[f64],
        mask: &ActionMask,
        rng: &mut StdRng,
    ) -> Result<usize>;

    /// Episode-boundary hook (exploration decay and the like).
    fn on_episode_end(&mut self) {}
}

/// Uniform random over legal actions; the weakest baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomAgent;

impl<E: ChessEngine> Agent<E> for RandomAgent {
    fn name(&self) -> &str {
        "random"
    }

    fn select_action(
        &mut self,
        _engine: &E,
        _state: &E::State,
        _features: &[f64],
        mask: &ActionMask,
        rng: &mut StdRng,
    ) -> Result<usize> {
        let legal: Vec<usize> = mask.indices().collect();
        if legal.is_empty() {
            return Err(ChessRlError::Codec(
                "no legal actions to sample from".to_string(),
            ));
        }
        Ok(legal[rng.random_range(0..legal.len())])
    }
}

/// Q-network inference plus an exploration policy. Borrows the network
/// read-only; the learner keeps exclusive write access.
pub struct DqnAgent<'a, N: TrainableNetwork> {
    network: &'a N,
    policy: ExplorationPolicy,
}

impl<'a, N: TrainableNetwork> DqnAgent<'a, N> {
    pub fn new(network: &'a N, policy: ExplorationPolicy) -> DqnAgent<'a, N> {
        DqnAgent { network, policy }
    }

    /// Pure-exploitation variant used for evaluation games.
    pub fn greedy(network: &'a N) -> DqnAgent<'a, N> {
        DqnAgent::new(network, ExplorationPolicy::greedy())
    }

    pub fn exploration_rate(&self) -> f64 {
        self.policy.current_rate()
    }
}

impl<'a, E: ChessEngine, N: TrainableNetwork> Agent<E> for DqnAgent<'a, N> {
    fn name(&self) -> &str {
        "dqn"
    }

    fn select_action(
        &mut self,
        _engine: &E,
        _state: &E::State,
        features: &[f64],
        mask: &ActionMask,
        rng: &mut StdRng,
    ) -> Result<usize> {
        let mut rows = self.network.forward_batch(&[features.to_vec()])?;
        let q_values = rows.pop().ok_or_else(|| {
            ChessRlError::Learner("network returned no output row".to_string())
        })?;
        self.policy
            .select_action(&q_values, mask, rng)
            .ok_or_else(|| ChessRlError::Codec("empty legal mask for action selection".to_string()))
    }

    fn on_episode_end(&mut self) {
        self.policy.update();
    }
}

/// Map a concrete move back onto the action channel, verifying it is
/// representable (used by search agents).
pub(crate) fn action_of(mv: &crate::engine::ChessMove) -> usize {
    encode_move(mv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::native::NativeEngine;
    use crate::engine::ChessEngine;
    use rand::SeedableRng;

    #[test]
    fn test_random_agent_picks_legal_action() {
        let engine = NativeEngine::new();
        let state = engine.initial_state();
        let legal = engine.legal_moves(&state);
        let mask = crate::codec::legal_mask(&legal);
        let features = crate::codec::encode_state(&engine.snapshot(&state));
        let mut agent = RandomAgent;
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..10 {
            let action = agent
                .select_action(&engine, &state, &features, &mask, &mut rng)
                .unwrap();
            assert!(mask.get(action));
        }
    }
}
