//! Action selection over legal moves.
//!
//! Both strategies operate on raw Q-values restricted to the legal-action
//! mask. Greedy ties break toward the smallest action index so a fixed seed
//! reproduces a game exactly.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::codec::ActionMask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationKind {
    EpsilonGreedy,
    Boltzmann,
}

#[derive(Debug, Clone)]
pub enum ExplorationPolicy {
    EpsilonGreedy {
        epsilon: f64,
        epsilon_min: f64,
        epsilon_decay: f64,
    },
    Boltzmann {
        temperature: f64,
        temperature_min: f64,
        temperature_decay: f64,
    },
}

impl ExplorationPolicy {
    pub fn epsilon_greedy(epsilon: f64, epsilon_min: f64, epsilon_decay: f64) -> ExplorationPolicy {
        ExplorationPolicy::EpsilonGreedy {
            epsilon,
            epsilon_min,
            epsilon_decay,
        }
    }

    pub fn boltzmann(
        temperature: f64,
        temperature_min: f64,
        temperature_decay: f64,
    ) -> ExplorationPolicy {
        ExplorationPolicy::Boltzmann {
            temperature,
            temperature_min,
            temperature_decay,
        }
    }

    /// Pure exploitation: argmax over legal actions, no decay.
    pub fn greedy() -> ExplorationPolicy {
        ExplorationPolicy::EpsilonGreedy {
            epsilon: 0.0,
            epsilon_min: 0.0,
            epsilon_decay: 1.0,
        }
    }

    /// Pick a legal action for the given Q-values. `None` iff the mask is
    /// empty.
    pub fn select_action(
        &self,
        q_values: &[f32],
        mask: &ActionMask,
        rng: &mut StdRng,
    ) -> Option<usize> {
        let legal: Vec<usize> = mask.indices().collect();
        if legal.is_empty() {
            return None;
        }
        match self {
            ExplorationPolicy::EpsilonGreedy { epsilon, .. } => {
                if rng.random::<f64>() < *epsilon {
                    Some(legal[rng.random_range(0..legal.len())])
                } else {
                    Some(argmax_legal(q_values, &legal))
                }
            }
            ExplorationPolicy::Boltzmann { temperature, .. } => {
                Some(boltzmann_sample(q_values, &legal, *temperature, rng))
            }
        }
    }

    /// Per-episode decay of the exploration rate.
    pub fn update(&mut self) {
        match self {
            ExplorationPolicy::EpsilonGreedy {
                epsilon,
                epsilon_min,
                epsilon_decay,
            } => {
                *epsilon = (*epsilon * *epsilon_decay).max(*epsilon_min);
            }
            ExplorationPolicy::Boltzmann {
                temperature,
                temperature_min,
                temperature_decay,
            } => {
                *temperature = (*temperature * *temperature_decay).max(*temperature_min);
            }
        }
    }

    /// Current epsilon or temperature.
    pub fn current_rate(&self) -> f64 {
        match self {
            ExplorationPolicy::EpsilonGreedy { epsilon, .. } => *epsilon,
            ExplorationPolicy::Boltzmann { temperature, .. } => *temperature,
        }
    }
}

fn argmax_legal(q_values: &[f32], legal: &[usize]) -> usize {
    let mut best = legal[0];
    let mut best_q = q_at(q_values, best);
    for &index in &legal[1..] {
        let q = q_at(q_values, index);
        if q > best_q {
            best = index;
            best_q = q;
        }
    }
    best
}

fn boltzmann_sample(q_values: &[f32], legal: &[usize], temperature: f64, rng: &mut StdRng) -> usize {
    let tau = temperature.max(1e-8);
    let max_q = legal
        .iter()
        .map(|&i| q_at(q_values, i))
        .fold(f32::NEG_INFINITY, f32::max) as f64;
    let weights: Vec<f64> = legal
        .iter()
        .map(|&i| ((q_at(q_values, i) as f64 - max_q) / tau).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    let mut target = rng.random::<f64>() * total;
    for (pos, &w) in weights.iter().enumerate() {
        target -= w;
        if target <= 0.0 {
            return legal[pos];
        }
    }
    legal[legal.len() - 1]
}

fn q_at(q_values: &[f32], index: usize) -> f32 {
    q_values.get(index).copied().unwrap_or(f32::NEG_INFINITY)
}
