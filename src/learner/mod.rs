//! Learners: DQN with masked bootstrap targets, and an optional REINFORCE
//! policy-gradient variant.

pub mod dqn;
pub mod policy_gradient;

use serde::{Deserialize, Serialize};

/// Diagnostics of one learner update.
///
/// `gradient_norm` is the output-layer surrogate `mean ||(2/A)(Q - y*)||`,
/// good enough for explode/vanish detection; `policy_entropy` is measured
/// in nats over the legal-action softmax.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdateResult {
    pub loss: f64,
    pub gradient_norm: f64,
    pub policy_entropy: f64,
    pub q_mean: f64,
    pub target_mean: f64,
    pub batch_size: usize,
    pub synced_target: bool,
}

impl UpdateResult {
    /// The documented no-op result while the buffer is underfilled.
    pub fn quiescent() -> UpdateResult {
        UpdateResult {
            loss: 0.0,
            gradient_norm: 0.0,
            policy_entropy: 0.0,
            q_mean: 0.0,
            target_mean: 0.0,
            batch_size: 0,
            synced_target: false,
        }
    }

    pub fn is_quiescent(&self) -> bool {
        self.batch_size == 0
    }
}

/// Entropy of the softmax over the rows restricted to `legal`, in nats.
pub(crate) fn masked_softmax_entropy(q_values: &[f32], legal: &[usize]) -> f64 {
    if legal.is_empty() {
        return 0.0;
    }
    let max_q = legal
        .iter()
        .map(|&i| q_values[i] as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = legal
        .iter()
        .map(|&i| (q_values[i] as f64 - max_q).exp())
        .collect();
    let total: f64 = exps.iter().sum();
    exps.iter()
        .map(|&e| {
            let p = e / total;
            if p > 0.0 {
                -p * p.ln()
            } else {
                0.0
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_entropy() {
        let q = vec![1.0f32; 8];
        let legal = vec![0, 1, 2, 3];
        let entropy = masked_softmax_entropy(&q, &legal);
        assert!((entropy - (4.0f64).ln()).abs() < 1e-9);
    }

    #[test]
    fn test_peaked_entropy_near_zero() {
        let mut q = vec![0.0f32; 8];
        q[2] = 50.0;
        let legal = vec![0, 1, 2, 3];
        assert!(masked_softmax_entropy(&q, &legal) < 1e-6);
    }
}
