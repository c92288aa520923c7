//! Experience replay.
//!
//! A bounded ring of transitions with two sampling strategies: uniform and
//! prioritized (proportional to |TD error|^alpha with importance-sampling
//! weights, beta annealed toward 1). Sampling is without replacement.

use rand::rngs::StdRng;
use rand::Rng;

use crate::codec::ActionMask;
use crate::{ChessRlError, Result};

/// One self-play experience.
///
/// `next_legal_mask` must be present whenever `done` is false; the learner
/// needs it for the masked bootstrap. `legal_mask` covers the *current*
/// state and feeds the policy-entropy diagnostic.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: Vec<f64>,
    pub action: usize,
    pub reward: f64,
    pub next_state: Vec<f64>,
    pub done: bool,
    pub legal_mask: ActionMask,
    pub next_legal_mask: Option<ActionMask>,
}

/// Sampled batch entry: buffer slot index plus importance weight.
#[derive(Debug, Clone, Copy)]
pub struct SampleRef {
    pub index: usize,
    pub weight: f64,
}

/// Priority floor so no stored transition becomes unsampleable.
pub const PRIORITY_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayKind {
    Uniform,
    Prioritized,
}

/// Fixed-capacity transition store. Insertion overwrites the oldest entry.
pub struct ReplayBuffer {
    items: Vec<Transition>,
    priorities: Vec<f64>,
    head: usize,
    capacity: usize,
    kind: ReplayKind,
    alpha: f64,
    beta: f64,
    beta_increment: f64,
    max_priority: f64,
}

impl ReplayBuffer {
    pub fn uniform(capacity: usize) -> ReplayBuffer {
        ReplayBuffer::new(capacity, ReplayKind::Uniform, 0.6, 0.4, 1e-4)
    }

    pub fn prioritized(capacity: usize, alpha: f64, beta: f64) -> ReplayBuffer {
        ReplayBuffer::new(capacity, ReplayKind::Prioritized, alpha, beta, 1e-4)
    }

    fn new(
        capacity: usize,
        kind: ReplayKind,
        alpha: f64,
        beta: f64,
        beta_increment: f64,
    ) -> ReplayBuffer {
        ReplayBuffer {
            items: Vec::with_capacity(capacity.min(4096)),
            priorities: Vec::with_capacity(capacity.min(4096)),
            head: 0,
            capacity,
            kind,
            alpha,
            beta,
            beta_increment,
            max_priority: 1.0,
        }
    }

    pub fn kind(&self) -> ReplayKind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.priorities.clear();
        self.head = 0;
        self.max_priority = 1.0;
    }

    pub fn get(&self, index: usize) -> &Transition {
        &self.items[index]
    }

    /// O(1) insert; evicts the oldest transition once full. New entries get
    /// the running maximum priority so they are sampled at least once soon.
    pub fn add(&mut self, transition: Transition) {
        if self.items.len() < self.capacity {
            self.items.push(transition);
            self.priorities.push(self.max_priority);
        } else {
            self.items[self.head] = transition;
            self.priorities[self.head] = self.max_priority;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Draw `k` distinct slots. Uniform sampling returns weight 1 for every
    /// entry; prioritized sampling returns max-normalized importance
    /// weights and anneals beta toward 1.
    pub fn sample(&mut self, k: usize, rng: &mut StdRng) -> Result<Vec<SampleRef>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let n = self.items.len();
        if k > n {
            return Err(ChessRlError::Replay(format!(
                "requested batch of {} from buffer of {}",
                k, n
            )));
        }
        match self.kind {
            ReplayKind::Uniform => Ok(self.sample_uniform(k, rng)),
            ReplayKind::Prioritized => Ok(self.sample_prioritized(k, rng)),
        }
    }

    fn sample_uniform(&self, k: usize, rng: &mut StdRng) -> Vec<SampleRef> {
        // Partial Fisher-Yates over an index pool.
        let n = self.items.len();
        let mut pool: Vec<usize> = (0..n).collect();
        let mut out = Vec::with_capacity(k);
        for i in 0..k {
            let j = rng.random_range(i..n);
            pool.swap(i, j);
            out.push(SampleRef {
                index: pool[i],
                weight: 1.0,
            });
        }
        out
    }

    fn sample_prioritized(&mut self, k: usize, rng: &mut StdRng) -> Vec<SampleRef> {
        let n = self.items.len();
        self.beta = (self.beta + self.beta_increment).min(1.0);

        let mut scaled: Vec<f64> = self
            .priorities
            .iter()
            .map(|p| p.max(PRIORITY_EPSILON).powf(self.alpha))
            .collect();
        let mut total: f64 = scaled.iter().sum();

        // Remember each pick's sampling probability before zeroing it out
        // for the without-replacement draw.
        let mut picks: Vec<(usize, f64)> = Vec::with_capacity(k);
        for _ in 0..k {
            let mut target = rng.random::<f64>() * total;
            let mut chosen = None;
            let mut last_live = 0;
            for (index, &weight) in scaled.iter().enumerate() {
                if weight <= 0.0 {
                    continue;
                }
                last_live = index;
                target -= weight;
                if target <= 0.0 {
                    chosen = Some(index);
                    break;
                }
            }
            // Float drift can leave target marginally positive; fall back to
            // the last still-sampleable slot.
            let chosen = chosen.unwrap_or(last_live);
            picks.push((chosen, scaled[chosen] / total.max(f64::MIN_POSITIVE)));
            total -= scaled[chosen];
            scaled[chosen] = 0.0;
        }

        let mut weights: Vec<f64> = picks
            .iter()
            .map(|&(_, prob)| (n as f64 * prob.max(f64::MIN_POSITIVE)).powf(-self.beta))
            .collect();
        let max_weight = weights.iter().cloned().fold(f64::MIN_POSITIVE, f64::max);
        for w in weights.iter_mut() {
            *w /= max_weight;
        }

        picks
            .into_iter()
            .zip(weights)
            .map(|((index, _), weight)| SampleRef { index, weight })
            .collect()
    }

    /// Refresh priorities from fresh TD errors: `p_i = |td_i| + epsilon`.
    /// A no-op for the uniform variant.
    pub fn update_priorities(&mut self, indices: &[usize], td_errors: &[f64]) -> Result<()> {
        if self.kind == ReplayKind::Uniform {
            return Ok(());
        }
        if indices.len() != td_errors.len() {
            return Err(ChessRlError::Replay(format!(
                "priority update length mismatch: {} indices vs {} errors",
                indices.len(),
                td_errors.len()
            )));
        }
        for (&index, &td) in indices.iter().zip(td_errors) {
            if index >= self.priorities.len() {
                return Err(ChessRlError::Replay(format!(
                    "priority index {} outside buffer of {}",
                    index,
                    self.priorities.len()
                )));
            }
            let p = td.abs() + PRIORITY_EPSILON;
            self.priorities[index] = p;
            self.max_priority = self.max_priority.max(p);
        }
        Ok(())
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rand::SeedableRng;

    fn transition(tag: f64) -> Transition {
        Transition {
            state: vec![tag],
            action: 0,
            reward: tag,
            next_state: vec![tag],
            done: false,
            legal_mask: ActionMask::empty(),
            next_legal_mask: Some(ActionMask::empty()),
        }
    }

    #[test]
    fn test_eviction_keeps_last_capacity_items() {
        let mut buffer = ReplayBuffer::uniform(3);
        for i in 0..7 {
            buffer.add(transition(i as f64));
            assert!(buffer.size() <= buffer.capacity());
        }
        assert_eq!(buffer.size(), 3);
        let mut rewards: Vec<f64> = (0..3).map(|i| buffer.get(i).reward).collect();
        rewards.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(rewards, vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_sample_full_buffer_is_permutation() {
        let mut buffer = ReplayBuffer::uniform(8);
        for i in 0..8 {
            buffer.add(transition(i as f64));
        }
        let mut rng = StdRng::seed_from_u64(7);
        let sampled = buffer.sample(8, &mut rng).unwrap();
        let mut indices: Vec<usize> = sampled.iter().map(|s| s.index).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..8).collect::<Vec<_>>());
        assert!(sampled.iter().all(|s| s.weight == 1.0));
    }

    #[test]
    fn test_sample_zero_is_noop() {
        let mut buffer = ReplayBuffer::uniform(4);
        buffer.add(transition(1.0));
        let mut rng = StdRng::seed_from_u64(1);
        assert!(buffer.sample(0, &mut rng).unwrap().is_empty());
    }

    #[test]
    fn test_oversample_is_replay_error() {
        let mut buffer = ReplayBuffer::uniform(4);
        buffer.add(transition(1.0));
        let mut rng = StdRng::seed_from_u64(1);
        assert_matches!(buffer.sample(2, &mut rng), Err(ChessRlError::Replay(_)));
    }

    #[test]
    fn test_prioritized_no_duplicates_and_weights_bounded() {
        let mut buffer = ReplayBuffer::prioritized(16, 0.7, 0.5);
        for i in 0..16 {
            buffer.add(transition(i as f64));
        }
        buffer
            .update_priorities(&[0, 1, 2], &[5.0, 0.1, 2.0])
            .unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let sampled = buffer.sample(8, &mut rng).unwrap();
        let mut indices: Vec<usize> = sampled.iter().map(|s| s.index).collect();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), 8);
        assert!(sampled.iter().all(|s| s.weight > 0.0 && s.weight <= 1.0));
        assert!(sampled.iter().any(|s| (s.weight - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_priority_update_mismatch() {
        let mut buffer = ReplayBuffer::prioritized(4, 0.7, 0.5);
        buffer.add(transition(0.0));
        assert_matches!(
            buffer.update_priorities(&[0, 1], &[1.0]),
            Err(ChessRlError::Replay(_))
        );
    }

    #[test]
    fn test_beta_anneals_toward_one() {
        let mut buffer = ReplayBuffer::prioritized(4, 0.7, 0.5);
        for i in 0..4 {
            buffer.add(transition(i as f64));
        }
        let mut rng = StdRng::seed_from_u64(3);
        let before = buffer.beta();
        buffer.sample(2, &mut rng).unwrap();
        assert!(buffer.beta() > before);
        assert!(buffer.beta() <= 1.0);
    }
}
