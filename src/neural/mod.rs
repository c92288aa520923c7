//! Trainable network abstraction.
//!
//! The learners only see this trait: a forward pass, one batched training
//! step on (input, target) arrays, and weight copy/export. Everything
//! backend-specific stays behind it, so tests can substitute a deterministic
//! stub and the checkpoint store works on plain named tensors.

pub mod model_io;
pub mod qnet;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Result;

/// A named tensor in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Backend-neutral parameter set, keyed by parameter name. BTreeMap keeps
/// serialization order stable across runs.
pub type WeightMap = BTreeMap<String, WeightTensor>;

/// Minimal contract the learners depend on.
pub trait TrainableNetwork {
    fn input_len(&self) -> usize;

    fn output_len(&self) -> usize;

    /// Batched forward pass; one output row per input row.
    fn forward_batch(&self, states: &[Vec<f64>]) -> Result<Vec<Vec<f32>>>;

    /// One optimizer step toward the targets under MSE; returns the batch
    /// loss.
    fn train_batch(&mut self, states: &[Vec<f64>], targets: &[Vec<f32>]) -> Result<f64>;

    /// Overwrite `other`'s parameters with this network's.
    fn copy_weights_to(&self, other: &mut Self) -> Result<()>
    where
        Self: Sized;

    fn export_weights(&self) -> WeightMap;

    fn import_weights(&mut self, weights: &WeightMap) -> Result<()>;
}
