//! tch-backed MLP Q-network.
//!
//! Dense stack between the 839-wide feature input and the 4096-wide action
//! output, ReLU activations and dropout on hidden layers, optimizer chosen
//! from the network config. Weight init is seeded so two networks built
//! from the same config start identical.

use tch::nn::{self, OptimizerConfig};
use tch::{Device, Kind, Tensor};

use super::{TrainableNetwork, WeightMap, WeightTensor};
use crate::codec::{ACTION_SPACE, FEATURE_LEN};
use crate::config::{NetworkConfig, OptimizerKind};
use crate::{ChessRlError, Result};

pub struct QNetwork {
    vs: nn::VarStore,
    layers: Vec<nn::Linear>,
    opt: nn::Optimizer,
    dropout: f64,
    input_len: usize,
    output_len: usize,
}

impl QNetwork {
    /// Standard Q-network: position features in, action values out.
    pub fn new(config: &NetworkConfig) -> Result<QNetwork> {
        QNetwork::with_dims(config, FEATURE_LEN, ACTION_SPACE)
    }

    /// Network with caller-chosen arity, e.g. a scalar value baseline.
    pub fn with_dims(
        config: &NetworkConfig,
        input_len: usize,
        output_len: usize,
    ) -> Result<QNetwork> {
        tch::manual_seed(config.seed as i64);
        let vs = nn::VarStore::new(Device::Cpu);
        let p = vs.root();

        let mut layers = Vec::with_capacity(config.hidden_layers.len() + 1);
        let mut previous = input_len as i64;
        for (i, &width) in config.hidden_layers.iter().enumerate() {
            layers.push(nn::linear(
                &p / format!("fc{}", i),
                previous,
                width as i64,
                Default::default(),
            ));
            previous = width as i64;
        }
        layers.push(nn::linear(
            &p / "out",
            previous,
            output_len as i64,
            Default::default(),
        ));

        let lr = config.learning_rate;
        let opt = match config.optimizer {
            OptimizerKind::Adam => nn::Adam {
                wd: config.l2,
                ..Default::default()
            }
            .build(&vs, lr),
            OptimizerKind::Rmsprop => nn::RmsProp {
                wd: config.l2,
                ..Default::default()
            }
            .build(&vs, lr),
            OptimizerKind::Sgd => nn::Sgd {
                momentum: 0.9,
                wd: config.l2,
                ..Default::default()
            }
            .build(&vs, lr),
        }
        .map_err(|e| ChessRlError::Learner(format!("optimizer construction failed: {}", e)))?;

        Ok(QNetwork {
            vs,
            layers,
            opt,
            dropout: config.dropout,
            input_len,
            output_len,
        })
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Tensor {
        let mut h = x.shallow_clone();
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            h = h.apply(layer);
            if i < last {
                h = h.relu();
                if self.dropout > 0.0 {
                    h = h.dropout(self.dropout, train);
                }
            }
        }
        h
    }

    fn batch_tensor(&self, states: &[Vec<f64>]) -> Result<Tensor> {
        let mut flat = Vec::with_capacity(states.len() * self.input_len);
        for (row, state) in states.iter().enumerate() {
            if state.len() != self.input_len {
                return Err(ChessRlError::Learner(format!(
                    "state {} has {} features, network expects {}",
                    row,
                    state.len(),
                    self.input_len
                )));
            }
            flat.extend(state.iter().map(|&v| v as f32));
        }
        Ok(Tensor::from_slice(&flat)
            .view([states.len() as i64, self.input_len as i64])
            .to_kind(Kind::Float))
    }

    fn tensor_rows(&self, output: &Tensor, rows: usize) -> Result<Vec<Vec<f32>>> {
        let flat: Vec<f32> = Vec::<f32>::try_from(output.flatten(0, -1).contiguous())
            .map_err(|e| ChessRlError::Learner(format!("output extraction failed: {}", e)))?;
        Ok(flat
            .chunks(self.output_len)
            .take(rows)
            .map(|chunk| chunk.to_vec())
            .collect())
    }
}

impl TrainableNetwork for QNetwork {
    fn input_len(&self) -> usize {
        self.input_len
    }

    fn output_len(&self) -> usize {
        self.output_len
    }

    fn forward_batch(&self, states: &[Vec<f64>]) -> Result<Vec<Vec<f32>>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let input = self.batch_tensor(states)?;
        let output = tch::no_grad(|| self.forward_t(&input, false));
        self.tensor_rows(&output, states.len())
    }

    fn train_batch(&mut self, states: &[Vec<f64>], targets: &[Vec<f32>]) -> Result<f64> {
        if states.len() != targets.len() {
            return Err(ChessRlError::Learner(format!(
                "batch size mismatch: {} states vs {} targets",
                states.len(),
                targets.len()
            )));
        }
        if states.is_empty() {
            return Ok(0.0);
        }
        for (row, target) in targets.iter().enumerate() {
            if target.len() != self.output_len {
                return Err(ChessRlError::Learner(format!(
                    "target {} has {} entries, network produces {}",
                    row,
                    target.len(),
                    self.output_len
                )));
            }
        }

        let input = self.batch_tensor(states)?;
        let target_flat: Vec<f32> = targets.iter().flatten().copied().collect();
        let target = Tensor::from_slice(&target_flat)
            .view([targets.len() as i64, self.output_len as i64]);

        let prediction = self.forward_t(&input, true);
        let loss = prediction.mse_loss(&target, tch::Reduction::Mean);
        let loss_value = loss.double_value(&[]);
        if !loss_value.is_finite() {
            return Err(ChessRlError::Learner(
                "non-finite loss; skipping backpropagation".to_string(),
            ));
        }
        self.opt.backward_step(&loss);
        Ok(loss_value)
    }

    fn copy_weights_to(&self, other: &mut QNetwork) -> Result<()> {
        let source = self.vs.variables();
        tch::no_grad(|| {
            for (name, mut destination) in other.vs.variables() {
                if let Some(tensor) = source.get(&name) {
                    destination.copy_(tensor);
                }
            }
        });
        Ok(())
    }

    fn export_weights(&self) -> WeightMap {
        let mut weights = WeightMap::new();
        for (name, tensor) in self.vs.variables() {
            let shape: Vec<usize> = tensor.size().iter().map(|&d| d as usize).collect();
            let flat = tensor
                .to_device(Device::Cpu)
                .to_kind(Kind::Float)
                .flatten(0, -1)
                .contiguous();
            let data = Vec::<f32>::try_from(flat).unwrap_or_default();
            weights.insert(name, WeightTensor { shape, data });
        }
        weights
    }

    fn import_weights(&mut self, weights: &WeightMap) -> Result<()> {
        tch::no_grad(|| -> Result<()> {
            for (name, mut variable) in self.vs.variables() {
                let Some(stored) = weights.get(&name) else {
                    return Err(ChessRlError::Checkpoint(format!(
                        "tensor '{}' missing from checkpoint",
                        name
                    )));
                };
                let shape: Vec<i64> = stored.shape.iter().map(|&d| d as i64).collect();
                let expected: Vec<i64> = variable.size();
                if shape != expected {
                    return Err(ChessRlError::Checkpoint(format!(
                        "tensor '{}' has shape {:?}, network expects {:?}",
                        name, shape, expected
                    )));
                }
                let tensor = Tensor::from_slice(&stored.data).reshape(&shape[..]);
                variable.copy_(&tensor);
            }
            Ok(())
        })
    }
}
