//! Training configuration.
//!
//! All knobs live in immutable structs with documented defaults. CLI flags
//! map 1:1 onto fields; named profiles are starting points, not hidden
//! state. `validate()` runs once at startup and is the only place
//! configuration errors originate.

use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointBackend;
use crate::exploration::ExplorationKind;
use crate::replay::ReplayKind;
use crate::selfplay::RewardConfig;
use crate::{ChessRlError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Adam,
    Rmsprop,
    Sgd,
}

/// Q-network architecture and optimizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Hidden layer widths between the 839-wide input and 4096-wide output
    /// Default: [512, 256, 128]
    pub hidden_layers: Vec<usize>,

    /// Optimizer step size
    /// Default: 1e-3
    pub learning_rate: f64,

    /// Samples per training batch
    /// Default: 64
    pub batch_size: usize,

    /// Default: adam
    pub optimizer: OptimizerKind,

    /// L2 weight decay
    /// Default: 1e-3
    pub l2: f64,

    /// Dropout probability on hidden activations
    /// Default: 0.1
    pub dropout: f64,

    /// Root seed for weight init and all derived component RNGs
    /// Default: 42
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![512, 256, 128],
            learning_rate: 1e-3,
            batch_size: 64,
            optimizer: OptimizerKind::Adam,
            l2: 1e-3,
            dropout: 0.1,
            seed: 42,
        }
    }
}

/// Reinforcement-learning hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RlConfig {
    /// Discount factor
    /// Default: 0.99
    pub gamma: f64,

    /// Updates between target-network syncs
    /// Default: 100
    pub target_update_frequency: u64,

    /// Default: uniform
    pub replay_type: ReplayKind,

    /// Default: 50_000
    pub replay_capacity: usize,

    /// Updates are no-ops until the buffer holds this many transitions.
    /// `None` means the batch size.
    pub min_replay_size: Option<usize>,

    /// Default: epsilon_greedy
    pub exploration: ExplorationKind,

    /// Default: 0.2
    pub epsilon_start: f64,

    /// Default: 0.01
    pub epsilon_min: f64,

    /// Multiplicative decay per episode
    /// Default: 0.995
    pub epsilon_decay: f64,

    /// Boltzmann temperature schedule, used when exploration = boltzmann
    /// Defaults: 1.0 / 0.1 / 0.995
    pub temperature_start: f64,
    pub temperature_min: f64,
    pub temperature_decay: f64,

    /// Decouple action selection (online net) from evaluation (target net)
    /// in the bootstrap. Default: false
    pub double_dqn: bool,

    /// Prioritized replay exponent alpha
    /// Default: 0.6
    pub per_alpha: f64,

    /// Initial importance-sampling exponent beta, annealed toward 1
    /// Default: 0.4
    pub per_beta: f64,
}

impl Default for RlConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            target_update_frequency: 100,
            replay_type: ReplayKind::Uniform,
            replay_capacity: 50_000,
            min_replay_size: None,
            exploration: ExplorationKind::EpsilonGreedy,
            epsilon_start: 0.2,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            temperature_start: 1.0,
            temperature_min: 0.1,
            temperature_decay: 0.995,
            double_dqn: false,
            per_alpha: 0.6,
            per_beta: 0.4,
        }
    }
}

/// Cycle loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Self-play games collected per cycle
    /// Default: 20
    pub games_per_cycle: usize,

    /// Default: 200
    pub max_cycles: u64,

    /// Worker parallelism for the collect phase
    /// Default: 4
    pub max_concurrent_games: usize,

    /// Ply cap per self-play game
    /// Default: 120
    pub max_steps_per_game: u32,

    /// Learner updates per cycle
    /// Default: 16
    pub batches_per_cycle: usize,

    /// Copy learner weights into the self-play opponent every N cycles
    /// Default: 5
    pub opponent_update_frequency: u64,

    /// Default: 50
    pub evaluation_games: usize,

    /// Evaluate every N cycles
    /// Default: 5
    pub evaluation_frequency_cycles: u64,

    /// Checkpoint every N cycles
    /// Default: 10
    pub checkpoint_frequency_cycles: u64,

    /// Early stop after this many cycles without improvement
    /// Default: 20
    pub patience: u64,

    /// Minimum best-metric increase that counts as improvement
    /// Default: 0.005
    pub min_delta: f64,

    /// Wall-clock budget per self-play game before the worker reports a
    /// timeout. Default: 30_000
    pub worker_game_timeout_ms: u64,

    /// Timed-out or crashed games retried per cycle before the cycle is
    /// degraded to a reduced game count. Default: 3
    pub worker_retry_budget: usize,

    /// Search depth of the minimax evaluation baseline
    /// Default: 2
    pub minimax_depth: u32,

    /// Default: "default"
    pub run_name: String,

    /// Default: "checkpoints"
    pub checkpoint_dir: String,

    /// Default: safetensors
    pub checkpoint_backend: CheckpointBackend,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            games_per_cycle: 20,
            max_cycles: 200,
            max_concurrent_games: 4,
            max_steps_per_game: 120,
            batches_per_cycle: 16,
            opponent_update_frequency: 5,
            evaluation_games: 50,
            evaluation_frequency_cycles: 5,
            checkpoint_frequency_cycles: 10,
            patience: 20,
            min_delta: 0.005,
            worker_game_timeout_ms: 30_000,
            worker_retry_budget: 3,
            minimax_depth: 2,
            run_name: "default".to_string(),
            checkpoint_dir: "checkpoints".to_string(),
            checkpoint_backend: CheckpointBackend::Safetensors,
        }
    }
}

/// Complete, validated training configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub training: TrainingConfig,
    pub network: NetworkConfig,
    pub rl: RlConfig,
    pub rewards: RewardConfig,
}

impl Config {
    /// Small numbers everywhere; finishes in minutes on a laptop.
    pub fn fast_debug() -> Config {
        let mut config = Config::default();
        config.training.games_per_cycle = 4;
        config.training.max_cycles = 10;
        config.training.max_concurrent_games = 2;
        config.training.max_steps_per_game = 60;
        config.training.batches_per_cycle = 4;
        config.training.evaluation_games = 6;
        config.training.evaluation_frequency_cycles = 2;
        config.training.checkpoint_frequency_cycles = 2;
        config.training.run_name = "fast-debug".to_string();
        config.network.hidden_layers = vec![64, 32];
        config.network.batch_size = 16;
        config.rl.replay_capacity = 2_000;
        config.rl.target_update_frequency = 10;
        config
    }

    /// Overnight run: more games and slower exploration decay.
    pub fn long_train() -> Config {
        let mut config = Config::default();
        config.training.games_per_cycle = 50;
        config.training.max_cycles = 1_000;
        config.training.batches_per_cycle = 64;
        config.training.patience = 50;
        config.training.run_name = "long-train".to_string();
        config.rl.replay_capacity = 100_000;
        config.rl.epsilon_decay = 0.999;
        config
    }

    /// No training cycles; only baseline evaluation of loaded weights.
    pub fn eval_only() -> Config {
        let mut config = Config::default();
        config.training.max_cycles = 0;
        config.training.run_name = "eval-only".to_string();
        config
    }

    /// Effective minimum buffer fill before updates train.
    pub fn min_replay_size(&self) -> usize {
        self.rl.min_replay_size.unwrap_or(self.network.batch_size)
    }

    pub fn validate(&self) -> Result<()> {
        fn bad(msg: String) -> Result<()> {
            Err(ChessRlError::Config(msg))
        }

        if self.training.games_per_cycle == 0 {
            return bad("games_per_cycle must be >= 1".into());
        }
        if self.training.max_concurrent_games == 0 {
            return bad("max_concurrent_games must be >= 1".into());
        }
        if self.training.max_steps_per_game == 0 {
            return bad("max_steps_per_game must be >= 1".into());
        }
        if self.training.patience == 0 {
            return bad("patience must be >= 1".into());
        }
        if self.training.min_delta < 0.0 {
            return bad("min_delta must be >= 0".into());
        }
        if self.network.hidden_layers.is_empty() || self.network.hidden_layers.contains(&0) {
            return bad("hidden_layers must be non-empty with positive widths".into());
        }
        if self.network.learning_rate <= 0.0 {
            return bad(format!(
                "learning_rate must be > 0, got {}",
                self.network.learning_rate
            ));
        }
        if self.network.batch_size == 0 {
            return bad("batch_size must be >= 1".into());
        }
        if !(0.0..1.0).contains(&self.network.dropout) {
            return bad(format!("dropout must be in [0, 1), got {}", self.network.dropout));
        }
        if !(0.0..=1.0).contains(&self.rl.gamma) || self.rl.gamma == 0.0 {
            return bad(format!("gamma must be in (0, 1], got {}", self.rl.gamma));
        }
        if self.rl.target_update_frequency == 0 {
            return bad("target_update_frequency must be >= 1".into());
        }
        if self.rl.replay_capacity < self.network.batch_size {
            return bad(format!(
                "replay_capacity {} smaller than batch_size {}",
                self.rl.replay_capacity, self.network.batch_size
            ));
        }
        for (name, value) in [
            ("epsilon_start", self.rl.epsilon_start),
            ("epsilon_min", self.rl.epsilon_min),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return bad(format!("{} must be in [0, 1], got {}", name, value));
            }
        }
        if !(0.0..=1.0).contains(&self.rl.epsilon_decay) || self.rl.epsilon_decay == 0.0 {
            return bad(format!(
                "epsilon_decay must be in (0, 1], got {}",
                self.rl.epsilon_decay
            ));
        }
        if self.rl.temperature_start <= 0.0 || self.rl.temperature_min <= 0.0 {
            return bad("Boltzmann temperatures must be > 0".into());
        }
        if self.training.minimax_depth == 0 {
            return bad("minimax_depth must be >= 1".into());
        }
        self.rewards.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_profiles_are_valid() {
        assert!(Config::fast_debug().validate().is_ok());
        assert!(Config::long_train().validate().is_ok());
        assert!(Config::eval_only().validate().is_ok());
    }

    #[test]
    fn test_bad_gamma_rejected() {
        let mut config = Config::default();
        config.rl.gamma = 1.5;
        assert_matches!(config.validate(), Err(ChessRlError::Config(_)));
    }

    #[test]
    fn test_undersized_replay_rejected() {
        let mut config = Config::default();
        config.rl.replay_capacity = 8;
        assert_matches!(config.validate(), Err(ChessRlError::Config(_)));
    }

    #[test]
    fn test_min_replay_defaults_to_batch_size() {
        let config = Config::default();
        assert_eq!(config.min_replay_size(), config.network.batch_size);
    }
}
