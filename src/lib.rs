//! # Chess RL Training Core
//!
//! Self-play reinforcement learning for a chess agent.
//!
//! ## Features
//!
//! - **Engine Adapters**: pluggable chess rules backends (native + reference library)
//! - **State/Action Codec**: 839-feature position encoding and a dense 4096 action space with legality masking
//! - **DQN Learner**: online/target networks, masked bootstrap targets, experience replay
//! - **Self-Play Pipeline**: episode generation, batched updates, evaluation, checkpointing
//! - **Training Validator**: numerical health signals and issue classification
//! - **Teacher Distillation**: offline supervised dataset generation from a minimax teacher

// ============================================================================
// PUBLIC API MODULES
// ============================================================================

/// Chess rules adapters and shared board vocabulary
pub mod engine;

/// Position feature encoding and action-index codec
pub mod codec;

/// Experience replay buffers (uniform and prioritized)
pub mod replay;

/// Action-selection strategies over legal moves
pub mod exploration;

/// Trainable network abstraction and tch-backed Q-network
pub mod neural;

/// DQN and policy-gradient learners
pub mod learner;

/// Versioned checkpoint store
pub mod checkpoint;

/// Playing agents (random, heuristic, minimax, DQN)
pub mod agents;

/// Self-play episode driver
pub mod selfplay;

/// Baseline evaluation tournaments and statistics
pub mod evaluation;

/// Training health validation
pub mod validation;

/// Training cycle orchestration
pub mod pipeline;

/// Teacher distillation dataset collector
pub mod distill;

/// Validated training configuration
pub mod config;

/// Logger bootstrap
pub mod logging;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Main error type for the chess RL library
#[derive(Debug, thiserror::Error)]
pub enum ChessRlError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("learner error: {0}")]
    Learner(String),

    #[error("replay error: {0}")]
    Replay(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChessRlError {
    /// Stable taxonomy identifier surfaced in fatal error lines.
    pub fn kind_id(&self) -> &'static str {
        match self {
            ChessRlError::Config(_) => "CONFIGURATION_INVALID",
            ChessRlError::Engine(_) => "ENGINE_ERROR",
            ChessRlError::Codec(_) => "CODEC_ERROR",
            ChessRlError::Learner(_) => "LEARNER_ERROR",
            ChessRlError::Replay(_) => "REPLAY_ERROR",
            ChessRlError::Checkpoint(_) => "CHECKPOINT_ERROR",
            ChessRlError::Worker(_) => "WORKER_ERROR",
            ChessRlError::Io(_) => "IO_ERROR",
        }
    }

    /// Process exit code for the CLI contract: 1 config, 2 runtime.
    pub fn exit_code(&self) -> i32 {
        match self {
            ChessRlError::Config(_) => 1,
            _ => 2,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ChessRlError>;

// ============================================================================
// LIBRARY VERSION INFO
// ============================================================================

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
