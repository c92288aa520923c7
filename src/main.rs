//! chess-rl command-line interface.
//!
//! Subcommands:
//!   train            - run the self-play training pipeline
//!   evaluate         - play a loaded checkpoint against fixed baselines
//!   collect-teacher  - generate a minimax-distillation NDJSON dataset
//!   perft            - move-generator conformance counts
//!   diversity-report - action-diversity statistics for a checkpoint
//!
//! Exit codes: 0 success, 1 configuration error, 2 runtime error,
//! 3 cancelled.

use clap::{Parser, Subcommand, ValueEnum};

use chess_rl::checkpoint::{CheckpointBackend, CheckpointStore};
use chess_rl::config::{Config, OptimizerKind};
use chess_rl::distill::{collect_teacher_dataset, TeacherConfig};
use chess_rl::engine::library::LibraryEngine;
use chess_rl::engine::native::NativeEngine;
use chess_rl::engine::ChessEngine;
use chess_rl::evaluation::{diversity_report, evaluate_against, BaselineKind};
use chess_rl::exploration::ExplorationKind;
use chess_rl::neural::qnet::QNetwork;
use chess_rl::neural::TrainableNetwork;
use chess_rl::pipeline::TrainingPipeline;
use chess_rl::replay::ReplayKind;
use chess_rl::{ChessRlError, Result};

// ============================================================
// CLI
// ============================================================

#[derive(Parser)]
#[command(name = "chess-rl", about = "Self-play reinforcement learning for chess", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineChoice {
    Native,
    Library,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProfileChoice {
    Default,
    FastDebug,
    LongTrain,
    EvalOnly,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendChoice {
    Safetensors,
    Bincode,
    JsonZst,
}

#[derive(Clone, Copy, ValueEnum)]
enum OptimizerChoice {
    Adam,
    Rmsprop,
    Sgd,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReplayChoice {
    Uniform,
    Prioritized,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExplorationChoice {
    EpsilonGreedy,
    Boltzmann,
}

#[derive(Clone, Copy, ValueEnum)]
enum BaselineChoice {
    Random,
    Heuristic,
    Minimax,
    All,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the self-play training pipeline
    Train {
        #[arg(long, value_enum, default_value_t = ProfileChoice::Default)]
        profile: ProfileChoice,
        #[arg(long, value_enum, default_value_t = EngineChoice::Native)]
        engine: EngineChoice,
        #[arg(long)]
        run_name: Option<String>,
        #[arg(long)]
        checkpoint_dir: Option<String>,
        #[arg(long, value_enum)]
        checkpoint_backend: Option<BackendChoice>,
        #[arg(long)]
        games_per_cycle: Option<usize>,
        #[arg(long)]
        max_cycles: Option<u64>,
        #[arg(long)]
        max_concurrent_games: Option<usize>,
        #[arg(long)]
        max_steps_per_game: Option<u32>,
        #[arg(long)]
        batches_per_cycle: Option<usize>,
        #[arg(long)]
        opponent_update_frequency: Option<u64>,
        #[arg(long)]
        evaluation_games: Option<usize>,
        #[arg(long)]
        evaluation_frequency: Option<u64>,
        #[arg(long)]
        checkpoint_frequency: Option<u64>,
        #[arg(long)]
        patience: Option<u64>,
        #[arg(long)]
        min_delta: Option<f64>,
        #[arg(long)]
        minimax_depth: Option<u32>,
        #[arg(long, value_delimiter = ',')]
        hidden_layers: Option<Vec<usize>>,
        #[arg(long)]
        learning_rate: Option<f64>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long, value_enum)]
        optimizer: Option<OptimizerChoice>,
        #[arg(long)]
        l2: Option<f64>,
        #[arg(long)]
        dropout: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        gamma: Option<f64>,
        #[arg(long)]
        target_update_frequency: Option<u64>,
        #[arg(long, value_enum)]
        replay_type: Option<ReplayChoice>,
        #[arg(long)]
        replay_capacity: Option<usize>,
        #[arg(long, value_enum)]
        exploration: Option<ExplorationChoice>,
        #[arg(long)]
        epsilon_start: Option<f64>,
        #[arg(long)]
        epsilon_min: Option<f64>,
        #[arg(long)]
        epsilon_decay: Option<f64>,
        #[arg(long)]
        double_dqn: bool,
        #[arg(long, allow_negative_numbers = true)]
        win_reward: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        loss_reward: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        draw_reward: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        step_penalty: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        step_limit_penalty: Option<f64>,
        #[arg(long)]
        enable_early_adjudication: bool,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true, num_args = 0..)]
        extra: Vec<String>,
    },
    /// Evaluate a checkpoint against fixed baselines
    Evaluate {
        #[arg(long)]
        checkpoint: String,
        #[arg(long, value_enum, default_value_t = EngineChoice::Native)]
        engine: EngineChoice,
        #[arg(long, value_enum, default_value_t = BaselineChoice::All)]
        baseline: BaselineChoice,
        #[arg(long, default_value_t = 50)]
        games: usize,
        #[arg(long, default_value_t = 2)]
        minimax_depth: u32,
        #[arg(long, default_value_t = 120)]
        max_steps_per_game: u32,
        #[arg(long, value_delimiter = ',')]
        hidden_layers: Option<Vec<usize>>,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true, num_args = 0..)]
        extra: Vec<String>,
    },
    /// Generate a supervised teacher dataset via minimax distillation
    CollectTeacher {
        #[arg(long, default_value = "teacher.ndjson")]
        output: String,
        #[arg(long, value_enum, default_value_t = EngineChoice::Native)]
        engine: EngineChoice,
        #[arg(long, default_value_t = 100)]
        games: usize,
        #[arg(long, default_value_t = 2)]
        depth: u32,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
        #[arg(long, default_value_t = 1.0)]
        temperature: f64,
        #[arg(long, default_value_t = 3)]
        max_repeats_per_position: u32,
        #[arg(long, default_value_t = 200)]
        max_plies: u32,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true, num_args = 0..)]
        extra: Vec<String>,
    },
    /// Count move-generator nodes at fixed depth
    Perft {
        #[arg(long, default_value = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1")]
        fen: String,
        #[arg(long, default_value_t = 3)]
        depth: u32,
        #[arg(long, value_enum, default_value_t = EngineChoice::Native)]
        engine: EngineChoice,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true, num_args = 0..)]
        extra: Vec<String>,
    },
    /// Report action diversity of a checkpoint's greedy policy
    DiversityReport {
        #[arg(long)]
        checkpoint: String,
        #[arg(long, value_enum, default_value_t = EngineChoice::Native)]
        engine: EngineChoice,
        #[arg(long, default_value_t = 20)]
        games: usize,
        #[arg(long, default_value_t = 120)]
        max_steps_per_game: u32,
        #[arg(long, value_delimiter = ',')]
        hidden_layers: Option<Vec<usize>>,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true, num_args = 0..)]
        extra: Vec<String>,
    },
}

// ============================================================
// Entry point
// ============================================================

fn main() {
    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {}", e.kind_id(), e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn warn_extra(extra: &[String]) {
    if !extra.is_empty() {
        log::warn!("ignoring unknown arguments: {}", extra.join(" "));
        eprintln!("warning: ignoring unknown arguments: {}", extra.join(" "));
    }
}

fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Train { .. } => run_train(cli.command),
        Commands::Evaluate {
            checkpoint,
            engine,
            baseline,
            games,
            minimax_depth,
            max_steps_per_game,
            hidden_layers,
            seed,
            extra,
        } => {
            chess_rl::logging::setup_logging("logs")?;
            warn_extra(&extra);
            let network = load_network(&checkpoint, hidden_layers, seed)?;
            let baselines: Vec<BaselineKind> = match baseline {
                BaselineChoice::Random => vec![BaselineKind::Random],
                BaselineChoice::Heuristic => vec![BaselineKind::Heuristic],
                BaselineChoice::Minimax => vec![BaselineKind::Minimax],
                BaselineChoice::All => vec![
                    BaselineKind::Random,
                    BaselineKind::Heuristic,
                    BaselineKind::Minimax,
                ],
            };
            match engine {
                EngineChoice::Native => run_evaluate(
                    &NativeEngine::new(),
                    &network,
                    &baselines,
                    games,
                    minimax_depth,
                    max_steps_per_game,
                    seed,
                ),
                EngineChoice::Library => run_evaluate(
                    &LibraryEngine::new(),
                    &network,
                    &baselines,
                    games,
                    minimax_depth,
                    max_steps_per_game,
                    seed,
                ),
            }
        }
        Commands::CollectTeacher {
            output,
            engine,
            games,
            depth,
            top_k,
            temperature,
            max_repeats_per_position,
            max_plies,
            seed,
            extra,
        } => {
            chess_rl::logging::setup_logging("logs")?;
            warn_extra(&extra);
            let config = TeacherConfig {
                games,
                depth,
                top_k,
                temperature,
                max_repeats_per_position,
                max_plies,
                seed,
            };
            let stats = match engine {
                EngineChoice::Native => {
                    collect_teacher_dataset(&NativeEngine::new(), &config, &output)?
                }
                EngineChoice::Library => {
                    collect_teacher_dataset(&LibraryEngine::new(), &config, &output)?
                }
            };
            println!(
                "collected {} records from {} games ({} repeats skipped) -> {}",
                stats.records, stats.games, stats.skipped_repeats, output
            );
            Ok(0)
        }
        Commands::Perft {
            fen,
            depth,
            engine,
            extra,
        } => {
            warn_extra(&extra);
            match engine {
                EngineChoice::Native => run_perft(&NativeEngine::new(), &fen, depth),
                EngineChoice::Library => run_perft(&LibraryEngine::new(), &fen, depth),
            }
        }
        Commands::DiversityReport {
            checkpoint,
            engine,
            games,
            max_steps_per_game,
            hidden_layers,
            seed,
            extra,
        } => {
            chess_rl::logging::setup_logging("logs")?;
            warn_extra(&extra);
            let network = load_network(&checkpoint, hidden_layers, seed)?;
            let report = match engine {
                EngineChoice::Native => diversity_report(
                    &NativeEngine::new(),
                    &network,
                    games,
                    max_steps_per_game,
                    seed,
                )?,
                EngineChoice::Library => diversity_report(
                    &LibraryEngine::new(),
                    &network,
                    games,
                    max_steps_per_game,
                    seed,
                )?,
            };
            println!(
                "{} games, avg length {:.1} plies, {} unique actions, {} unique openings",
                report.games, report.avg_game_length, report.unique_actions, report.unique_openings
            );
            for (mv, count) in report.opening_moves.iter().take(10) {
                println!("  {:<6} x{}", mv, count);
            }
            Ok(0)
        }
    }
}

// ============================================================
// Train
// ============================================================

#[allow(clippy::too_many_lines)]
fn run_train(command: Commands) -> Result<i32> {
    let Commands::Train {
        profile,
        engine,
        run_name,
        checkpoint_dir,
        checkpoint_backend,
        games_per_cycle,
        max_cycles,
        max_concurrent_games,
        max_steps_per_game,
        batches_per_cycle,
        opponent_update_frequency,
        evaluation_games,
        evaluation_frequency,
        checkpoint_frequency,
        patience,
        min_delta,
        minimax_depth,
        hidden_layers,
        learning_rate,
        batch_size,
        optimizer,
        l2,
        dropout,
        seed,
        gamma,
        target_update_frequency,
        replay_type,
        replay_capacity,
        exploration,
        epsilon_start,
        epsilon_min,
        epsilon_decay,
        double_dqn,
        win_reward,
        loss_reward,
        draw_reward,
        step_penalty,
        step_limit_penalty,
        enable_early_adjudication,
        extra,
    } = command
    else {
        return Err(ChessRlError::Config("not a train invocation".to_string()));
    };

    let mut config = match profile {
        ProfileChoice::Default => Config::default(),
        ProfileChoice::FastDebug => Config::fast_debug(),
        ProfileChoice::LongTrain => Config::long_train(),
        ProfileChoice::EvalOnly => Config::eval_only(),
    };

    macro_rules! apply {
        ($target:expr, $value:expr) => {
            if let Some(value) = $value {
                $target = value;
            }
        };
    }

    apply!(config.training.run_name, run_name);
    apply!(config.training.checkpoint_dir, checkpoint_dir);
    apply!(
        config.training.checkpoint_backend,
        checkpoint_backend.map(|b| match b {
            BackendChoice::Safetensors => CheckpointBackend::Safetensors,
            BackendChoice::Bincode => CheckpointBackend::Bincode,
            BackendChoice::JsonZst => CheckpointBackend::JsonZst,
        })
    );
    apply!(config.training.games_per_cycle, games_per_cycle);
    apply!(config.training.max_cycles, max_cycles);
    apply!(config.training.max_concurrent_games, max_concurrent_games);
    apply!(config.training.max_steps_per_game, max_steps_per_game);
    apply!(config.training.batches_per_cycle, batches_per_cycle);
    apply!(
        config.training.opponent_update_frequency,
        opponent_update_frequency
    );
    apply!(config.training.evaluation_games, evaluation_games);
    apply!(
        config.training.evaluation_frequency_cycles,
        evaluation_frequency
    );
    apply!(
        config.training.checkpoint_frequency_cycles,
        checkpoint_frequency
    );
    apply!(config.training.patience, patience);
    apply!(config.training.min_delta, min_delta);
    apply!(config.training.minimax_depth, minimax_depth);
    apply!(config.network.hidden_layers, hidden_layers);
    apply!(config.network.learning_rate, learning_rate);
    apply!(config.network.batch_size, batch_size);
    apply!(
        config.network.optimizer,
        optimizer.map(|o| match o {
            OptimizerChoice::Adam => OptimizerKind::Adam,
            OptimizerChoice::Rmsprop => OptimizerKind::Rmsprop,
            OptimizerChoice::Sgd => OptimizerKind::Sgd,
        })
    );
    apply!(config.network.l2, l2);
    apply!(config.network.dropout, dropout);
    apply!(config.network.seed, seed);
    apply!(config.rl.gamma, gamma);
    apply!(config.rl.target_update_frequency, target_update_frequency);
    apply!(
        config.rl.replay_type,
        replay_type.map(|r| match r {
            ReplayChoice::Uniform => ReplayKind::Uniform,
            ReplayChoice::Prioritized => ReplayKind::Prioritized,
        })
    );
    apply!(config.rl.replay_capacity, replay_capacity);
    apply!(
        config.rl.exploration,
        exploration.map(|e| match e {
            ExplorationChoice::EpsilonGreedy => ExplorationKind::EpsilonGreedy,
            ExplorationChoice::Boltzmann => ExplorationKind::Boltzmann,
        })
    );
    apply!(config.rl.epsilon_start, epsilon_start);
    apply!(config.rl.epsilon_min, epsilon_min);
    apply!(config.rl.epsilon_decay, epsilon_decay);
    if double_dqn {
        config.rl.double_dqn = true;
    }
    apply!(config.rewards.win_reward, win_reward);
    apply!(config.rewards.loss_reward, loss_reward);
    apply!(config.rewards.draw_reward, draw_reward);
    apply!(config.rewards.step_penalty, step_penalty);
    apply!(config.rewards.step_limit_penalty, step_limit_penalty);
    if enable_early_adjudication {
        config.rewards.enable_early_adjudication = true;
    }

    config.validate()?;
    let log_dir = format!(
        "{}/{}/logs",
        config.training.checkpoint_dir, config.training.run_name
    );
    std::fs::create_dir_all(&log_dir)?;
    chess_rl::logging::setup_logging(&log_dir)?;
    warn_extra(&extra);

    log::info!(
        "chess-rl {} starting run '{}' ({} cycles, {} games/cycle, seed {})",
        chess_rl::VERSION,
        config.training.run_name,
        config.training.max_cycles,
        config.training.games_per_cycle,
        config.network.seed
    );

    let summary = match engine {
        EngineChoice::Native => TrainingPipeline::new(NativeEngine::new(), config)?.run()?,
        EngineChoice::Library => TrainingPipeline::new(LibraryEngine::new(), config)?.run()?,
    };

    println!(
        "training finished: {} cycles, best metric {}",
        summary.cycles_completed,
        summary
            .best_metric
            .map(|m| format!("{:.3}", m))
            .unwrap_or_else(|| "n/a".to_string())
    );
    if summary.cancelled {
        println!("run cancelled");
        return Ok(3);
    }
    if summary.stopped_early {
        println!("stopped early (patience exhausted)");
    }
    Ok(0)
}

// ============================================================
// Helpers
// ============================================================

fn load_network(
    checkpoint: &str,
    hidden_layers: Option<Vec<usize>>,
    seed: u64,
) -> Result<QNetwork> {
    let (weights, metadata) = CheckpointStore::load(checkpoint, None)?;
    log::info!(
        "loaded checkpoint '{}' (cycle {}, performance {:.3})",
        metadata.checkpoint_id,
        metadata.cycle,
        metadata.performance
    );
    let mut network_config = chess_rl::config::NetworkConfig {
        seed,
        ..Default::default()
    };
    if let Some(layers) = hidden_layers {
        network_config.hidden_layers = layers;
    }
    let mut network = QNetwork::new(&network_config)?;
    network.import_weights(&weights)?;
    Ok(network)
}

fn run_evaluate<E: ChessEngine>(
    engine: &E,
    network: &QNetwork,
    baselines: &[BaselineKind],
    games: usize,
    minimax_depth: u32,
    max_steps_per_game: u32,
    seed: u64,
) -> Result<i32> {
    for &baseline in baselines {
        let report = evaluate_against(
            engine,
            network,
            baseline,
            games,
            minimax_depth,
            max_steps_per_game,
            seed,
        )?;
        println!(
            "vs {:<9} {:>3}W {:>3}D {:>3}L  win rate {:.3}  95% CI [{:.3}, {:.3}]  p={:.4}{}  effect {} ({:.2})",
            report.opponent,
            report.wins,
            report.draws,
            report.losses,
            report.win_rate,
            report.wilson_low,
            report.wilson_high,
            report.p_value,
            if report.significant { "*" } else { "" },
            report.effect_label,
            report.effect_size,
        );
        println!(
            "   as white: {}/{}  as black: {}/{}  avg length {:.1} plies",
            report.wins_as_white,
            report.games_as_white,
            report.wins_as_black,
            report.games_as_black,
            report.avg_game_length
        );
    }
    Ok(0)
}

fn run_perft<E: ChessEngine>(engine: &E, fen: &str, depth: u32) -> Result<i32> {
    let state = engine.from_fen(fen)?;
    for d in 1..=depth {
        let start = std::time::Instant::now();
        let nodes = engine.perft(&state, d);
        println!(
            "perft({}) = {:>12}  ({:.2}s)",
            d,
            nodes,
            start.elapsed().as_secs_f64()
        );
    }
    Ok(0)
}
