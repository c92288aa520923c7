//! Training cycle orchestration.
//!
//! One owner context drives COLLECT -> TRAIN -> EVALUATE? -> CHECKPOINT?
//! per cycle. Self-play games run on a bounded rayon pool, each worker
//! holding a read-only weight snapshot; the owner merges transitions in
//! game order so a fixed seed reproduces a run. Learner updates, buffer
//! mutation, target syncs and checkpoint writes never leave the owner.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::agents::DqnAgent;
use crate::checkpoint::{CheckpointMetadata, CheckpointStore};
use crate::config::Config;
use crate::engine::{ChessEngine, Outcome};
use crate::evaluation::{evaluate_against, BaselineKind, BaselineReport};
use crate::exploration::{ExplorationKind, ExplorationPolicy};
use crate::learner::dqn::{DqnLearner, DqnParams};
use crate::learner::UpdateResult;
use crate::neural::qnet::QNetwork;
use crate::neural::{TrainableNetwork, WeightMap};
use crate::replay::{ReplayBuffer, ReplayKind, Transition};
use crate::selfplay::{GameTermination, SelfPlayDriver};
use crate::validation::{CycleMetrics, TrainingValidator};
use crate::{ChessRlError, Result};

/// Minimum distinct actions per window before the validator flags
/// LOW_MOVE_DIVERSITY.
const MIN_UNIQUE_ACTIONS: usize = 30;

/// Cooperative cancellation flag, checked between cycle phases only so an
/// in-flight batched update always runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Explicit context threaded through the pipeline instead of globals:
/// the root seed and per-cycle error tallies.
#[derive(Debug, Default)]
pub struct TrainingContext {
    pub root_seed: u64,
    error_counts: std::collections::HashMap<&'static str, u32>,
}

impl TrainingContext {
    fn record_error(&mut self, kind: &'static str) {
        *self.error_counts.entry(kind).or_insert(0) += 1;
    }

    fn reset_cycle(&mut self) {
        self.error_counts.clear();
    }

    pub fn error_count(&self, kind: &str) -> u32 {
        self.error_counts.get(kind).copied().unwrap_or(0)
    }
}

/// Per-cycle record appended to `log.ndjson` and shown in the status line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle: u64,
    pub games: usize,
    pub white_wins: usize,
    pub black_wins: usize,
    pub draws: usize,
    pub step_limit_games: usize,
    pub skipped_games: usize,
    pub avg_plies: f64,
    pub avg_reward: f64,
    pub updates: usize,
    pub avg_loss: f64,
    pub avg_gradient_norm: f64,
    pub avg_entropy: f64,
    pub avg_q: f64,
    pub buffer_size: usize,
    pub exploration_rate: f64,
    pub duration_secs: f64,
    pub metric: f64,
    pub evaluation: Option<Vec<BaselineReport>>,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub cycles_completed: u64,
    pub best_metric: Option<f64>,
    pub cancelled: bool,
    pub stopped_early: bool,
}

struct CollectStats {
    transitions: Vec<Transition>,
    games: usize,
    white_wins: usize,
    black_wins: usize,
    draws: usize,
    step_limit_games: usize,
    skipped_games: usize,
    total_plies: u64,
    reward_sum: f64,
    reward_count: usize,
    unique_actions: HashSet<usize>,
}

pub struct TrainingPipeline<E>
where
    E: ChessEngine + Sync,
{
    engine: E,
    config: Config,
    learner: DqnLearner<QNetwork>,
    store: CheckpointStore,
    validator: TrainingValidator,
    exploration: ExplorationPolicy,
    opponent_weights: WeightMap,
    context: TrainingContext,
    cancel: CancelToken,
    run_dir: PathBuf,
    best_metric: Option<f64>,
    cycles_without_improvement: u64,
}

impl<E> TrainingPipeline<E>
where
    E: ChessEngine + Sync,
{
    pub fn new(engine: E, config: Config) -> Result<TrainingPipeline<E>> {
        config.validate()?;

        let online = QNetwork::new(&config.network)?;
        let target = QNetwork::new(&config.network)?;
        let buffer = match config.rl.replay_type {
            ReplayKind::Uniform => ReplayBuffer::uniform(config.rl.replay_capacity),
            ReplayKind::Prioritized => ReplayBuffer::prioritized(
                config.rl.replay_capacity,
                config.rl.per_alpha,
                config.rl.per_beta,
            ),
        };
        let params = DqnParams {
            gamma: config.rl.gamma,
            batch_size: config.network.batch_size,
            target_sync_frequency: config.rl.target_update_frequency,
            min_replay_size: config.min_replay_size(),
            double_dqn: config.rl.double_dqn,
        };
        let learner = DqnLearner::new(online, target, buffer, params, config.network.seed)?;

        let run_dir = PathBuf::from(&config.training.checkpoint_dir)
            .join(&config.training.run_name);
        let store = CheckpointStore::open(&run_dir, config.training.checkpoint_backend)?;

        let exploration = match config.rl.exploration {
            ExplorationKind::EpsilonGreedy => ExplorationPolicy::epsilon_greedy(
                config.rl.epsilon_start,
                config.rl.epsilon_min,
                config.rl.epsilon_decay,
            ),
            ExplorationKind::Boltzmann => ExplorationPolicy::boltzmann(
                config.rl.temperature_start,
                config.rl.temperature_min,
                config.rl.temperature_decay,
            ),
        };

        let opponent_weights = learner.online().export_weights();
        let context = TrainingContext {
            root_seed: config.network.seed,
            ..Default::default()
        };

        Ok(TrainingPipeline {
            engine,
            config,
            learner,
            store,
            validator: TrainingValidator::new(MIN_UNIQUE_ACTIONS),
            exploration,
            opponent_weights,
            context,
            cancel: CancelToken::new(),
            run_dir,
            best_metric: None,
            cycles_without_improvement: 0,
        })
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn learner(&self) -> &DqnLearner<QNetwork> {
        &self.learner
    }

    pub fn run(&mut self) -> Result<TrainingSummary> {
        let max_cycles = self.config.training.max_cycles;
        let mut cycles_completed = 0;
        let mut cancelled = false;
        let mut stopped_early = false;

        for cycle in 1..=max_cycles {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            self.context.reset_cycle();
            let started = Instant::now();

            // COLLECT
            let mut collected = self.collect_phase(cycle)?;
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            // TRAIN
            let fresh = std::mem::take(&mut collected.transitions);
            let train = match self.train_phase(fresh) {
                Ok(train) => train,
                Err(e) => {
                    // Keep whatever progress exists, then surface the error.
                    self.emergency_checkpoint(cycle);
                    return Err(e);
                }
            };
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            // Opponent refresh
            if self.config.training.opponent_update_frequency > 0
                && cycle % self.config.training.opponent_update_frequency == 0
            {
                self.opponent_weights = self.learner.online().export_weights();
                log::debug!("opponent weights refreshed at cycle {}", cycle);
            }

            // EVALUATE
            let evaluation = if self.config.training.evaluation_frequency_cycles > 0
                && cycle % self.config.training.evaluation_frequency_cycles == 0
            {
                Some(self.evaluate_phase(cycle)?)
            } else {
                None
            };
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let avg_reward = if collected.reward_count > 0 {
                collected.reward_sum / collected.reward_count as f64
            } else {
                0.0
            };
            // Primary metric: evaluation win rate when fresh, cycle reward
            // otherwise.
            let metric = evaluation
                .as_ref()
                .map(|reports| {
                    reports.iter().map(|r| r.win_rate).sum::<f64>() / reports.len().max(1) as f64
                })
                .unwrap_or(avg_reward);

            let improved = self
                .best_metric
                .map(|best| metric >= best + self.config.training.min_delta)
                .unwrap_or(true);
            let is_best = self.best_metric.map(|best| metric > best).unwrap_or(true);
            if is_best {
                self.best_metric = Some(metric);
            }
            if improved {
                self.cycles_without_improvement = 0;
            } else {
                self.cycles_without_improvement += 1;
            }

            // CHECKPOINT
            if self.config.training.checkpoint_frequency_cycles > 0
                && cycle % self.config.training.checkpoint_frequency_cycles == 0
            {
                self.checkpoint_phase(cycle, metric, is_best);
            }

            // Cycle record, validation and status line
            let record = self.emit_cycle_record(
                cycle,
                &collected,
                &train,
                avg_reward,
                metric,
                evaluation,
                started.elapsed(),
            );
            cycles_completed = cycle;

            log::info!(
                "cycle {:>4}: {} games ({}W/{}B/{}D), {} updates, loss {:.4}, metric {:.3}, buffer {}, {:.1}s{}",
                cycle,
                record.games,
                record.white_wins,
                record.black_wins,
                record.draws,
                record.updates,
                record.avg_loss,
                record.metric,
                record.buffer_size,
                record.duration_secs,
                if record.issues.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", record.issues.join(", "))
                }
            );

            if self.cycles_without_improvement >= self.config.training.patience {
                log::info!(
                    "early stop: no improvement >= {} for {} cycles",
                    self.config.training.min_delta,
                    self.cycles_without_improvement
                );
                stopped_early = true;
                break;
            }
        }

        Ok(TrainingSummary {
            cycles_completed,
            best_metric: self.best_metric,
            cancelled,
            stopped_early,
        })
    }

    /// Run the self-play games for one cycle on the worker pool and merge
    /// results in game order.
    fn collect_phase(&mut self, cycle: u64) -> Result<CollectStats> {
        let games = self.config.training.games_per_cycle;
        let online_weights = self.learner.online().export_weights();
        let opponent_weights = self.opponent_weights.clone();
        let budget = Duration::from_millis(self.config.training.worker_game_timeout_ms);
        let exploration_rate = self.exploration.current_rate();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.training.max_concurrent_games)
            .build()
            .map_err(|e| ChessRlError::Worker(format!("worker pool construction failed: {}", e)))?;

        let engine = &self.engine;
        let config = &self.config;
        let play = |game_index: usize, attempt: usize| {
            let seed = worker_seed(config.network.seed, cycle, game_index, attempt);
            play_self_play_game(
                engine,
                config,
                &online_weights,
                &opponent_weights,
                exploration_rate,
                seed,
                game_index,
                budget,
            )
        };

        let mut results: Vec<Result<crate::selfplay::GameResult>> = pool.install(|| {
            (0..games)
                .into_par_iter()
                .map(|game_index| play(game_index, 0))
                .collect()
        });

        // Retry failed games serially within the cycle's retry budget.
        let mut retries_left = self.config.training.worker_retry_budget;
        for game_index in 0..games {
            while results[game_index].is_err() && retries_left > 0 {
                let attempt = 1 + self.config.training.worker_retry_budget - retries_left;
                log::warn!(
                    "retrying game {} of cycle {} ({}): {}",
                    game_index,
                    cycle,
                    attempt,
                    results[game_index].as_ref().err().map(|e| e.to_string()).unwrap_or_default()
                );
                retries_left -= 1;
                results[game_index] = play(game_index, attempt);
            }
        }

        let mut stats = CollectStats {
            transitions: Vec::new(),
            games: 0,
            white_wins: 0,
            black_wins: 0,
            draws: 0,
            step_limit_games: 0,
            skipped_games: 0,
            total_plies: 0,
            reward_sum: 0.0,
            reward_count: 0,
            unique_actions: HashSet::new(),
        };

        for result in results {
            match result {
                Ok(game) => {
                    stats.games += 1;
                    stats.total_plies += game.plies as u64;
                    match game.outcome() {
                        Outcome::WhiteWins => stats.white_wins += 1,
                        Outcome::BlackWins => stats.black_wins += 1,
                        _ => stats.draws += 1,
                    }
                    if game.termination == GameTermination::StepLimit {
                        stats.step_limit_games += 1;
                    }
                    for transition in &game.transitions {
                        stats.reward_sum += transition.reward;
                        stats.reward_count += 1;
                        stats.unique_actions.insert(transition.action);
                    }
                    stats.transitions.extend(game.transitions);
                }
                Err(e) => {
                    // The retry budget is spent: degrade the cycle.
                    stats.skipped_games += 1;
                    self.context.record_error("WORKER_ERROR");
                    log::warn!(
                        "ValidationWarning: cycle {} degraded to {} games: {}",
                        cycle,
                        self.config.training.games_per_cycle - stats.skipped_games,
                        e
                    );
                }
            }
        }

        // The owner decays exploration once per completed episode.
        for _ in 0..stats.games {
            self.exploration.update();
        }

        Ok(stats)
    }

    fn train_phase(&mut self, transitions: Vec<Transition>) -> Result<Vec<UpdateResult>> {
        self.learner.push(transitions)?;
        let mut updates = Vec::with_capacity(self.config.training.batches_per_cycle);
        for _ in 0..self.config.training.batches_per_cycle {
            let result = self.learner.train_step()?;
            if result.is_quiescent() {
                break;
            }
            updates.push(result);
        }
        Ok(updates)
    }

    fn evaluate_phase(&mut self, cycle: u64) -> Result<Vec<BaselineReport>> {
        let games = self.config.training.evaluation_games;
        let seed = self
            .config
            .network
            .seed
            .wrapping_add(0x5EED_0000)
            .wrapping_add(cycle * 10_007);
        let mut reports = Vec::new();
        for baseline in [BaselineKind::Heuristic, BaselineKind::Minimax] {
            let report = evaluate_against(
                &self.engine,
                self.learner.online(),
                baseline,
                games,
                self.config.training.minimax_depth,
                self.config.training.max_steps_per_game,
                seed,
            )?;
            log::info!(
                "eval vs {}: {}/{}/{} (win rate {:.3}, 95% CI [{:.3}, {:.3}], p={:.4}{}, effect {})",
                report.opponent,
                report.wins,
                report.draws,
                report.losses,
                report.win_rate,
                report.wilson_low,
                report.wilson_high,
                report.p_value,
                if report.significant { ", significant" } else { "" },
                report.effect_label,
            );
            reports.push(report);
        }
        Ok(reports)
    }

    fn checkpoint_phase(&mut self, cycle: u64, metric: f64, is_best: bool) {
        let name = format!("cycle-{:06}", cycle);
        let metadata = CheckpointMetadata::new(
            name.clone(),
            cycle,
            metric,
            is_best,
            format!("cycle {} checkpoint", cycle),
            self.store.backend(),
        );
        let weights = self.learner.online().export_weights();
        // A failed save (already retried once inside the store) downgrades
        // to a warning; the best pointer is not advanced.
        if let Err(e) = self.store.save(&name, &weights, &metadata) {
            self.context.record_error("CHECKPOINT_ERROR");
            log::warn!("checkpoint save failed for cycle {}: {}", cycle, e);
        }
    }

    fn emergency_checkpoint(&mut self, cycle: u64) {
        let name = format!("cycle-{:06}-aborted", cycle);
        let metadata = CheckpointMetadata::new(
            name.clone(),
            cycle,
            self.best_metric.unwrap_or(0.0),
            false,
            "emergency checkpoint before abort",
            self.store.backend(),
        );
        let weights = self.learner.online().export_weights();
        if let Err(e) = self.store.save(&name, &weights, &metadata) {
            log::error!("emergency checkpoint failed: {}", e);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_cycle_record(
        &mut self,
        cycle: u64,
        collected: &CollectStats,
        train: &[UpdateResult],
        avg_reward: f64,
        metric: f64,
        evaluation: Option<Vec<BaselineReport>>,
        elapsed: Duration,
    ) -> CycleRecord {
        let updates = train.len();
        let mean = |f: fn(&UpdateResult) -> f64| {
            if updates > 0 {
                train.iter().map(f).sum::<f64>() / updates as f64
            } else {
                0.0
            }
        };
        let avg_plies = if collected.games > 0 {
            collected.total_plies as f64 / collected.games as f64
        } else {
            0.0
        };

        let metrics = CycleMetrics {
            cycle,
            loss: mean(|u| u.loss),
            gradient_norm: mean(|u| u.gradient_norm),
            policy_entropy: mean(|u| u.policy_entropy),
            avg_q: mean(|u| u.q_mean),
            avg_game_length: avg_plies,
            avg_reward,
            draw_rate: if collected.games > 0 {
                collected.draws as f64 / collected.games as f64
            } else {
                0.0
            },
            step_limit_rate: if collected.games > 0 {
                collected.step_limit_games as f64 / collected.games as f64
            } else {
                0.0
            },
            unique_actions: collected.unique_actions.len(),
            exploration_rate: self.exploration.current_rate(),
        };
        let issues = self.validator.observe(&metrics);
        for issue in &issues {
            log::warn!(
                "training issue {:?} ({}): {}",
                issue.severity,
                issue.issue.identifier(),
                issue.message
            );
        }

        let record = CycleRecord {
            cycle,
            games: collected.games,
            white_wins: collected.white_wins,
            black_wins: collected.black_wins,
            draws: collected.draws,
            step_limit_games: collected.step_limit_games,
            skipped_games: collected.skipped_games,
            avg_plies,
            avg_reward,
            updates,
            avg_loss: metrics.loss,
            avg_gradient_norm: metrics.gradient_norm,
            avg_entropy: metrics.policy_entropy,
            avg_q: metrics.avg_q,
            buffer_size: self.learner.buffer().size(),
            exploration_rate: metrics.exploration_rate,
            duration_secs: elapsed.as_secs_f64(),
            metric,
            evaluation,
            issues: issues
                .iter()
                .map(|i| i.issue.identifier().to_string())
                .collect(),
        };
        self.append_run_log(&record);
        record
    }

    fn append_run_log(&self, record: &CycleRecord) {
        let path = self.run_dir.join("log.ndjson");
        let appended = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| {
                let line = serde_json::to_string(record).unwrap_or_default();
                writeln!(file, "{}", line)
            });
        if let Err(e) = appended {
            log::warn!("could not append cycle record to '{}': {}", path.display(), e);
        }
    }
}

/// Child seed for a (cycle, game, attempt) triple, decorrelated from the
/// root seed with fixed odd multipliers.
fn worker_seed(root: u64, cycle: u64, game_index: usize, attempt: usize) -> u64 {
    root.wrapping_add(cycle.wrapping_mul(0x9E37_79B9))
        .wrapping_add((game_index as u64).wrapping_mul(0x85EB_CA6B))
        .wrapping_add((attempt as u64).wrapping_mul(0xC2B2_AE35))
}

/// One worker job: rebuild both nets from snapshots and play a single
/// game. The learner alternates colors against the opponent snapshot.
#[allow(clippy::too_many_arguments)]
fn play_self_play_game<E: ChessEngine>(
    engine: &E,
    config: &Config,
    online_weights: &WeightMap,
    opponent_weights: &WeightMap,
    exploration_rate: f64,
    seed: u64,
    game_index: usize,
    budget: Duration,
) -> Result<crate::selfplay::GameResult> {
    let mut online_net = QNetwork::new(&config.network)?;
    online_net.import_weights(online_weights)?;
    let mut opponent_net = QNetwork::new(&config.network)?;
    opponent_net.import_weights(opponent_weights)?;

    let policy = match config.rl.exploration {
        ExplorationKind::EpsilonGreedy => ExplorationPolicy::epsilon_greedy(
            exploration_rate,
            config.rl.epsilon_min,
            config.rl.epsilon_decay,
        ),
        ExplorationKind::Boltzmann => ExplorationPolicy::boltzmann(
            exploration_rate,
            config.rl.temperature_min,
            config.rl.temperature_decay,
        ),
    };

    let driver = SelfPlayDriver::new(
        engine,
        config.rewards.clone(),
        config.training.max_steps_per_game,
    );
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    let mut learner_agent = DqnAgent::new(&online_net, policy.clone());
    let mut opponent_agent = DqnAgent::new(&opponent_net, policy);
    if game_index % 2 == 0 {
        driver.play_game(&mut learner_agent, &mut opponent_agent, &mut rng, Some(budget))
    } else {
        driver.play_game(&mut opponent_agent, &mut learner_agent, &mut rng, Some(budget))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_seeds_are_distinct() {
        let mut seen = HashSet::new();
        for cycle in 0..4u64 {
            for game in 0..8usize {
                for attempt in 0..2usize {
                    assert!(seen.insert(worker_seed(42, cycle, game, attempt)));
                }
            }
        }
    }

    #[test]
    fn test_cancel_token_round_trip() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_context_error_counts_reset() {
        let mut context = TrainingContext::default();
        context.record_error("WORKER_ERROR");
        context.record_error("WORKER_ERROR");
        assert_eq!(context.error_count("WORKER_ERROR"), 2);
        context.reset_cycle();
        assert_eq!(context.error_count("WORKER_ERROR"), 0);
    }
}
