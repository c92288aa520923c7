//! Self-play episode driver.
//!
//! Plays one game between two agents and emits the transition list with
//! terminal rewards credited to each side's final move. Natural endings
//! (mate, stalemate, dead position, 50-move, repetition) always take
//! precedence over the step cap and never receive the step-limit penalty.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::agents::Agent;
use crate::codec::{decode_action, encode_state, legal_mask};
use crate::engine::{ChessEngine, Color, GameStatus, Outcome, OutcomeReason};
use crate::replay::Transition;
use crate::{ChessRlError, Result};

/// Reward shaping knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Terminal reward for the winning side's final move
    /// Default: 1.0
    pub win_reward: f64,

    /// Terminal reward for the losing side's final move
    /// Default: -1.0
    pub loss_reward: f64,

    /// Terminal reward for both sides on a draw
    /// Default: 0.0
    pub draw_reward: f64,

    /// Shaping reward on every recorded transition
    /// Default: -0.001
    pub step_penalty: f64,

    /// Replaces the terminal reward when the ply cap fires
    /// Default: -0.5
    pub step_limit_penalty: f64,

    /// Declare a forced result from material imbalance plus stagnation.
    /// Both conditions must hold. Default: false
    pub enable_early_adjudication: bool,

    /// Material lead (pawn units) required to adjudicate
    /// Default: 9
    pub resign_material_threshold: i32,

    /// Halfmove-clock floor required to adjudicate
    /// Default: 40
    pub no_progress_plies: u32,

    /// Unreachable under the masked action contract; defense in depth
    /// Default: -1.0
    pub invalid_move_reward: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            win_reward: 1.0,
            loss_reward: -1.0,
            draw_reward: 0.0,
            step_penalty: -0.001,
            step_limit_penalty: -0.5,
            enable_early_adjudication: false,
            resign_material_threshold: 9,
            no_progress_plies: 40,
            invalid_move_reward: -1.0,
        }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> Result<()> {
        if self.win_reward <= self.loss_reward {
            return Err(ChessRlError::Config(format!(
                "win_reward {} must exceed loss_reward {}",
                self.win_reward, self.loss_reward
            )));
        }
        if self.resign_material_threshold <= 0 {
            return Err(ChessRlError::Config(
                "resign_material_threshold must be positive".to_string(),
            ));
        }
        if self.no_progress_plies == 0 {
            return Err(ChessRlError::Config(
                "no_progress_plies must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// How the game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameTermination {
    /// A rules outcome: mate, stalemate or a draw rule.
    Natural,
    /// The ply cap fired.
    StepLimit,
    /// Early adjudication declared a forced result.
    Adjudicated,
}

#[derive(Debug)]
pub struct GameResult {
    pub status: GameStatus,
    pub termination: GameTermination,
    pub plies: u32,
    pub final_fen: String,
    pub transitions: Vec<Transition>,
}

impl GameResult {
    pub fn outcome(&self) -> Outcome {
        self.status.outcome
    }
}

pub struct SelfPlayDriver<'a, E: ChessEngine> {
    engine: &'a E,
    rewards: RewardConfig,
    max_plies: u32,
}

impl<'a, E: ChessEngine> SelfPlayDriver<'a, E> {
    pub fn new(engine: &'a E, rewards: RewardConfig, max_plies: u32) -> SelfPlayDriver<'a, E> {
        SelfPlayDriver {
            engine,
            rewards,
            max_plies,
        }
    }

    /// Play a full game from the starting position. `budget` is the
    /// wall-clock allowance; on overrun the partial game is discarded and a
    /// worker error returned.
    pub fn play_game(
        &self,
        white: &mut dyn Agent<E>,
        black: &mut dyn Agent<E>,
        rng: &mut StdRng,
        budget: Option<Duration>,
    ) -> Result<GameResult> {
        let deadline = budget.map(|b| Instant::now() + b);
        let engine = self.engine;
        let mut state = engine.initial_state();
        let mut transitions: Vec<Transition> = Vec::new();
        // Index of each color's most recent transition, for terminal credit.
        let mut last_white: Option<usize> = None;
        let mut last_black: Option<usize> = None;
        let mut plies: u32 = 0;

        let (status, termination) = loop {
            if let Some(deadline) = deadline {
                if Instant::now() > deadline {
                    return Err(ChessRlError::Worker(format!(
                        "self-play game exceeded its {}ms budget at ply {}",
                        budget.map(|b| b.as_millis()).unwrap_or_default(),
                        plies
                    )));
                }
            }

            let status = engine.outcome(&state);
            if status.is_terminal() {
                self.credit_terminal(&mut transitions, last_white, last_black, status);
                break (status, GameTermination::Natural);
            }

            if plies >= self.max_plies {
                if let Some(last) = transitions.last_mut() {
                    last.reward = self.rewards.step_limit_penalty;
                    last.done = true;
                }
                break (GameStatus::ONGOING, GameTermination::StepLimit);
            }

            if self.rewards.enable_early_adjudication {
                if let Some(adjudicated) = self.adjudicate(&state) {
                    self.credit_terminal(&mut transitions, last_white, last_black, adjudicated);
                    break (adjudicated, GameTermination::Adjudicated);
                }
            }

            let legal = engine.legal_moves(&state);
            let mask = legal_mask(&legal);
            let features = encode_state(&engine.snapshot(&state));
            let mover = engine.side_to_move(&state);

            let agent: &mut dyn Agent<E> = match mover {
                Color::White => &mut *white,
                Color::Black => &mut *black,
            };
            let action = agent.select_action(engine, &state, &features, &mask, rng)?;
            let mv = decode_action(action, &legal)?.ok_or_else(|| {
                ChessRlError::Codec(format!(
                    "agent '{}' selected illegal action {} at ply {}",
                    agent.name(),
                    action,
                    plies
                ))
            })?;

            let next_state = engine.apply_move(&state, mv)?;
            let next_legal = engine.legal_moves(&next_state);
            let next_mask = if next_legal.is_empty() {
                None
            } else {
                Some(legal_mask(&next_legal))
            };

            transitions.push(Transition {
                state: features,
                action,
                reward: self.rewards.step_penalty,
                next_state: encode_state(&engine.snapshot(&next_state)),
                done: false,
                legal_mask: mask,
                next_legal_mask: next_mask,
            });
            match mover {
                Color::White => last_white = Some(transitions.len() - 1),
                Color::Black => last_black = Some(transitions.len() - 1),
            }

            state = next_state;
            plies += 1;
        };

        white.on_episode_end();
        black.on_episode_end();

        Ok(GameResult {
            status,
            termination,
            plies,
            final_fen: engine.to_fen(&state),
            transitions,
        })
    }

    /// Terminal credit, zero-sum convention: each side's final transition
    /// carries its result reward and is marked done.
    fn credit_terminal(
        &self,
        transitions: &mut [Transition],
        last_white: Option<usize>,
        last_black: Option<usize>,
        status: GameStatus,
    ) {
        let (white_reward, black_reward) = match status.outcome {
            Outcome::WhiteWins => (self.rewards.win_reward, self.rewards.loss_reward),
            Outcome::BlackWins => (self.rewards.loss_reward, self.rewards.win_reward),
            _ => (self.rewards.draw_reward, self.rewards.draw_reward),
        };
        if let Some(index) = last_white {
            transitions[index].reward = white_reward;
            transitions[index].done = true;
        }
        if let Some(index) = last_black {
            transitions[index].reward = black_reward;
            transitions[index].done = true;
        }
    }

    /// Conservative adjudication: a decisive material lead AND a stagnant
    /// halfmove clock, together, declare the leader winner.
    fn adjudicate(&self, state: &E::State) -> Option<GameStatus> {
        let snapshot = self.engine.snapshot(state);
        if snapshot.halfmove_clock < self.rewards.no_progress_plies {
            return None;
        }
        let balance = snapshot.material_balance();
        if balance.abs() < self.rewards.resign_material_threshold {
            return None;
        }
        Some(GameStatus {
            outcome: if balance > 0 {
                Outcome::WhiteWins
            } else {
                Outcome::BlackWins
            },
            reason: OutcomeReason::Ongoing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::RandomAgent;
    use crate::engine::native::NativeEngine;
    use rand::SeedableRng;

    fn driver_with<'a>(
        engine: &'a NativeEngine,
        max_plies: u32,
    ) -> SelfPlayDriver<'a, NativeEngine> {
        SelfPlayDriver::new(engine, RewardConfig::default(), max_plies)
    }

    #[test]
    fn test_step_limit_penalizes_last_transition() {
        let engine = NativeEngine::new();
        let driver = driver_with(&engine, 1);
        let mut white = RandomAgent;
        let mut black = RandomAgent;
        let mut rng = StdRng::seed_from_u64(1);
        let result = driver
            .play_game(&mut white, &mut black, &mut rng, None)
            .unwrap();
        assert_eq!(result.termination, GameTermination::StepLimit);
        assert_eq!(result.plies, 1);
        assert_eq!(result.transitions.len(), 1);
        let last = &result.transitions[0];
        assert!(last.done);
        assert_eq!(last.reward, RewardConfig::default().step_limit_penalty);
    }

    #[test]
    fn test_random_game_emits_consistent_transitions() {
        let engine = NativeEngine::new();
        let driver = driver_with(&engine, 40);
        let mut white = RandomAgent;
        let mut black = RandomAgent;
        let mut rng = StdRng::seed_from_u64(5);
        let result = driver
            .play_game(&mut white, &mut black, &mut rng, None)
            .unwrap();
        assert_eq!(result.transitions.len() as u32, result.plies);
        for transition in &result.transitions {
            assert_eq!(transition.state.len(), crate::codec::FEATURE_LEN);
            assert!(transition.action < crate::codec::ACTION_SPACE);
            if !transition.done {
                assert!(transition.next_legal_mask.is_some());
            }
        }
        // Deterministic replay under the same seed.
        let mut rng2 = StdRng::seed_from_u64(5);
        let replay = driver
            .play_game(&mut RandomAgent, &mut RandomAgent, &mut rng2, None)
            .unwrap();
        assert_eq!(replay.final_fen, result.final_fen);
        assert_eq!(replay.plies, result.plies);
    }

    #[test]
    fn test_natural_ending_never_gets_step_limit_penalty() {
        let engine = NativeEngine::new();
        // Cap far above any random game's natural length is impractical;
        // instead verify on a game that ends exactly at the cap boundary
        // semantics: natural terminal check runs before the cap check.
        let driver = driver_with(&engine, 10_000);
        let mut rng = StdRng::seed_from_u64(17);
        let result = driver
            .play_game(&mut RandomAgent, &mut RandomAgent, &mut rng, None)
            .unwrap();
        assert_eq!(result.termination, GameTermination::Natural);
        let rewards = RewardConfig::default();
        for transition in &result.transitions {
            assert_ne!(transition.reward, rewards.step_limit_penalty);
        }
    }

    #[test]
    fn test_terminal_rewards_are_zero_sum_on_decisive_games() {
        let engine = NativeEngine::new();
        let driver = driver_with(&engine, 10_000);
        let rewards = RewardConfig::default();
        for seed in 0..8u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let result = driver
                .play_game(&mut RandomAgent, &mut RandomAgent, &mut rng, None)
                .unwrap();
            let terminal: Vec<&Transition> =
                result.transitions.iter().filter(|t| t.done).collect();
            match result.status.outcome {
                Outcome::WhiteWins | Outcome::BlackWins => {
                    assert_eq!(terminal.len(), 2);
                    let sum: f64 = terminal.iter().map(|t| t.reward).sum();
                    assert!((sum - (rewards.win_reward + rewards.loss_reward)).abs() < 1e-12);
                }
                Outcome::Draw => {
                    for t in terminal {
                        assert_eq!(t.reward, rewards.draw_reward);
                    }
                }
                Outcome::Ongoing => unreachable!("uncapped game must end naturally"),
            }
        }
    }

    #[test]
    fn test_adjudication_requires_both_conditions() {
        let engine = NativeEngine::new();
        let mut rewards = RewardConfig::default();
        rewards.enable_early_adjudication = true;
        rewards.resign_material_threshold = 5;
        rewards.no_progress_plies = 10;
        let driver = SelfPlayDriver::new(&engine, rewards, 500);

        // Queen up but the halfmove clock is fresh: no adjudication.
        let fresh = engine
            .from_fen("4k3/8/8/8/8/8/3Q4/4K3 w - - 0 1")
            .unwrap();
        assert!(driver.adjudicate(&fresh).is_none());

        // Queen up and stagnant: white is declared the winner.
        let stale = engine
            .from_fen("4k3/8/8/8/8/8/3Q4/4K3 w - - 30 40")
            .unwrap();
        let status = driver.adjudicate(&stale).unwrap();
        assert_eq!(status.outcome, Outcome::WhiteWins);

        // Stagnant but balanced: no adjudication.
        let balanced = engine
            .from_fen("3qk3/8/8/8/8/8/3Q4/4K3 w - - 30 40")
            .unwrap();
        assert!(driver.adjudicate(&balanced).is_none());
    }
}
