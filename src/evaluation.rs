//! Baseline evaluation tournaments.
//!
//! The learner plays a fixed opponent with alternating colors (odd game
//! counts give the extra game to white). Reports carry a Wilson 95%
//! interval on the win rate, a two-sided exact binomial test against the
//! 0.5 null and an effect-size bucket.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::agents::{Agent, DqnAgent, HeuristicAgent, MinimaxAgent, RandomAgent};
use crate::engine::{ChessEngine, Outcome};
use crate::neural::TrainableNetwork;
use crate::selfplay::{RewardConfig, SelfPlayDriver};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineKind {
    Random,
    Heuristic,
    Minimax,
}

impl BaselineKind {
    pub fn name(self) -> &'static str {
        match self {
            BaselineKind::Random => "random",
            BaselineKind::Heuristic => "heuristic",
            BaselineKind::Minimax => "minimax",
        }
    }
}

/// Aggregated tournament result against one baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineReport {
    pub opponent: String,
    pub games: usize,
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    pub wins_as_white: usize,
    pub wins_as_black: usize,
    pub games_as_white: usize,
    pub games_as_black: usize,
    pub avg_game_length: f64,
    pub win_rate: f64,
    pub wilson_low: f64,
    pub wilson_high: f64,
    pub p_value: f64,
    pub significant: bool,
    pub effect_size: f64,
    pub effect_label: String,
}

/// Play `games` evaluation games of the greedy learner against a baseline.
pub fn evaluate_against<E, N>(
    engine: &E,
    network: &N,
    baseline: BaselineKind,
    games: usize,
    minimax_depth: u32,
    max_plies: u32,
    seed: u64,
) -> Result<BaselineReport>
where
    E: ChessEngine,
    N: TrainableNetwork,
{
    let driver = SelfPlayDriver::new(engine, RewardConfig::default(), max_plies);
    let mut wins = 0;
    let mut draws = 0;
    let mut losses = 0;
    let mut wins_as_white = 0;
    let mut wins_as_black = 0;
    let mut games_as_white = 0;
    let mut games_as_black = 0;
    let mut total_plies = 0u64;

    for game_index in 0..games {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(game_index as u64));
        let learner_is_white = game_index % 2 == 0;
        let mut learner = DqnAgent::greedy(network);
        let mut opponent_random = RandomAgent;
        let mut opponent_heuristic = HeuristicAgent;
        let mut opponent_minimax = MinimaxAgent::new(minimax_depth);
        let opponent: &mut dyn Agent<E> = match baseline {
            BaselineKind::Random => &mut opponent_random,
            BaselineKind::Heuristic => &mut opponent_heuristic,
            BaselineKind::Minimax => &mut opponent_minimax,
        };

        let result = if learner_is_white {
            driver.play_game(&mut learner, opponent, &mut rng, None)?
        } else {
            driver.play_game(opponent, &mut learner, &mut rng, None)?
        };

        total_plies += result.plies as u64;
        if learner_is_white {
            games_as_white += 1;
        } else {
            games_as_black += 1;
        }

        let learner_won = matches!(
            (result.outcome(), learner_is_white),
            (Outcome::WhiteWins, true) | (Outcome::BlackWins, false)
        );
        let learner_lost = matches!(
            (result.outcome(), learner_is_white),
            (Outcome::WhiteWins, false) | (Outcome::BlackWins, true)
        );
        if learner_won {
            wins += 1;
            if learner_is_white {
                wins_as_white += 1;
            } else {
                wins_as_black += 1;
            }
        } else if learner_lost {
            losses += 1;
        } else {
            draws += 1;
        }
    }

    let win_rate = if games > 0 {
        wins as f64 / games as f64
    } else {
        0.0
    };
    let (wilson_low, wilson_high) = wilson_interval(wins, games, 1.96);
    let p_value = binomial_two_sided_p(wins, games, 0.5);
    let effect_size = (win_rate - 0.5).abs();

    Ok(BaselineReport {
        opponent: baseline.name().to_string(),
        games,
        wins,
        draws,
        losses,
        wins_as_white,
        wins_as_black,
        games_as_white,
        games_as_black,
        avg_game_length: if games > 0 {
            total_plies as f64 / games as f64
        } else {
            0.0
        },
        win_rate,
        wilson_low,
        wilson_high,
        p_value,
        significant: p_value < 0.05,
        effect_size,
        effect_label: effect_label(effect_size).to_string(),
    })
}

/// Wilson score interval for a binomial proportion.
pub fn wilson_interval(successes: usize, trials: usize, z: f64) -> (f64, f64) {
    if trials == 0 {
        return (0.0, 1.0);
    }
    let n = trials as f64;
    let p = successes as f64 / n;
    let z2 = z * z;
    let denominator = 1.0 + z2 / n;
    let center = p + z2 / (2.0 * n);
    let margin = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt();
    (
        ((center - margin) / denominator).max(0.0),
        ((center + margin) / denominator).min(1.0),
    )
}

/// Two-sided exact binomial test: the summed probability of all outcomes
/// no more likely than the observed one. Log-space to survive large n.
pub fn binomial_two_sided_p(successes: usize, trials: usize, p0: f64) -> f64 {
    if trials == 0 {
        return 1.0;
    }
    let observed = ln_binomial_pmf(successes, trials, p0);
    let mut total = 0.0;
    for k in 0..=trials {
        let ln_p = ln_binomial_pmf(k, trials, p0);
        if ln_p <= observed + 1e-9 {
            total += ln_p.exp();
        }
    }
    total.min(1.0)
}

fn ln_binomial_pmf(k: usize, n: usize, p: f64) -> f64 {
    ln_choose(n, k) + k as f64 * p.ln() + (n - k) as f64 * (1.0 - p).ln()
}

fn ln_choose(n: usize, k: usize) -> f64 {
    ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k)
}

fn ln_factorial(n: usize) -> f64 {
    (2..=n).map(|i| (i as f64).ln()).sum()
}

/// Action-diversity statistics over greedy self-play games.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiversityReport {
    pub games: usize,
    pub unique_actions: usize,
    pub unique_openings: usize,
    pub avg_game_length: f64,
    /// Opening move frequencies, most common first.
    pub opening_moves: Vec<(String, usize)>,
}

/// Play `games` greedy self-play games and report how varied the policy's
/// action choices are. Low numbers here foreshadow LOW_MOVE_DIVERSITY.
pub fn diversity_report<E, N>(
    engine: &E,
    network: &N,
    games: usize,
    max_plies: u32,
    seed: u64,
) -> Result<DiversityReport>
where
    E: ChessEngine,
    N: TrainableNetwork,
{
    use std::collections::HashMap;

    let driver = SelfPlayDriver::new(engine, RewardConfig::default(), max_plies);
    let mut unique_actions = std::collections::HashSet::new();
    let mut openings: HashMap<usize, usize> = HashMap::new();
    let mut total_plies = 0u64;

    for game_index in 0..games {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(game_index as u64));
        let mut white = DqnAgent::greedy(network);
        let mut black = DqnAgent::greedy(network);
        let result = driver.play_game(&mut white, &mut black, &mut rng, None)?;
        total_plies += result.plies as u64;
        if let Some(first) = result.transitions.first() {
            *openings.entry(first.action).or_insert(0) += 1;
        }
        for transition in &result.transitions {
            unique_actions.insert(transition.action);
        }
    }

    let mut opening_moves: Vec<(String, usize)> = openings
        .iter()
        .map(|(&action, &count)| (action_algebraic(action), count))
        .collect();
    opening_moves.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    Ok(DiversityReport {
        games,
        unique_actions: unique_actions.len(),
        unique_openings: openings.len(),
        avg_game_length: if games > 0 {
            total_plies as f64 / games as f64
        } else {
            0.0
        },
        opening_moves,
    })
}

/// Render an action index as the 4-char algebraic move it encodes.
pub fn action_algebraic(action: usize) -> String {
    use crate::engine::Square;
    let from = Square::from_index(action / 64);
    let to = Square::from_index(action % 64);
    format!("{}{}", from.algebraic(), to.algebraic())
}

/// Bucket an absolute win-rate difference from the 0.5 null.
pub fn effect_label(effect: f64) -> &'static str {
    if effect < 0.2 {
        "negligible"
    } else if effect < 0.5 {
        "small"
    } else if effect < 0.8 {
        "medium"
    } else {
        "large"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wilson_interval_brackets_proportion() {
        let (low, high) = wilson_interval(30, 50, 1.96);
        let p = 0.6;
        assert!(low < p && p < high);
        assert!(low > 0.45 && high < 0.75);
    }

    #[test]
    fn test_wilson_interval_degenerate_cases() {
        assert_eq!(wilson_interval(0, 0, 1.96), (0.0, 1.0));
        let (low, high) = wilson_interval(0, 20, 1.96);
        assert_eq!(low, 0.0);
        assert!(high < 0.25);
        let (low, high) = wilson_interval(20, 20, 1.96);
        assert!(low > 0.75);
        assert_eq!(high, 1.0);
    }

    #[test]
    fn test_binomial_test_even_split_not_significant() {
        let p = binomial_two_sided_p(25, 50, 0.5);
        assert!(p > 0.9);
    }

    #[test]
    fn test_binomial_test_lopsided_significant() {
        let p = binomial_two_sided_p(45, 50, 0.5);
        assert!(p < 1e-6);
    }

    #[test]
    fn test_binomial_test_symmetry() {
        let high = binomial_two_sided_p(40, 50, 0.5);
        let low = binomial_two_sided_p(10, 50, 0.5);
        assert!((high - low).abs() < 1e-9);
    }

    #[test]
    fn test_effect_labels() {
        assert_eq!(effect_label(0.1), "negligible");
        assert_eq!(effect_label(0.3), "small");
        assert_eq!(effect_label(0.6), "medium");
        assert_eq!(effect_label(0.9), "large");
    }
}
