//! Depth-limited alpha-beta baseline over the engine adapter.
//!
//! Negamax with capture-first ordering and mate scores shifted by ply so
//! faster mates rank higher. Strong enough to punish a random learner and
//! fully deterministic, which the evaluation harness relies on.

use rand::rngs::StdRng;

use super::heuristic::{evaluate, piece_value};
use super::{action_of, Agent};
use crate::codec::ActionMask;
use crate::engine::{ChessEngine, ChessMove, GameStatus, Outcome, OutcomeReason};
use crate::{ChessRlError, Result};

const INFINITY_SCORE: i32 = 60_000;
const MATE_SCORE: i32 = 30_000;

/// Root search result: every root move with its score, best first.
#[derive(Debug, Clone)]
pub struct RootSearch {
    pub scored_moves: Vec<(ChessMove, i32)>,
}

impl RootSearch {
    pub fn best(&self) -> Option<(ChessMove, i32)> {
        self.scored_moves.first().copied()
    }
}

/// Score the terminal status from the mover's perspective.
fn terminal_score(status: GameStatus, ply: u32) -> i32 {
    match status.reason {
        // The side to move is the one checkmated.
        OutcomeReason::Checkmate => -(MATE_SCORE - ply as i32),
        _ => 0,
    }
}

fn negamax<E: ChessEngine>(
    engine: &E,
    state: &E::State,
    depth: u32,
    mut alpha: i32,
    beta: i32,
    ply: u32,
) -> Result<i32> {
    let status = engine.outcome(state);
    if status.outcome != Outcome::Ongoing {
        return Ok(terminal_score(status, ply));
    }
    if depth == 0 {
        return Ok(evaluate(
            &engine.snapshot(state),
            engine.side_to_move(state),
        ));
    }

    let mut best = -INFINITY_SCORE;
    for mv in ordered_moves(engine, state) {
        let child = engine.apply_move(state, mv)?;
        let score = -negamax(engine, &child, depth - 1, -beta, -alpha, ply + 1)?;
        if score > best {
            best = score;
        }
        if best > alpha {
            alpha = best;
        }
        if alpha >= beta {
            break;
        }
    }
    Ok(best)
}

/// Captures first, most valuable victim first; quiet moves keep generation
/// order.
fn ordered_moves<E: ChessEngine>(engine: &E, state: &E::State) -> Vec<ChessMove> {
    let snapshot = engine.snapshot(state);
    let mut moves = engine.legal_moves(state);
    moves.sort_by_key(|mv| {
        match snapshot.pieces[mv.to.index()] {
            Some((_, victim)) => -piece_value(victim),
            None => 1,
        }
    });
    moves
}

/// Search the root and return all moves scored, best first. `None` for
/// terminal positions.
pub fn search_root<E: ChessEngine>(
    engine: &E,
    state: &E::State,
    depth: u32,
) -> Result<Option<RootSearch>> {
    let legal = ordered_moves(engine, state);
    if legal.is_empty() {
        return Ok(None);
    }
    // Full window per root move: the distillation collector needs exact
    // scores for every move, not just the principal variation.
    let mut scored_moves = Vec::with_capacity(legal.len());
    for mv in legal {
        let child = engine.apply_move(state, mv)?;
        let score = -negamax(
            engine,
            &child,
            depth.saturating_sub(1),
            -INFINITY_SCORE,
            INFINITY_SCORE,
            1,
        )?;
        scored_moves.push((mv, score));
    }
    // Stable tie-break on the rendered move keeps root ordering
    // reproducible across runs.
    scored_moves.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.algebraic().cmp(&b.0.algebraic())));
    Ok(Some(RootSearch { scored_moves }))
}

/// Normalized position value in [-1, 1] from the mover's perspective.
pub fn normalized_value(score: i32) -> f64 {
    (score as f64 / 600.0).tanh()
}

#[derive(Debug, Clone, Copy)]
pub struct MinimaxAgent {
    depth: u32,
}

impl MinimaxAgent {
    pub fn new(depth: u32) -> MinimaxAgent {
        MinimaxAgent { depth }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

impl<E: ChessEngine> Agent<E> for MinimaxAgent {
    fn name(&self) -> &str {
        "minimax"
    }

    fn select_action(
        &mut self,
        engine: &E,
        state: &E::State,
        _features: &[f64],
        _mask: &ActionMask,
        _rng: &mut StdRng,
    ) -> Result<usize> {
        let search = search_root(engine, state, self.depth)?.ok_or_else(|| {
            ChessRlError::Engine("minimax agent asked to move in a terminal position".to_string())
        })?;
        let (best, _) = search.best().ok_or_else(|| {
            ChessRlError::Engine("root search produced no moves".to_string())
        })?;
        Ok(action_of(&best))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::native::NativeEngine;
    use rand::SeedableRng;

    #[test]
    fn test_finds_mate_in_one() {
        let engine = NativeEngine::new();
        // Back-rank mate: Ra1-a8 is forced.
        let state = engine
            .from_fen("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1")
            .unwrap();
        let search = search_root(&engine, &state, 2).unwrap().unwrap();
        let (best, score) = search.best().unwrap();
        assert_eq!(best.algebraic(), "a1a8");
        assert!(score > MATE_SCORE - 100);
    }

    #[test]
    fn test_prefers_winning_capture() {
        let engine = NativeEngine::new();
        let state = engine
            .from_fen("4k3/8/8/8/3q4/2P5/8/4K3 w - - 0 1")
            .unwrap();
        let mut agent = MinimaxAgent::new(2);
        let legal = engine.legal_moves(&state);
        let mask = crate::codec::legal_mask(&legal);
        let features = crate::codec::encode_state(&engine.snapshot(&state));
        let mut rng = StdRng::seed_from_u64(0);
        let action = agent
            .select_action(&engine, &state, &features, &mask, &mut rng)
            .unwrap();
        let chosen = crate::codec::decode_action(action, &legal).unwrap().unwrap();
        assert_eq!(chosen.algebraic(), "c3d4");
    }

    #[test]
    fn test_root_scores_sorted_descending() {
        let engine = NativeEngine::new();
        let state = engine.initial_state();
        let search = search_root(&engine, &state, 2).unwrap().unwrap();
        let scores: Vec<i32> = search.scored_moves.iter().map(|&(_, s)| s).collect();
        let mut sorted = scores.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(scores, sorted);
        assert_eq!(search.scored_moves.len(), 20);
    }

    #[test]
    fn test_normalized_value_bounds() {
        assert!(normalized_value(MATE_SCORE) > 0.99);
        assert!(normalized_value(-MATE_SCORE) < -0.99);
        assert_eq!(normalized_value(0), 0.0);
    }
}
