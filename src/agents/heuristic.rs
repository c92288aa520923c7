//! Hand-written evaluation and the one-ply heuristic baseline.
//!
//! Material in centipawns plus small piece-square bonuses, white's point of
//! view internally, negated for black on demand. The same evaluation
//! drives the minimax baseline's leaves.

use rand::rngs::StdRng;

use super::{action_of, Agent};
use crate::codec::ActionMask;
use crate::engine::{BoardSnapshot, ChessEngine, Color, PieceKind, Square};
use crate::{ChessRlError, Result};

pub const PAWN_VALUE: i32 = 100;
pub const KNIGHT_VALUE: i32 = 320;
pub const BISHOP_VALUE: i32 = 330;
pub const ROOK_VALUE: i32 = 500;
pub const QUEEN_VALUE: i32 = 900;

pub fn piece_value(kind: PieceKind) -> i32 {
    match kind {
        PieceKind::Pawn => PAWN_VALUE,
        PieceKind::Knight => KNIGHT_VALUE,
        PieceKind::Bishop => BISHOP_VALUE,
        PieceKind::Rook => ROOK_VALUE,
        PieceKind::Queen => QUEEN_VALUE,
        PieceKind::King => 0,
    }
}

#[rustfmt::skip]
const PST_PAWN: [i32; 64] = [
     0,  0,  0,  0,  0,  0,  0,  0,
     5, 10, 10,-20,-20, 10, 10,  5,
     5, -5,-10,  0,  0,-10, -5,  5,
     0,  0,  0, 20, 20,  0,  0,  0,
     5,  5, 10, 25, 25, 10,  5,  5,
    10, 10, 20, 30, 30, 20, 10, 10,
    50, 50, 50, 50, 50, 50, 50, 50,
     0,  0,  0,  0,  0,  0,  0,  0,
];

#[rustfmt::skip]
const PST_KNIGHT: [i32; 64] = [
   -50,-40,-30,-30,-30,-30,-40,-50,
   -40,-20,  0,  5,  5,  0,-20,-40,
   -30,  5, 10, 15, 15, 10,  5,-30,
   -30,  0, 15, 20, 20, 15,  0,-30,
   -30,  5, 15, 20, 20, 15,  5,-30,
   -30,  0, 10, 15, 15, 10,  0,-30,
   -40,-20,  0,  0,  0,  0,-20,-40,
   -50,-40,-30,-30,-30,-30,-40,-50,
];

#[rustfmt::skip]
const PST_BISHOP: [i32; 64] = [
   -20,-10,-10,-10,-10,-10,-10,-20,
   -10,  5,  0,  0,  0,  0,  5,-10,
   -10, 10, 10, 10, 10, 10, 10,-10,
   -10,  0, 10, 10, 10, 10,  0,-10,
   -10,  5,  5, 10, 10,  5,  5,-10,
   -10,  0,  5, 10, 10,  5,  0,-10,
   -10,  0,  0,  0,  0,  0,  0,-10,
   -20,-10,-10,-10,-10,-10,-10,-20,
];

#[rustfmt::skip]
const PST_ROOK: [i32; 64] = [
     0,  0,  0,  5,  5,  0,  0,  0,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
    -5,  0,  0,  0,  0,  0,  0, -5,
     5, 10, 10, 10, 10, 10, 10,  5,
     0,  0,  0,  0,  0,  0,  0,  0,
];

#[rustfmt::skip]
const PST_QUEEN: [i32; 64] = [
   -20,-10,-10, -5, -5,-10,-10,-20,
   -10,  0,  5,  0,  0,  0,  0,-10,
   -10,  5,  5,  5,  5,  5,  0,-10,
     0,  0,  5,  5,  5,  5,  0, -5,
    -5,  0,  5,  5,  5,  5,  0, -5,
   -10,  0,  5,  5,  5,  5,  0,-10,
   -10,  0,  0,  0,  0,  0,  0,-10,
   -20,-10,-10, -5, -5,-10,-10,-20,
];

#[rustfmt::skip]
const PST_KING: [i32; 64] = [
    20, 30, 10,  0,  0, 10, 30, 20,
    20, 20,  0,  0,  0,  0, 20, 20,
   -10,-20,-20,-20,-20,-20,-20,-10,
   -20,-30,-30,-40,-40,-30,-30,-20,
   -30,-40,-40,-50,-50,-40,-40,-30,
   -30,-40,-40,-50,-50,-40,-40,-30,
   -30,-40,-40,-50,-50,-40,-40,-30,
   -30,-40,-40,-50,-50,-40,-40,-30,
];

fn pst_bonus(kind: PieceKind, color: Color, square: Square) -> i32 {
    // Tables are from white's point of view; mirror ranks for black.
    let index = match color {
        Color::White => square.index(),
        Color::Black => square.index() ^ 56,
    };
    match kind {
        PieceKind::Pawn => PST_PAWN[index],
        PieceKind::Knight => PST_KNIGHT[index],
        PieceKind::Bishop => PST_BISHOP[index],
        PieceKind::Rook => PST_ROOK[index],
        PieceKind::Queen => PST_QUEEN[index],
        PieceKind::King => PST_KING[index],
    }
}

/// Static evaluation in centipawns from `perspective`'s point of view.
pub fn evaluate(snapshot: &BoardSnapshot, perspective: Color) -> i32 {
    let mut score = 0;
    for (index, piece) in snapshot.pieces.iter().enumerate() {
        let Some((color, kind)) = piece else { continue };
        let value = piece_value(*kind) + pst_bonus(*kind, *color, Square::from_index(index));
        match color {
            Color::White => score += value,
            Color::Black => score -= value,
        }
    }
    match perspective {
        Color::White => score,
        Color::Black => -score,
    }
}

/// One-ply evaluation chooser: plays the move whose successor scores best
/// for the mover. Ties break toward the smallest action index.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAgent;

impl<E: ChessEngine> Agent<E> for HeuristicAgent {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn select_action(
        &mut self,
        engine: &E,
        state: &E::State,
        _features: &[f64],
        _mask: &ActionMask,
        _rng: &mut StdRng,
    ) -> Result<usize> {
        let mover = engine.side_to_move(state);
        let legal = engine.legal_moves(state);
        let mut best: Option<(i32, usize)> = None;
        for mv in &legal {
            let child = engine.apply_move(state, *mv)?;
            let score = evaluate(&engine.snapshot(&child), mover);
            let action = action_of(mv);
            let better = match best {
                None => true,
                Some((best_score, best_action)) => {
                    score > best_score || (score == best_score && action < best_action)
                }
            };
            if better {
                best = Some((score, action));
            }
        }
        best.map(|(_, action)| action).ok_or_else(|| {
            ChessRlError::Engine("heuristic agent asked to move in a terminal position".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::native::NativeEngine;
    use rand::SeedableRng;

    #[test]
    fn test_start_position_is_balanced() {
        let engine = NativeEngine::new();
        let snapshot = engine.snapshot(&engine.initial_state());
        assert_eq!(evaluate(&snapshot, Color::White), 0);
        assert_eq!(evaluate(&snapshot, Color::Black), 0);
    }

    #[test]
    fn test_material_advantage_reflected() {
        let engine = NativeEngine::new();
        // White has an extra queen.
        let state = engine.from_fen("4k3/8/8/8/8/8/3Q4/4K3 w - - 0 1").unwrap();
        let snapshot = engine.snapshot(&state);
        assert!(evaluate(&snapshot, Color::White) > 800);
        assert!(evaluate(&snapshot, Color::Black) < -800);
    }

    #[test]
    fn test_heuristic_takes_hanging_queen() {
        let engine = NativeEngine::new();
        // Black queen on d4 is capturable by the c3 pawn.
        let state = engine
            .from_fen("4k3/8/8/8/3q4/2P5/8/4K3 w - - 0 1")
            .unwrap();
        let legal = engine.legal_moves(&state);
        let mask = crate::codec::legal_mask(&legal);
        let features = crate::codec::encode_state(&engine.snapshot(&state));
        let mut agent = HeuristicAgent;
        let mut rng = StdRng::seed_from_u64(0);
        let action = agent
            .select_action(&engine, &state, &features, &mask, &mut rng)
            .unwrap();
        let chosen = crate::codec::decode_action(action, &legal).unwrap().unwrap();
        assert_eq!(chosen.algebraic(), "c3d4");
    }
}
