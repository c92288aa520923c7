//! State/action codec.
//!
//! Positions become a fixed 839-entry feature vector; moves map onto a
//! dense `from*64 + to` action space of 4096 entries. Promotions collapse
//! onto the plain (from, to) index, and the decoder resolves the collision
//! in favor of the queen promotion, so under-promotions are unreachable
//! through the action channel.
//!
//! Feature layout:
//! - 0..768: 12 piece planes x 64 squares, white PNBRQK then black PNBRQK
//! - 768: side to move (white = 1)
//! - 769..773: castling rights WK, WQ, BK, BQ
//! - 773..837: en-passant target one-hot
//! - 837: halfmove clock, clamped to 100 and scaled
//! - 838: fullmove number, clamped to 200 and scaled

use crate::engine::{BoardSnapshot, ChessMove, Color, PieceKind};
use crate::{ChessRlError, Result};

/// Width of the encoded feature vector.
pub const FEATURE_LEN: usize = 839;

/// Width of the dense action space.
pub const ACTION_SPACE: usize = 4096;

const MASK_WORDS: usize = ACTION_SPACE / 64;

/// Deterministic, total encoding of a position snapshot.
pub fn encode_state(snapshot: &BoardSnapshot) -> Vec<f64> {
    let mut features = vec![0.0; FEATURE_LEN];
    for (index, piece) in snapshot.pieces.iter().enumerate() {
        if let Some((color, kind)) = piece {
            features[plane_index(*color, *kind) * 64 + index] = 1.0;
        }
    }
    if snapshot.side_to_move == Color::White {
        features[768] = 1.0;
    }
    for (i, &right) in snapshot.castling.iter().enumerate() {
        if right {
            features[769 + i] = 1.0;
        }
    }
    if let Some(ep) = snapshot.en_passant {
        features[773 + ep.index()] = 1.0;
    }
    features[837] = snapshot.halfmove_clock.min(100) as f64 / 100.0;
    features[838] = snapshot.fullmove_number.clamp(1, 200) as f64 / 200.0;
    features
}

fn plane_index(color: Color, kind: PieceKind) -> usize {
    let kind_index = match kind {
        PieceKind::Pawn => 0,
        PieceKind::Knight => 1,
        PieceKind::Bishop => 2,
        PieceKind::Rook => 3,
        PieceKind::Queen => 4,
        PieceKind::King => 5,
    };
    match color {
        Color::White => kind_index,
        Color::Black => 6 + kind_index,
    }
}

/// Dense action index of a move. The promotion piece does not participate.
pub fn encode_move(mv: &ChessMove) -> usize {
    mv.from.index() * 64 + mv.to.index()
}

/// Resolve an action index against the legal move list.
///
/// Returns `Ok(None)` when no legal move matches (an illegal action the
/// caller replaces with a sampled legal one); the queen variant wins when
/// several promotions share the index. Indices outside the action space are
/// a codec error.
pub fn decode_action(index: usize, legal_moves: &[ChessMove]) -> Result<Option<ChessMove>> {
    if index >= ACTION_SPACE {
        return Err(ChessRlError::Codec(format!(
            "action index {} outside [0, {})",
            index, ACTION_SPACE
        )));
    }
    let mut fallback = None;
    for mv in legal_moves {
        if encode_move(mv) != index {
            continue;
        }
        match mv.promotion {
            None | Some(PieceKind::Queen) => return Ok(Some(*mv)),
            _ => fallback = fallback.or(Some(*mv)),
        }
    }
    Ok(fallback)
}

/// Bitset over the 4096-entry action space.
#[derive(Clone, PartialEq, Eq)]
pub struct ActionMask {
    words: [u64; MASK_WORDS],
}

impl ActionMask {
    pub fn empty() -> ActionMask {
        ActionMask {
            words: [0; MASK_WORDS],
        }
    }

    pub fn set(&mut self, index: usize) {
        debug_assert!(index < ACTION_SPACE);
        self.words[index / 64] |= 1 << (index % 64);
    }

    pub fn get(&self, index: usize) -> bool {
        index < ACTION_SPACE && self.words[index / 64] & (1 << (index % 64)) != 0
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Set bit indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, &word)| {
            (0..64).filter_map(move |bit| {
                if word & (1 << bit) != 0 {
                    Some(word_idx * 64 + bit)
                } else {
                    None
                }
            })
        })
    }
}

impl std::fmt::Debug for ActionMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ActionMask({} legal)", self.count())
    }
}

/// Legality mask for a move list. Promotion variants collapse onto one bit.
pub fn legal_mask(legal_moves: &[ChessMove]) -> ActionMask {
    let mut mask = ActionMask::empty();
    for mv in legal_moves {
        mask.set(encode_move(mv));
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::native::NativeEngine;
    use crate::engine::{ChessEngine, Square};
    use assert_matches::assert_matches;

    #[test]
    fn test_e2e4_action_index() {
        let mv = ChessMove::parse("e2e4").unwrap();
        assert_eq!(encode_move(&mv), 796);
    }

    #[test]
    fn test_starting_mask_has_twenty_bits() {
        let engine = NativeEngine::new();
        let state = engine.initial_state();
        let mask = legal_mask(&engine.legal_moves(&state));
        assert_eq!(mask.count(), 20);
        assert!(mask.get(796));
        // a1a8 is not a legal opening move.
        assert!(!mask.get(56));
    }

    #[test]
    fn test_starting_features() {
        let engine = NativeEngine::new();
        let snapshot = engine.snapshot(&engine.initial_state());
        let features = encode_state(&snapshot);
        assert_eq!(features.len(), FEATURE_LEN);
        // White pawn plane covers rank 2.
        for file in 0..8 {
            assert_eq!(features[Square::new(1, file).index()], 1.0);
        }
        // Black king on e8 in plane 11.
        assert_eq!(features[11 * 64 + Square::new(7, 4).index()], 1.0);
        assert_eq!(features[768], 1.0);
        assert_eq!(&features[769..773], &[1.0, 1.0, 1.0, 1.0]);
        assert!(features[773..837].iter().all(|&f| f == 0.0));
        assert_eq!(features[837], 0.0);
        assert_eq!(features[838], 1.0 / 200.0);
    }

    #[test]
    fn test_encoding_is_pure() {
        let engine = NativeEngine::new();
        let snapshot = engine.snapshot(&engine.initial_state());
        assert_eq!(encode_state(&snapshot), encode_state(&snapshot));
    }

    #[test]
    fn test_decode_prefers_queen_promotion() {
        let engine = NativeEngine::new();
        let state = engine.from_fen("8/4P2k/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let legal = engine.legal_moves(&state);
        let index = encode_move(&ChessMove::parse("e7e8q").unwrap());
        let decoded = decode_action(index, &legal).unwrap().unwrap();
        assert_eq!(decoded.promotion, Some(PieceKind::Queen));
    }

    #[test]
    fn test_decode_bounds() {
        let legal = [ChessMove::parse("e2e4").unwrap()];
        assert_matches!(decode_action(4095, &legal), Ok(None));
        assert_matches!(decode_action(4096, &legal), Err(ChessRlError::Codec(_)));
    }

    #[test]
    fn test_decode_roundtrip_over_legal_moves() {
        let engine = NativeEngine::new();
        let state = engine.initial_state();
        let legal = engine.legal_moves(&state);
        for mv in &legal {
            let decoded = decode_action(encode_move(mv), &legal).unwrap().unwrap();
            assert_eq!(decoded, *mv);
        }
    }

    #[test]
    fn test_mask_matches_collapsed_move_count() {
        let engine = NativeEngine::new();
        // Promotion position: 4 promotion variants share one (from, to) bit.
        let state = engine.from_fen("8/4P2k/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let legal = engine.legal_moves(&state);
        let mask = legal_mask(&legal);
        let mut collapsed: Vec<usize> = legal.iter().map(encode_move).collect();
        collapsed.sort_unstable();
        collapsed.dedup();
        assert_eq!(mask.count(), collapsed.len());
    }
}
