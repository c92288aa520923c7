//! Reference rules backend wrapping the `chess` crate.
//!
//! The crate supplies move generation, check/mate detection and position
//! hashing; the 50-move clock, the fullmove counter and the en-passant
//! target for FEN output are tracked here because the upstream board does
//! not carry them. Used as the conformance oracle for the native adapter.

use std::str::FromStr;

use chess::{BoardStatus, CastleRights, MoveGen};

use super::fen::{format_fen_from_snapshot, parse_fen};
use super::{
    insufficient_material, BoardSnapshot, ChessEngine, ChessMove, Color, GameStatus, Outcome,
    OutcomeReason, PieceKind, Square,
};
use crate::{ChessRlError, Result};

#[derive(Debug, Clone)]
pub struct LibPosition {
    board: chess::Board,
    en_passant: Option<Square>,
    halfmove_clock: u32,
    fullmove_number: u32,
    repetition_keys: Vec<u64>,
}

impl LibPosition {
    fn repetition_count(&self) -> usize {
        let current = self.board.get_hash();
        self.repetition_keys
            .iter()
            .filter(|&&k| k == current)
            .count()
    }
}

/// Adapter over the `chess` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibraryEngine;

impl LibraryEngine {
    pub fn new() -> LibraryEngine {
        LibraryEngine
    }
}

impl ChessEngine for LibraryEngine {
    type State = LibPosition;

    fn initial_state(&self) -> LibPosition {
        let board = chess::Board::default();
        let hash = board.get_hash();
        LibPosition {
            board,
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
            repetition_keys: vec![hash],
        }
    }

    fn from_fen(&self, fen: &str) -> Result<LibPosition> {
        // Run the strict field validation first so both adapters reject the
        // same malformed inputs with the same error kind.
        let parsed = parse_fen(fen)?;
        let board = chess::Board::from_str(fen)
            .map_err(|e| ChessRlError::Engine(format!("malformed FEN '{}': {}", fen, e)))?;
        let hash = board.get_hash();
        Ok(LibPosition {
            board,
            en_passant: parsed.en_passant,
            halfmove_clock: parsed.halfmove_clock,
            fullmove_number: parsed.fullmove_number,
            repetition_keys: vec![hash],
        })
    }

    fn to_fen(&self, state: &LibPosition) -> String {
        format_fen_from_snapshot(&self.snapshot(state))
    }

    fn side_to_move(&self, state: &LibPosition) -> Color {
        from_lib_color(state.board.side_to_move())
    }

    fn legal_moves(&self, state: &LibPosition) -> Vec<ChessMove> {
        MoveGen::new_legal(&state.board).map(from_lib_move).collect()
    }

    fn apply_move(&self, state: &LibPosition, mv: ChessMove) -> Result<LibPosition> {
        let lib_move = to_lib_move(mv);
        if !state.board.legal(lib_move) {
            return Err(ChessRlError::Engine(format!(
                "illegal move {} in position {}",
                mv.algebraic(),
                self.to_fen(state)
            )));
        }

        let moving_pawn =
            state.board.piece_on(to_lib_square(mv.from)) == Some(chess::Piece::Pawn);
        let is_capture = state.board.piece_on(to_lib_square(mv.to)).is_some()
            || (moving_pawn && mv.from.file != mv.to.file);
        let mover = state.board.side_to_move();

        let next_board = state.board.make_move_new(lib_move);
        let halfmove_clock = if moving_pawn || is_capture {
            0
        } else {
            state.halfmove_clock + 1
        };
        let fullmove_number = if mover == chess::Color::Black {
            state.fullmove_number + 1
        } else {
            state.fullmove_number
        };
        let en_passant = if moving_pawn && mv.from.rank.abs_diff(mv.to.rank) == 2 {
            Some(Square::new((mv.from.rank + mv.to.rank) / 2, mv.from.file))
        } else {
            None
        };

        let hash = next_board.get_hash();
        let mut repetition_keys = if halfmove_clock == 0 {
            Vec::with_capacity(8)
        } else {
            state.repetition_keys.clone()
        };
        repetition_keys.push(hash);

        Ok(LibPosition {
            board: next_board,
            en_passant,
            halfmove_clock,
            fullmove_number,
            repetition_keys,
        })
    }

    fn outcome(&self, state: &LibPosition) -> GameStatus {
        match state.board.status() {
            BoardStatus::Checkmate => {
                return GameStatus {
                    outcome: match state.board.side_to_move() {
                        chess::Color::White => Outcome::BlackWins,
                        chess::Color::Black => Outcome::WhiteWins,
                    },
                    reason: OutcomeReason::Checkmate,
                }
            }
            BoardStatus::Stalemate => {
                return GameStatus {
                    outcome: Outcome::Draw,
                    reason: OutcomeReason::Stalemate,
                }
            }
            BoardStatus::Ongoing => {}
        }
        if insufficient_material(&self.snapshot(state)) {
            return GameStatus {
                outcome: Outcome::Draw,
                reason: OutcomeReason::InsufficientMaterial,
            };
        }
        if state.halfmove_clock >= 100 {
            return GameStatus {
                outcome: Outcome::Draw,
                reason: OutcomeReason::FiftyMoveRule,
            };
        }
        if state.repetition_count() >= 3 {
            return GameStatus {
                outcome: Outcome::Draw,
                reason: OutcomeReason::ThreefoldRepetition,
            };
        }
        GameStatus::ONGOING
    }

    fn snapshot(&self, state: &LibPosition) -> BoardSnapshot {
        let mut pieces = [None; 64];
        for index in 0..64 {
            let sq = to_lib_square(Square::from_index(index));
            if let (Some(piece), Some(color)) =
                (state.board.piece_on(sq), state.board.color_on(sq))
            {
                pieces[index] = Some((from_lib_color(color), from_lib_piece(piece)));
            }
        }
        let white = state.board.castle_rights(chess::Color::White);
        let black = state.board.castle_rights(chess::Color::Black);
        BoardSnapshot {
            pieces,
            side_to_move: from_lib_color(state.board.side_to_move()),
            castling: [
                matches!(white, CastleRights::KingSide | CastleRights::Both),
                matches!(white, CastleRights::QueenSide | CastleRights::Both),
                matches!(black, CastleRights::KingSide | CastleRights::Both),
                matches!(black, CastleRights::QueenSide | CastleRights::Both),
            ],
            en_passant: state.en_passant,
            halfmove_clock: state.halfmove_clock,
            fullmove_number: state.fullmove_number,
        }
    }
}

fn to_lib_square(sq: Square) -> chess::Square {
    chess::Square::make_square(
        chess::Rank::from_index(sq.rank as usize),
        chess::File::from_index(sq.file as usize),
    )
}

fn from_lib_square(sq: chess::Square) -> Square {
    Square::new(sq.get_rank().to_index() as u8, sq.get_file().to_index() as u8)
}

fn from_lib_color(color: chess::Color) -> Color {
    match color {
        chess::Color::White => Color::White,
        chess::Color::Black => Color::Black,
    }
}

fn from_lib_piece(piece: chess::Piece) -> PieceKind {
    match piece {
        chess::Piece::Pawn => PieceKind::Pawn,
        chess::Piece::Knight => PieceKind::Knight,
        chess::Piece::Bishop => PieceKind::Bishop,
        chess::Piece::Rook => PieceKind::Rook,
        chess::Piece::Queen => PieceKind::Queen,
        chess::Piece::King => PieceKind::King,
    }
}

fn to_lib_piece(kind: PieceKind) -> chess::Piece {
    match kind {
        PieceKind::Pawn => chess::Piece::Pawn,
        PieceKind::Knight => chess::Piece::Knight,
        PieceKind::Bishop => chess::Piece::Bishop,
        PieceKind::Rook => chess::Piece::Rook,
        PieceKind::Queen => chess::Piece::Queen,
        PieceKind::King => chess::Piece::King,
    }
}

fn to_lib_move(mv: ChessMove) -> chess::ChessMove {
    chess::ChessMove::new(
        to_lib_square(mv.from),
        to_lib_square(mv.to),
        mv.promotion.map(to_lib_piece),
    )
}

fn from_lib_move(mv: chess::ChessMove) -> ChessMove {
    ChessMove {
        from: from_lib_square(mv.get_source()),
        to: from_lib_square(mv.get_dest()),
        promotion: mv.get_promotion().map(from_lib_piece),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starting_moves_match_native_count() {
        let engine = LibraryEngine::new();
        let state = engine.initial_state();
        assert_eq!(engine.legal_moves(&state).len(), 20);
    }

    #[test]
    fn test_fen_roundtrip_after_moves() {
        let engine = LibraryEngine::new();
        let mut state = engine.initial_state();
        for mv in ["e2e4", "e7e5", "g1f3"] {
            state = engine
                .apply_move(&state, ChessMove::parse(mv).unwrap())
                .unwrap();
        }
        let fen = engine.to_fen(&state);
        assert_eq!(
            fen,
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2"
        );
        let reloaded = engine.from_fen(&fen).unwrap();
        assert_eq!(engine.to_fen(&reloaded), fen);
    }

    #[test]
    fn test_fools_mate_outcome() {
        let engine = LibraryEngine::new();
        let state = engine
            .from_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3")
            .unwrap();
        let status = engine.outcome(&state);
        assert_eq!(status.outcome, Outcome::BlackWins);
        assert_eq!(status.reason, OutcomeReason::Checkmate);
    }
}
