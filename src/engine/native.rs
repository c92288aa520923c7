//! Native chess adapter built on the mailbox board.

use super::board::Board;
use super::fen::{format_fen, parse_fen, STARTING_FEN};
use super::movegen;
use super::{
    insufficient_material, BoardSnapshot, ChessEngine, ChessMove, Color, GameStatus, Outcome,
    OutcomeReason, Square,
};
use crate::{ChessRlError, Result};

/// Immutable position: the board plus the position keys of the current
/// irreversible-move era, newest last. The key history is what makes
/// threefold-repetition detection possible without replaying the game.
#[derive(Debug, Clone)]
pub struct Position {
    board: Board,
    repetition_keys: Vec<u64>,
}

impl Position {
    fn from_board(board: Board) -> Position {
        let key = board.position_key();
        Position {
            board,
            repetition_keys: vec![key],
        }
    }

    pub(crate) fn board(&self) -> &Board {
        &self.board
    }

    fn repetition_count(&self) -> usize {
        let current = self.board.position_key();
        self.repetition_keys
            .iter()
            .filter(|&&k| k == current)
            .count()
    }
}

/// The in-tree rules backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> NativeEngine {
        NativeEngine
    }
}

impl ChessEngine for NativeEngine {
    type State = Position;

    fn initial_state(&self) -> Position {
        let board = parse_fen(STARTING_FEN).expect("starting FEN is well-formed");
        Position::from_board(board)
    }

    fn from_fen(&self, fen: &str) -> Result<Position> {
        Ok(Position::from_board(parse_fen(fen)?))
    }

    fn to_fen(&self, state: &Position) -> String {
        format_fen(&state.board)
    }

    fn side_to_move(&self, state: &Position) -> Color {
        state.board.side
    }

    fn legal_moves(&self, state: &Position) -> Vec<ChessMove> {
        movegen::legal_moves(&state.board)
    }

    fn apply_move(&self, state: &Position, mv: ChessMove) -> Result<Position> {
        if !movegen::legal_moves(&state.board).contains(&mv) {
            return Err(ChessRlError::Engine(format!(
                "illegal move {} in position {}",
                mv.algebraic(),
                format_fen(&state.board)
            )));
        }
        let next_board = state.board.make_move(mv);
        let key = next_board.position_key();
        let mut repetition_keys = if next_board.halfmove_clock == 0 {
            Vec::with_capacity(8)
        } else {
            state.repetition_keys.clone()
        };
        repetition_keys.push(key);
        Ok(Position {
            board: next_board,
            repetition_keys,
        })
    }

    fn outcome(&self, state: &Position) -> GameStatus {
        let board = &state.board;
        if movegen::legal_moves(board).is_empty() {
            return if board.in_check(board.side) {
                GameStatus {
                    outcome: match board.side {
                        Color::White => Outcome::BlackWins,
                        Color::Black => Outcome::WhiteWins,
                    },
                    reason: OutcomeReason::Checkmate,
                }
            } else {
                GameStatus {
                    outcome: Outcome::Draw,
                    reason: OutcomeReason::Stalemate,
                }
            };
        }
        if insufficient_material(&self.snapshot(state)) {
            return GameStatus {
                outcome: Outcome::Draw,
                reason: OutcomeReason::InsufficientMaterial,
            };
        }
        if board.halfmove_clock >= 100 {
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

    fn snapshot(&self, state: &Position) -> BoardSnapshot {
        let board = &state.board;
        let mut pieces = [None; 64];
        for index in 0..64 {
            pieces[index] = board
                .piece_at(Square::from_index(index))
                .map(|p| (p.color, p.kind));
        }
        BoardSnapshot {
            pieces,
            side_to_move: board.side,
            castling: [
                board
                    .castling
                    .has(super::board::CastlingRights::WHITE_KINGSIDE),
                board
                    .castling
                    .has(super::board::CastlingRights::WHITE_QUEENSIDE),
                board
                    .castling
                    .has(super::board::CastlingRights::BLACK_KINGSIDE),
                board
                    .castling
                    .has(super::board::CastlingRights::BLACK_QUEENSIDE),
            ],
            en_passant: board.en_passant,
            halfmove_clock: board.halfmove_clock,
            fullmove_number: board.fullmove_number,
        }
    }

    fn perft(&self, state: &Position, depth: u32) -> u64 {
        movegen::perft(&state.board, depth)
    }
}
