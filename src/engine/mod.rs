//! Chess rules adapters.
//!
//! The training core never implements chess rules inline; it talks to a
//! [`ChessEngine`] adapter. Two interchangeable backends exist: the native
//! board in this module tree and a thin wrapper over the `chess` crate used
//! as a conformance oracle.

pub mod board;
pub mod fen;
pub mod library;
pub mod movegen;
pub mod native;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Side to move / piece ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opponent(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

/// A board square addressed as (rank, file), both in 0..8.
/// Rank 0 is white's first rank; index() is row-major `rank*8 + file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square {
    pub rank: u8,
    pub file: u8,
}

impl Square {
    pub fn new(rank: u8, file: u8) -> Square {
        debug_assert!(rank < 8 && file < 8);
        Square { rank, file }
    }

    pub fn from_index(index: usize) -> Square {
        debug_assert!(index < 64);
        Square {
            rank: (index / 8) as u8,
            file: (index % 8) as u8,
        }
    }

    pub fn index(self) -> usize {
        self.rank as usize * 8 + self.file as usize
    }

    /// Algebraic name, e.g. `e4`.
    pub fn algebraic(self) -> String {
        format!(
            "{}{}",
            (b'a' + self.file) as char,
            (b'1' + self.rank) as char
        )
    }

    pub fn parse(s: &str) -> Option<Square> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return None;
        }
        let file = bytes[0].checked_sub(b'a')?;
        let rank = bytes[1].checked_sub(b'1')?;
        if file < 8 && rank < 8 {
            Some(Square { rank, file })
        } else {
            None
        }
    }
}

/// A move as (from, to, optional promotion piece).
///
/// Algebraic rendering is always 4 characters, or 5 with a promotion letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChessMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PieceKind>,
}

impl ChessMove {
    pub fn new(from: Square, to: Square) -> ChessMove {
        ChessMove {
            from,
            to,
            promotion: None,
        }
    }

    pub fn promoting(from: Square, to: Square, kind: PieceKind) -> ChessMove {
        ChessMove {
            from,
            to,
            promotion: Some(kind),
        }
    }

    pub fn algebraic(&self) -> String {
        let mut s = format!("{}{}", self.from.algebraic(), self.to.algebraic());
        if let Some(kind) = self.promotion {
            s.push(match kind {
                PieceKind::Queen => 'q',
                PieceKind::Rook => 'r',
                PieceKind::Bishop => 'b',
                PieceKind::Knight => 'n',
                _ => '?',
            });
        }
        s
    }

    pub fn parse(s: &str) -> Option<ChessMove> {
        if !s.is_ascii() || (s.len() != 4 && s.len() != 5) {
            return None;
        }
        let from = Square::parse(&s[0..2])?;
        let to = Square::parse(&s[2..4])?;
        let promotion = match s.as_bytes().get(4) {
            None => None,
            Some(b'q') => Some(PieceKind::Queen),
            Some(b'r') => Some(PieceKind::Rook),
            Some(b'b') => Some(PieceKind::Bishop),
            Some(b'n') => Some(PieceKind::Knight),
            Some(_) => return None,
        };
        Some(ChessMove {
            from,
            to,
            promotion,
        })
    }
}

impl std::fmt::Display for ChessMove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.algebraic())
    }
}

/// Game result from white's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    WhiteWins,
    BlackWins,
    Draw,
    Ongoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeReason {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    FiftyMoveRule,
    ThreefoldRepetition,
    Ongoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStatus {
    pub outcome: Outcome,
    pub reason: OutcomeReason,
}

impl GameStatus {
    pub const ONGOING: GameStatus = GameStatus {
        outcome: Outcome::Ongoing,
        reason: OutcomeReason::Ongoing,
    };

    pub fn is_terminal(&self) -> bool {
        self.outcome != Outcome::Ongoing
    }
}

/// Backend-neutral description of a position, consumed by the feature codec
/// and by evaluation heuristics. Castling order is WK, WQ, BK, BQ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub pieces: [Option<(Color, PieceKind)>; 64],
    pub side_to_move: Color,
    pub castling: [bool; 4],
    pub en_passant: Option<Square>,
    pub halfmove_clock: u32,
    pub fullmove_number: u32,
}

impl BoardSnapshot {
    /// Material balance in pawn units, white minus black. Kings excluded.
    pub fn material_balance(&self) -> i32 {
        let mut balance = 0;
        for piece in self.pieces.iter().flatten() {
            let value = match piece.1 {
                PieceKind::Pawn => 1,
                PieceKind::Knight | PieceKind::Bishop => 3,
                PieceKind::Rook => 5,
                PieceKind::Queen => 9,
                PieceKind::King => 0,
            };
            match piece.0 {
                Color::White => balance += value,
                Color::Black => balance -= value,
            }
        }
        balance
    }
}

/// Dead-position test shared by both adapters so they classify draws
/// identically: bare kings, king + single minor, or kings with bishops that
/// all stand on squares of one color.
pub fn insufficient_material(snapshot: &BoardSnapshot) -> bool {
    let mut minors = 0;
    let mut knights = 0;
    let mut bishop_square_colors = [false; 2];
    for (index, piece) in snapshot.pieces.iter().enumerate() {
        let Some((_, kind)) = piece else { continue };
        match kind {
            PieceKind::King => {}
            PieceKind::Knight => {
                minors += 1;
                knights += 1;
            }
            PieceKind::Bishop => {
                minors += 1;
                let sq = Square::from_index(index);
                bishop_square_colors[((sq.rank + sq.file) % 2) as usize] = true;
            }
            // Any pawn, rook or queen is mating material.
            _ => return false,
        }
    }
    if minors <= 1 {
        return true;
    }
    // Two or more minors: dead only if they are all same-colored bishops.
    knights == 0 && !(bishop_square_colors[0] && bishop_square_colors[1])
}

/// Pluggable chess rules backend.
///
/// States are immutable values: `apply_move` returns a fresh state and never
/// mutates its input. `legal_moves` ordering must be deterministic for a
/// given state.
pub trait ChessEngine {
    type State: Clone + Send + Sync;

    fn initial_state(&self) -> Self::State;

    /// Parse a FEN string. Malformed input (bad piece characters, missing
    /// fields, out-of-range counters, missing kings) is an engine error.
    fn from_fen(&self, fen: &str) -> Result<Self::State>;

    fn to_fen(&self, state: &Self::State) -> String;

    fn side_to_move(&self, state: &Self::State) -> Color;

    fn legal_moves(&self, state: &Self::State) -> Vec<ChessMove>;

    /// Apply a move that must be a member of `legal_moves(state)`.
    fn apply_move(&self, state: &Self::State, mv: ChessMove) -> Result<Self::State>;

    fn outcome(&self, state: &Self::State) -> GameStatus;

    fn is_terminal(&self, state: &Self::State) -> bool {
        self.outcome(state).is_terminal()
    }

    fn snapshot(&self, state: &Self::State) -> BoardSnapshot;

    /// Node count at fixed depth, for move-generator conformance tests.
    fn perft(&self, state: &Self::State, depth: u32) -> u64 {
        if depth == 0 {
            return 1;
        }
        let mut nodes = 0;
        for mv in self.legal_moves(state) {
            if let Ok(next) = self.apply_move(state, mv) {
                nodes += self.perft(&next, depth - 1);
            }
        }
        nodes
    }
}
