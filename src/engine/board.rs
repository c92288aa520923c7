//! Native mailbox board: piece placement, move application, attack maps and
//! position keys. Move *generation* lives in [`super::movegen`].

use std::sync::OnceLock;

use super::{ChessMove, Color, PieceKind, Square};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub color: Color,
    pub kind: PieceKind,
}

/// Castling availability flags, FEN order: WK, WQ, BK, BQ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastlingRights(pub u8);

impl CastlingRights {
    pub const WHITE_KINGSIDE: u8 = 1;
    pub const WHITE_QUEENSIDE: u8 = 2;
    pub const BLACK_KINGSIDE: u8 = 4;
    pub const BLACK_QUEENSIDE: u8 = 8;

    pub fn none() -> CastlingRights {
        CastlingRights(0)
    }

    pub fn all() -> CastlingRights {
        CastlingRights(0b1111)
    }

    pub fn has(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn clear(&mut self, flag: u8) {
        self.0 &= !flag;
    }

    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }
}

/// A full chess position minus the repetition history, which the adapter
/// layer tracks per game line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    pub squares: [Option<Piece>; 64],
    pub side: Color,
    pub castling: CastlingRights,
    /// En-passant target square (the square passed over by a double push).
    pub en_passant: Option<Square>,
    pub halfmove_clock: u32,
    pub fullmove_number: u32,
}

impl Board {
    pub fn empty() -> Board {
        Board {
            squares: [None; 64],
            side: Color::White,
            castling: CastlingRights::none(),
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.squares[sq.index()]
    }

    pub fn king_square(&self, color: Color) -> Option<Square> {
        self.squares.iter().position(|p| {
            matches!(p, Some(piece) if piece.color == color && piece.kind == PieceKind::King)
        }).map(Square::from_index)
    }

    pub fn in_check(&self, color: Color) -> bool {
        match self.king_square(color) {
            Some(king) => self.is_square_attacked(king, color.opponent()),
            None => false,
        }
    }

    /// True when any piece of `by` attacks `target`. Pin-agnostic.
    pub fn is_square_attacked(&self, target: Square, by: Color) -> bool {
        let tr = target.rank as i8;
        let tf = target.file as i8;

        // Pawns attack diagonally toward the enemy side.
        let pawn_rank = match by {
            Color::White => tr - 1,
            Color::Black => tr + 1,
        };
        for df in [-1i8, 1] {
            if let Some(sq) = offset_square(pawn_rank, tf + df) {
                if self.piece_at(sq)
                    == Some(Piece {
                        color: by,
                        kind: PieceKind::Pawn,
                    })
                {
                    return true;
                }
            }
        }

        for (dr, df) in KNIGHT_OFFSETS {
            if let Some(sq) = offset_square(tr + dr, tf + df) {
                if self.piece_at(sq)
                    == Some(Piece {
                        color: by,
                        kind: PieceKind::Knight,
                    })
                {
                    return true;
                }
            }
        }

        for (dr, df) in KING_OFFSETS {
            if let Some(sq) = offset_square(tr + dr, tf + df) {
                if self.piece_at(sq)
                    == Some(Piece {
                        color: by,
                        kind: PieceKind::King,
                    })
                {
                    return true;
                }
            }
        }

        for (dirs, straight) in [(ROOK_DIRS, true), (BISHOP_DIRS, false)] {
            for (dr, df) in dirs {
                let mut r = tr + dr;
                let mut f = tf + df;
                while let Some(sq) = offset_square(r, f) {
                    if let Some(piece) = self.piece_at(sq) {
                        if piece.color == by {
                            let slides = if straight {
                                piece.kind == PieceKind::Rook || piece.kind == PieceKind::Queen
                            } else {
                                piece.kind == PieceKind::Bishop || piece.kind == PieceKind::Queen
                            };
                            if slides {
                                return true;
                            }
                        }
                        break;
                    }
                    r += dr;
                    f += df;
                }
            }
        }

        false
    }

    /// Apply a pseudo-legal move and return the successor board. The caller
    /// is responsible for rejecting moves that leave the mover in check.
    pub fn make_move(&self, mv: ChessMove) -> Board {
        let mut next = self.clone();
        let mover = self.side;
        let Some(piece) = next.squares[mv.from.index()].take() else {
            return next;
        };

        let mut is_capture = next.squares[mv.to.index()].is_some();

        // En-passant capture: pawn moves diagonally onto the empty target.
        if piece.kind == PieceKind::Pawn && Some(mv.to) == self.en_passant && !is_capture {
            let captured = Square::new(mv.from.rank, mv.to.file);
            next.squares[captured.index()] = None;
            is_capture = true;
        }

        // Castling: king travels two files, the rook follows.
        if piece.kind == PieceKind::King && mv.from.file.abs_diff(mv.to.file) == 2 {
            let rank = mv.from.rank;
            let (rook_from, rook_to) = if mv.to.file == 6 {
                (Square::new(rank, 7), Square::new(rank, 5))
            } else {
                (Square::new(rank, 0), Square::new(rank, 3))
            };
            let rook = next.squares[rook_from.index()].take();
            next.squares[rook_to.index()] = rook;
        }

        let placed = match mv.promotion {
            Some(kind) => Piece {
                color: piece.color,
                kind,
            },
            None => piece,
        };
        next.squares[mv.to.index()] = Some(placed);

        next.en_passant = if piece.kind == PieceKind::Pawn && mv.from.rank.abs_diff(mv.to.rank) == 2
        {
            Some(Square::new((mv.from.rank + mv.to.rank) / 2, mv.from.file))
        } else {
            None
        };

        next.update_castling_rights(mv);

        if piece.kind == PieceKind::Pawn || is_capture {
            next.halfmove_clock = 0;
        } else {
            next.halfmove_clock += 1;
        }
        if mover == Color::Black {
            next.fullmove_number += 1;
        }
        next.side = mover.opponent();
        next
    }

    fn update_castling_rights(&mut self, mv: ChessMove) {
        for sq in [mv.from, mv.to] {
            match (sq.rank, sq.file) {
                (0, 4) => {
                    self.castling.clear(CastlingRights::WHITE_KINGSIDE);
                    self.castling.clear(CastlingRights::WHITE_QUEENSIDE);
                }
                (7, 4) => {
                    self.castling.clear(CastlingRights::BLACK_KINGSIDE);
                    self.castling.clear(CastlingRights::BLACK_QUEENSIDE);
                }
                (0, 0) => self.castling.clear(CastlingRights::WHITE_QUEENSIDE),
                (0, 7) => self.castling.clear(CastlingRights::WHITE_KINGSIDE),
                (7, 0) => self.castling.clear(CastlingRights::BLACK_QUEENSIDE),
                (7, 7) => self.castling.clear(CastlingRights::BLACK_KINGSIDE),
                _ => {}
            }
        }
    }

    /// Position key for repetition detection. The en-passant file is hashed
    /// only when a capture is actually possible, so transpositions that
    /// differ only in a dead en-passant right compare equal.
    pub fn position_key(&self) -> u64 {
        let z = zobrist();
        let mut key = 0u64;
        for (index, piece) in self.squares.iter().enumerate() {
            if let Some(piece) = piece {
                key ^= z.pieces[piece_table_index(*piece)][index];
            }
        }
        if self.side == Color::Black {
            key ^= z.side;
        }
        key ^= z.castling[self.castling.0 as usize];
        if let Some(ep) = self.en_passant {
            if self.en_passant_capture_possible(ep) {
                key ^= z.ep_file[ep.file as usize];
            }
        }
        key
    }

    fn en_passant_capture_possible(&self, target: Square) -> bool {
        let capture_rank = match self.side {
            Color::White => target.rank as i8 - 1,
            Color::Black => target.rank as i8 + 1,
        };
        for df in [-1i8, 1] {
            if let Some(sq) = offset_square(capture_rank, target.file as i8 + df) {
                if self.piece_at(sq)
                    == Some(Piece {
                        color: self.side,
                        kind: PieceKind::Pawn,
                    })
                {
                    return true;
                }
            }
        }
        false
    }
}

pub const KNIGHT_OFFSETS: [(i8, i8); 8] = [
    (-2, -1),
    (-2, 1),
    (-1, -2),
    (-1, 2),
    (1, -2),
    (1, 2),
    (2, -1),
    (2, 1),
];

pub const KING_OFFSETS: [(i8, i8); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

pub const ROOK_DIRS: [(i8, i8); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
pub const BISHOP_DIRS: [(i8, i8); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];

pub fn offset_square(rank: i8, file: i8) -> Option<Square> {
    if (0..8).contains(&rank) && (0..8).contains(&file) {
        Some(Square::new(rank as u8, file as u8))
    } else {
        None
    }
}

fn piece_table_index(piece: Piece) -> usize {
    let kind = match piece.kind {
        PieceKind::Pawn => 0,
        PieceKind::Knight => 1,
        PieceKind::Bishop => 2,
        PieceKind::Rook => 3,
        PieceKind::Queen => 4,
        PieceKind::King => 5,
    };
    match piece.color {
        Color::White => kind,
        Color::Black => kind + 6,
    }
}

struct ZobristTable {
    pieces: [[u64; 64]; 12],
    side: u64,
    castling: [u64; 16],
    ep_file: [u64; 8],
}

fn zobrist() -> &'static ZobristTable {
    static TABLE: OnceLock<ZobristTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        let mut next = || {
            state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
            let mut z = state;
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^ (z >> 31)
        };
        let mut pieces = [[0u64; 64]; 12];
        for table in pieces.iter_mut() {
            for entry in table.iter_mut() {
                *entry = next();
            }
        }
        let side = next();
        let mut castling = [0u64; 16];
        for entry in castling.iter_mut() {
            *entry = next();
        }
        let mut ep_file = [0u64; 8];
        for entry in ep_file.iter_mut() {
            *entry = next();
        }
        ZobristTable {
            pieces,
            side,
            castling,
            ep_file,
        }
    })
}
