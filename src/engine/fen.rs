//! FEN parsing and rendering for the native board.

use super::board::{Board, CastlingRights, Piece};
use super::{BoardSnapshot, Color, PieceKind, Square};
use crate::{ChessRlError, Result};

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

fn engine_err(fen: &str, detail: &str) -> ChessRlError {
    ChessRlError::Engine(format!("malformed FEN '{}': {}", fen, detail))
}

pub fn parse_fen(fen: &str) -> Result<Board> {
    let fields: Vec<&str> = fen.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(engine_err(fen, "expected 6 space-separated fields"));
    }

    let mut board = Board::empty();
    let ranks: Vec<&str> = fields[0].split('/').collect();
    if ranks.len() != 8 {
        return Err(engine_err(fen, "expected 8 ranks"));
    }
    // FEN lists rank 8 first.
    for (row, rank_str) in ranks.iter().enumerate() {
        let rank = 7 - row as u8;
        let mut file = 0u8;
        for c in rank_str.chars() {
            if let Some(skip) = c.to_digit(10) {
                if skip == 0 || skip > 8 {
                    return Err(engine_err(fen, "bad empty-square count"));
                }
                file += skip as u8;
            } else {
                if file >= 8 {
                    return Err(engine_err(fen, "rank overflow"));
                }
                let piece = piece_from_char(c).ok_or_else(|| engine_err(fen, "bad piece character"))?;
                board.squares[Square::new(rank, file).index()] = Some(piece);
                file += 1;
            }
        }
        if file != 8 {
            return Err(engine_err(fen, "rank does not describe 8 files"));
        }
    }

    board.side = match fields[1] {
        "w" => Color::White,
        "b" => Color::Black,
        _ => return Err(engine_err(fen, "side-to-move must be 'w' or 'b'")),
    };

    board.castling = CastlingRights::none();
    if fields[2] != "-" {
        for c in fields[2].chars() {
            let flag = match c {
                'K' => CastlingRights::WHITE_KINGSIDE,
                'Q' => CastlingRights::WHITE_QUEENSIDE,
                'k' => CastlingRights::BLACK_KINGSIDE,
                'q' => CastlingRights::BLACK_QUEENSIDE,
                _ => return Err(engine_err(fen, "bad castling field")),
            };
            board.castling.set(flag);
        }
    }

    board.en_passant = match fields[3] {
        "-" => None,
        s => Some(Square::parse(s).ok_or_else(|| engine_err(fen, "bad en-passant square"))?),
    };

    board.halfmove_clock = fields[4]
        .parse::<u32>()
        .ok()
        .filter(|&n| n <= 999)
        .ok_or_else(|| engine_err(fen, "halfmove clock out of range"))?;
    board.fullmove_number = fields[5]
        .parse::<u32>()
        .ok()
        .filter(|&n| (1..=9999).contains(&n))
        .ok_or_else(|| engine_err(fen, "fullmove number out of range"))?;

    for color in [Color::White, Color::Black] {
        let kings = board
            .squares
            .iter()
            .flatten()
            .filter(|p| p.color == color && p.kind == PieceKind::King)
            .count();
        if kings != 1 {
            return Err(engine_err(fen, "each side needs exactly one king"));
        }
    }

    Ok(board)
}

pub fn format_fen(board: &Board) -> String {
    format_fen_fields(
        |sq| board.piece_at(sq).map(|p| (p.color, p.kind)),
        board.side,
        [
            board.castling.has(CastlingRights::WHITE_KINGSIDE),
            board.castling.has(CastlingRights::WHITE_QUEENSIDE),
            board.castling.has(CastlingRights::BLACK_KINGSIDE),
            board.castling.has(CastlingRights::BLACK_QUEENSIDE),
        ],
        board.en_passant,
        board.halfmove_clock,
        board.fullmove_number,
    )
}

pub fn format_fen_from_snapshot(snapshot: &BoardSnapshot) -> String {
    format_fen_fields(
        |sq| snapshot.pieces[sq.index()],
        snapshot.side_to_move,
        snapshot.castling,
        snapshot.en_passant,
        snapshot.halfmove_clock,
        snapshot.fullmove_number,
    )
}

fn format_fen_fields(
    piece_at: impl Fn(Square) -> Option<(Color, PieceKind)>,
    side: Color,
    castling: [bool; 4],
    en_passant: Option<Square>,
    halfmove_clock: u32,
    fullmove_number: u32,
) -> String {
    let mut out = String::new();
    for rank in (0..8).rev() {
        let mut empty = 0;
        for file in 0..8 {
            match piece_at(Square::new(rank, file)) {
                Some((color, kind)) => {
                    if empty > 0 {
                        out.push(char::from_digit(empty, 10).unwrap_or('8'));
                        empty = 0;
                    }
                    out.push(piece_to_char(color, kind));
                }
                None => empty += 1,
            }
        }
        if empty > 0 {
            out.push(char::from_digit(empty, 10).unwrap_or('8'));
        }
        if rank > 0 {
            out.push('/');
        }
    }

    out.push(' ');
    out.push(match side {
        Color::White => 'w',
        Color::Black => 'b',
    });

    out.push(' ');
    if castling.iter().any(|&c| c) {
        for (flag, c) in castling.iter().zip(['K', 'Q', 'k', 'q']) {
            if *flag {
                out.push(c);
            }
        }
    } else {
        out.push('-');
    }

    out.push(' ');
    match en_passant {
        Some(sq) => out.push_str(&sq.algebraic()),
        None => out.push('-'),
    }

    out.push_str(&format!(" {} {}", halfmove_clock, fullmove_number));
    out
}

fn piece_from_char(c: char) -> Option<Piece> {
    let color = if c.is_ascii_uppercase() {
        Color::White
    } else {
        Color::Black
    };
    let kind = match c.to_ascii_lowercase() {
        'p' => PieceKind::Pawn,
        'n' => PieceKind::Knight,
        'b' => PieceKind::Bishop,
        'r' => PieceKind::Rook,
        'q' => PieceKind::Queen,
        'k' => PieceKind::King,
        _ => return None,
    };
    Some(Piece { color, kind })
}

fn piece_to_char(color: Color, kind: PieceKind) -> char {
    let c = match kind {
        PieceKind::Pawn => 'p',
        PieceKind::Knight => 'n',
        PieceKind::Bishop => 'b',
        PieceKind::Rook => 'r',
        PieceKind::Queen => 'q',
        PieceKind::King => 'k',
    };
    match color {
        Color::White => c.to_ascii_uppercase(),
        Color::Black => c,
    }
}
