//! Fully legal move generation for the native board.
//!
//! Pseudo-legal moves are enumerated square by square in ascending index
//! order, then filtered with make-and-test so pins, discovered checks and
//! en-passant edge cases fall out of a single attack query. Ordering is
//! deterministic for a given position.

use super::board::{
    offset_square, Board, CastlingRights, Piece, BISHOP_DIRS, KING_OFFSETS, KNIGHT_OFFSETS,
    ROOK_DIRS,
};
use super::{ChessMove, Color, PieceKind, Square};

const PROMOTION_ORDER: [PieceKind; 4] = [
    PieceKind::Queen,
    PieceKind::Rook,
    PieceKind::Bishop,
    PieceKind::Knight,
];

pub fn legal_moves(board: &Board) -> Vec<ChessMove> {
    let mover = board.side;
    pseudo_legal_moves(board)
        .into_iter()
        .filter(|&mv| !board.make_move(mv).in_check(mover))
        .collect()
}

pub fn pseudo_legal_moves(board: &Board) -> Vec<ChessMove> {
    let mut moves = Vec::with_capacity(48);
    for index in 0..64 {
        let from = Square::from_index(index);
        let Some(piece) = board.piece_at(from) else {
            continue;
        };
        if piece.color != board.side {
            continue;
        }
        match piece.kind {
            PieceKind::Pawn => pawn_moves(board, from, piece.color, &mut moves),
            PieceKind::Knight => leaper_moves(board, from, &KNIGHT_OFFSETS, &mut moves),
            PieceKind::King => {
                leaper_moves(board, from, &KING_OFFSETS, &mut moves);
                castling_moves(board, from, piece.color, &mut moves);
            }
            PieceKind::Bishop => slider_moves(board, from, &BISHOP_DIRS, &mut moves),
            PieceKind::Rook => slider_moves(board, from, &ROOK_DIRS, &mut moves),
            PieceKind::Queen => {
                slider_moves(board, from, &ROOK_DIRS, &mut moves);
                slider_moves(board, from, &BISHOP_DIRS, &mut moves);
            }
        }
    }
    moves
}

fn push_pawn_move(from: Square, to: Square, color: Color, moves: &mut Vec<ChessMove>) {
    let last_rank = match color {
        Color::White => 7,
        Color::Black => 0,
    };
    if to.rank == last_rank {
        for kind in PROMOTION_ORDER {
            moves.push(ChessMove::promoting(from, to, kind));
        }
    } else {
        moves.push(ChessMove::new(from, to));
    }
}

fn pawn_moves(board: &Board, from: Square, color: Color, moves: &mut Vec<ChessMove>) {
    let (dir, start_rank) = match color {
        Color::White => (1i8, 1),
        Color::Black => (-1i8, 6),
    };
    let fr = from.rank as i8;
    let ff = from.file as i8;

    if let Some(one) = offset_square(fr + dir, ff) {
        if board.piece_at(one).is_none() {
            push_pawn_move(from, one, color, moves);
            if from.rank == start_rank {
                if let Some(two) = offset_square(fr + 2 * dir, ff) {
                    if board.piece_at(two).is_none() {
                        moves.push(ChessMove::new(from, two));
                    }
                }
            }
        }
    }

    for df in [-1i8, 1] {
        let Some(to) = offset_square(fr + dir, ff + df) else {
            continue;
        };
        let captures_piece =
            matches!(board.piece_at(to), Some(target) if target.color != color);
        if captures_piece {
            push_pawn_move(from, to, color, moves);
        } else if Some(to) == board.en_passant {
            moves.push(ChessMove::new(from, to));
        }
    }
}

fn leaper_moves(board: &Board, from: Square, offsets: &[(i8, i8)], moves: &mut Vec<ChessMove>) {
    for &(dr, df) in offsets {
        let Some(to) = offset_square(from.rank as i8 + dr, from.file as i8 + df) else {
            continue;
        };
        match board.piece_at(to) {
            Some(target) if target.color == board.side => {}
            _ => moves.push(ChessMove::new(from, to)),
        }
    }
}

fn slider_moves(board: &Board, from: Square, dirs: &[(i8, i8)], moves: &mut Vec<ChessMove>) {
    for &(dr, df) in dirs {
        let mut r = from.rank as i8 + dr;
        let mut f = from.file as i8 + df;
        while let Some(to) = offset_square(r, f) {
            match board.piece_at(to) {
                None => moves.push(ChessMove::new(from, to)),
                Some(target) => {
                    if target.color != board.side {
                        moves.push(ChessMove::new(from, to));
                    }
                    break;
                }
            }
            r += dr;
            f += df;
        }
    }
}

fn castling_moves(board: &Board, from: Square, color: Color, moves: &mut Vec<ChessMove>) {
    let home_rank = match color {
        Color::White => 0u8,
        Color::Black => 7u8,
    };
    if from != Square::new(home_rank, 4) || board.in_check(color) {
        return;
    }
    let enemy = color.opponent();
    let rook = Piece {
        color,
        kind: PieceKind::Rook,
    };

    let (kingside, queenside) = match color {
        Color::White => (
            CastlingRights::WHITE_KINGSIDE,
            CastlingRights::WHITE_QUEENSIDE,
        ),
        Color::Black => (
            CastlingRights::BLACK_KINGSIDE,
            CastlingRights::BLACK_QUEENSIDE,
        ),
    };

    if board.castling.has(kingside)
        && board.piece_at(Square::new(home_rank, 7)) == Some(rook)
        && board.piece_at(Square::new(home_rank, 5)).is_none()
        && board.piece_at(Square::new(home_rank, 6)).is_none()
        && !board.is_square_attacked(Square::new(home_rank, 5), enemy)
        && !board.is_square_attacked(Square::new(home_rank, 6), enemy)
    {
        moves.push(ChessMove::new(from, Square::new(home_rank, 6)));
    }

    if board.castling.has(queenside)
        && board.piece_at(Square::new(home_rank, 0)) == Some(rook)
        && board.piece_at(Square::new(home_rank, 1)).is_none()
        && board.piece_at(Square::new(home_rank, 2)).is_none()
        && board.piece_at(Square::new(home_rank, 3)).is_none()
        && !board.is_square_attacked(Square::new(home_rank, 3), enemy)
        && !board.is_square_attacked(Square::new(home_rank, 2), enemy)
    {
        moves.push(ChessMove::new(from, Square::new(home_rank, 2)));
    }
}

/// Perft over the raw board, bypassing per-move legality re-derivation in
/// the adapter layer.
pub fn perft(board: &Board, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }
    let mut nodes = 0;
    for mv in legal_moves(board) {
        let next = board.make_move(mv);
        nodes += perft(&next, depth - 1);
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fen::{parse_fen, STARTING_FEN};

    #[test]
    fn test_starting_position_has_twenty_moves() {
        let board = parse_fen(STARTING_FEN).unwrap();
        let moves = legal_moves(&board);
        assert_eq!(moves.len(), 20);
        let rendered: Vec<String> = moves.iter().map(|m| m.algebraic()).collect();
        for expected in ["e2e4", "d2d4", "g1f3", "b1c3", "e2e3", "d2d3"] {
            assert!(rendered.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[test]
    fn test_perft_shallow() {
        let board = parse_fen(STARTING_FEN).unwrap();
        assert_eq!(perft(&board, 1), 20);
        assert_eq!(perft(&board, 2), 400);
        assert_eq!(perft(&board, 3), 8902);
    }

    #[test]
    fn test_kiwipete_perft() {
        // Classic movegen stress position: castling, pins, en passant, promotions.
        let board = parse_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        assert_eq!(perft(&board, 1), 48);
        assert_eq!(perft(&board, 2), 2039);
    }

    #[test]
    fn test_pinned_piece_cannot_move() {
        // Knight on d2 is pinned against the king by the rook on d8.
        let board = parse_fen("3r3k/8/8/8/8/8/3N4/3K4 w - - 0 1").unwrap();
        let moves = legal_moves(&board);
        assert!(moves.iter().all(|m| m.from != Square::parse("d2").unwrap()));
    }

    #[test]
    fn test_promotions_enumerated_queen_first() {
        let board = parse_fen("8/4P2k/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let moves = legal_moves(&board);
        let promos: Vec<ChessMove> = moves
            .into_iter()
            .filter(|m| m.promotion.is_some())
            .collect();
        assert_eq!(promos.len(), 4);
        assert_eq!(promos[0].promotion, Some(PieceKind::Queen));
        assert_eq!(promos[0].algebraic(), "e7e8q");
    }

    #[test]
    fn test_fools_mate_is_mate() {
        let board =
            parse_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3").unwrap();
        assert!(legal_moves(&board).is_empty());
        assert!(board.in_check(Color::White));
    }

    #[test]
    fn test_stalemate_position_has_no_moves() {
        let board = parse_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert!(legal_moves(&board).is_empty());
        assert!(!board.in_check(Color::Black));
    }
}
