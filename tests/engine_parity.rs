//! Engine contract battery: both rules backends must agree on legal-move
//! sets, outcomes and node counts.

use chess_rl::codec::{encode_move, legal_mask};
use chess_rl::engine::library::LibraryEngine;
use chess_rl::engine::native::NativeEngine;
use chess_rl::engine::{ChessEngine, ChessMove, Outcome, OutcomeReason};

const PARITY_FENS: &[&str] = &[
    // Starting position
    "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
    // Italian-game position
    "r1bqkbnr/pppp1ppp/2n5/2b5/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 3",
    // Kiwipete: castling, pins, en passant, promotion pressure
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    // En-passant capture available
    "rnbqkbnr/ppp1pppp/8/8/3pP3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 2",
    // Promotion race
    "8/4P2k/8/8/8/8/4p2K/8 w - - 0 1",
    // Queen endgame
    "8/8/4k3/8/8/2Q5/8/4K3 w - - 10 40",
];

fn sorted_moves<E: ChessEngine>(engine: &E, fen: &str) -> Vec<String> {
    let state = engine.from_fen(fen).expect(fen);
    let mut moves: Vec<String> = engine
        .legal_moves(&state)
        .iter()
        .map(|m| m.algebraic())
        .collect();
    moves.sort();
    moves
}

#[test]
fn adapters_agree_on_legal_move_sets() {
    let native = NativeEngine::new();
    let library = LibraryEngine::new();
    for fen in PARITY_FENS {
        assert_eq!(
            sorted_moves(&native, fen),
            sorted_moves(&library, fen),
            "move set mismatch for {}",
            fen
        );
    }
}

#[test]
fn adapters_agree_on_terminal_outcomes() {
    let native = NativeEngine::new();
    let library = LibraryEngine::new();
    let cases = [
        (
            "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3",
            Outcome::BlackWins,
            OutcomeReason::Checkmate,
        ),
        (
            "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1",
            Outcome::Draw,
            OutcomeReason::Stalemate,
        ),
        (
            "8/8/8/4k3/8/5N2/8/4K3 w - - 0 1",
            Outcome::Draw,
            OutcomeReason::InsufficientMaterial,
        ),
    ];
    for (fen, outcome, reason) in cases {
        for (name, status) in [
            ("native", native.outcome(&native.from_fen(fen).unwrap())),
            ("library", library.outcome(&library.from_fen(fen).unwrap())),
        ] {
            assert_eq!(status.outcome, outcome, "{} outcome for {}", name, fen);
            assert_eq!(status.reason, reason, "{} reason for {}", name, fen);
        }
    }
}

#[test]
fn adapters_agree_on_perft() {
    let native = NativeEngine::new();
    let library = LibraryEngine::new();
    let start_native = native.initial_state();
    let start_library = library.initial_state();
    for depth in 1..=3 {
        assert_eq!(
            native.perft(&start_native, depth),
            library.perft(&start_library, depth),
            "perft({}) mismatch",
            depth
        );
    }
    assert_eq!(native.perft(&start_native, 2), 400);
    assert_eq!(native.perft(&start_native, 3), 8902);
}

#[test]
fn starting_position_enumeration_scenario() {
    for moves in [
        sorted_moves(&NativeEngine::new(), PARITY_FENS[0]),
        sorted_moves(&LibraryEngine::new(), PARITY_FENS[0]),
    ] {
        assert_eq!(moves.len(), 20);
        for expected in ["e2e4", "d2d4", "g1f3", "b1c3", "e2e3", "d2d3"] {
            assert!(moves.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    let e2e4 = ChessMove::parse("e2e4").unwrap();
    assert_eq!(encode_move(&e2e4), 796);

    let engine = NativeEngine::new();
    let mask = legal_mask(&engine.legal_moves(&engine.initial_state()));
    assert_eq!(mask.count(), 20);
    assert!(mask.get(796));
    assert!(!mask.get(56));
}

#[test]
fn fen_roundtrip_through_random_play() {
    use rand::prelude::IndexedRandom;
    use rand::SeedableRng;
    let mut rng = rand::rngs::StdRng::seed_from_u64(77);

    let native = NativeEngine::new();
    let library = LibraryEngine::new();
    let mut native_state = native.initial_state();
    let mut library_state = library.initial_state();

    for _ in 0..60 {
        if native.is_terminal(&native_state) {
            break;
        }
        let mut moves = native.legal_moves(&native_state);
        moves.sort_by_key(|m| m.algebraic());
        let mv = *moves.choose(&mut rng).unwrap();

        native_state = native.apply_move(&native_state, mv).unwrap();
        library_state = library.apply_move(&library_state, mv).unwrap();

        // FEN round-trip is the identity on every reached position.
        let native_fen = native.to_fen(&native_state);
        let reparsed = native.from_fen(&native_fen).unwrap();
        assert_eq!(native.to_fen(&reparsed), native_fen);

        // Both adapters describe the same position.
        assert_eq!(native_fen, library.to_fen(&library_state));
    }
}
