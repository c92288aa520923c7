//! End-to-end self-play scenarios over the native engine with scripted
//! agents, covering terminal reward credit and the step-limit boundary.

use rand::rngs::StdRng;
use rand::SeedableRng;

use chess_rl::agents::Agent;
use chess_rl::codec::{encode_move, ActionMask};
use chess_rl::engine::native::NativeEngine;
use chess_rl::engine::{ChessEngine, ChessMove, Outcome, OutcomeReason};
use chess_rl::selfplay::{GameTermination, RewardConfig, SelfPlayDriver};
use chess_rl::Result;

/// Plays a fixed move list, in order.
struct ScriptedAgent {
    moves: Vec<&'static str>,
    next: usize,
}

impl ScriptedAgent {
    fn new(moves: Vec<&'static str>) -> ScriptedAgent {
        ScriptedAgent { moves, next: 0 }
    }
}

impl<E: ChessEngine> Agent<E> for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    fn select_action(
        &mut self,
        _engine: &E,
        _state: &E::State,
        _features: &[f64],
        _mask: &ActionMask,
        _rng: &mut StdRng,
    ) -> Result<usize> {
        let mv = ChessMove::parse(self.moves[self.next]).expect("scripted move parses");
        self.next += 1;
        Ok(encode_move(&mv))
    }
}

#[test]
fn fools_mate_credits_loss_to_white() {
    let engine = NativeEngine::new();
    let rewards = RewardConfig::default();
    let driver = SelfPlayDriver::new(&engine, rewards.clone(), 200);

    let mut white = ScriptedAgent::new(vec!["f2f3", "g2g4"]);
    let mut black = ScriptedAgent::new(vec!["e7e5", "d8h4"]);
    let mut rng = StdRng::seed_from_u64(0);

    let result = driver
        .play_game(&mut white, &mut black, &mut rng, None)
        .unwrap();

    assert_eq!(result.status.outcome, Outcome::BlackWins);
    assert_eq!(result.status.reason, OutcomeReason::Checkmate);
    assert_eq!(result.termination, GameTermination::Natural);
    assert_eq!(result.plies, 4);
    assert_eq!(
        result.final_fen,
        "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3"
    );

    // White's last move (g2g4, index 2) carries the loss reward; black's
    // mating move (d8h4, index 3) carries the win reward. Both are done.
    let white_last = &result.transitions[2];
    assert_eq!(white_last.reward, rewards.loss_reward);
    assert!(white_last.done);

    let black_last = &result.transitions[3];
    assert_eq!(black_last.reward, rewards.win_reward);
    assert!(black_last.done);

    // Natural ending: nothing was hit with the step-limit penalty.
    for transition in &result.transitions {
        assert_ne!(transition.reward, rewards.step_limit_penalty);
    }

    // Earlier moves keep the per-ply shaping reward.
    assert_eq!(result.transitions[0].reward, rewards.step_penalty);
    assert_eq!(result.transitions[1].reward, rewards.step_penalty);
}

#[test]
fn step_limit_of_one_penalizes_single_transition() {
    let engine = NativeEngine::new();
    let rewards = RewardConfig::default();
    let driver = SelfPlayDriver::new(&engine, rewards.clone(), 1);

    let mut white = ScriptedAgent::new(vec!["e2e4"]);
    let mut black = ScriptedAgent::new(vec![]);
    let mut rng = StdRng::seed_from_u64(0);

    let result = driver
        .play_game(&mut white, &mut black, &mut rng, None)
        .unwrap();
    assert_eq!(result.termination, GameTermination::StepLimit);
    assert_eq!(result.plies, 1);
    assert_eq!(result.transitions.len(), 1);
    assert!(result.transitions[0].done);
    assert_eq!(result.transitions[0].reward, rewards.step_limit_penalty);
}

#[test]
fn transitions_expose_masks_for_bootstrap() {
    let engine = NativeEngine::new();
    let driver = SelfPlayDriver::new(&engine, RewardConfig::default(), 200);

    let mut white = ScriptedAgent::new(vec!["f2f3", "g2g4"]);
    let mut black = ScriptedAgent::new(vec!["e7e5", "d8h4"]);
    let mut rng = StdRng::seed_from_u64(0);
    let result = driver
        .play_game(&mut white, &mut black, &mut rng, None)
        .unwrap();

    // The opening transition's mask matches the 20 legal first moves.
    assert_eq!(result.transitions[0].legal_mask.count(), 20);
    // Non-terminal transitions carry a successor mask.
    for transition in &result.transitions[..2] {
        assert!(!transition.done);
        assert!(transition.next_legal_mask.as_ref().unwrap().count() > 0);
    }
    // The mating transition has no legal successor.
    assert!(result.transitions[3].next_legal_mask.is_none());
}
