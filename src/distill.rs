//! Teacher distillation dataset collector.
//!
//! Plays self-play games where a minimax teacher annotates every position
//! with its best move, a softmax policy over the top-K root moves and a
//! normalized value, then streams the records as NDJSON. Moves are sampled
//! from the teacher policy so the dataset covers more than one line.
//! Positions repeating beyond a cap are skipped to keep the data balanced.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::agents::minimax::{normalized_value, search_root};
use crate::codec::encode_move;
use crate::engine::{ChessEngine, Color};
use crate::{ChessRlError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeacherConfig {
    /// Games to play. Default: 100
    pub games: usize,

    /// Minimax depth of the teacher. Default: 2
    pub depth: u32,

    /// Root moves kept in the softmax policy. Default: 5
    pub top_k: usize,

    /// Softmax temperature over centipawn scores. Default: 1.0
    pub temperature: f64,

    /// Cap on records per distinct FEN. Default: 3
    pub max_repeats_per_position: u32,

    /// Ply cap per game. Default: 200
    pub max_plies: u32,

    /// Default: 42
    pub seed: u64,
}

impl Default for TeacherConfig {
    fn default() -> Self {
        Self {
            games: 100,
            depth: 2,
            top_k: 5,
            temperature: 1.0,
            max_repeats_per_position: 3,
            max_plies: 200,
            seed: 42,
        }
    }
}

/// One NDJSON record: the supervised (state -> policy, value) sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeacherRecord {
    pub fen: String,
    pub side: String,
    pub best_action: usize,
    pub top_k: Vec<usize>,
    /// Action index (stringified) to probability.
    pub teacher_policy: HashMap<String, f64>,
    pub value: f64,
    pub valid_actions: Vec<usize>,
    #[serde(rename = "move")]
    pub chosen_move: String,
    pub game_id: usize,
    pub ply: u32,
    pub ts: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectStats {
    pub games: usize,
    pub records: usize,
    pub skipped_repeats: usize,
}

/// Round to six significant digits so the JSON floats stay compact and
/// locale-stable.
fn round_sig(value: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return 0.0;
    }
    let magnitude = value.abs().log10().floor();
    let factor = 10f64.powf(5.0 - magnitude);
    (value * factor).round() / factor
}

/// Softmax over centipawn scores at the configured temperature. One pawn
/// of score difference is one softmax unit at temperature 1.
fn teacher_policy(scored: &[(usize, i32)], temperature: f64) -> Vec<(usize, f64)> {
    let tau = temperature.max(1e-6) * 100.0;
    let max_score = scored.iter().map(|&(_, s)| s).max().unwrap_or(0) as f64;
    let exps: Vec<f64> = scored
        .iter()
        .map(|&(_, s)| ((s as f64 - max_score) / tau).exp())
        .collect();
    let total: f64 = exps.iter().sum();
    scored
        .iter()
        .zip(&exps)
        .map(|(&(action, _), &e)| (action, e / total))
        .collect()
}

/// Generate the dataset, appending one JSON object per line to `out_path`.
pub fn collect_teacher_dataset<E: ChessEngine>(
    engine: &E,
    config: &TeacherConfig,
    out_path: impl AsRef<Path>,
) -> Result<CollectStats> {
    if config.top_k == 0 || config.games == 0 {
        return Err(ChessRlError::Config(
            "teacher collection needs games >= 1 and top_k >= 1".to_string(),
        ));
    }
    let file = File::create(out_path.as_ref())?;
    let mut writer = BufWriter::new(file);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut seen: HashMap<String, u32> = HashMap::new();
    let mut stats = CollectStats {
        games: 0,
        records: 0,
        skipped_repeats: 0,
    };

    for game_id in 0..config.games {
        let mut state = engine.initial_state();
        let mut ply = 0u32;

        while !engine.is_terminal(&state) && ply < config.max_plies {
            let Some(search) = search_root(engine, &state, config.depth)? else {
                break;
            };
            let top: Vec<(usize, i32)> = search
                .scored_moves
                .iter()
                .take(config.top_k)
                .map(|&(mv, score)| (encode_move(&mv), score))
                .collect();
            let policy = teacher_policy(&top, config.temperature);
            let (best_move, best_score) = search.scored_moves[0];

            let fen = engine.to_fen(&state);
            let repeats = seen.entry(fen.clone()).or_insert(0);
            if *repeats < config.max_repeats_per_position {
                *repeats += 1;
                let record = TeacherRecord {
                    fen,
                    side: match engine.side_to_move(&state) {
                        Color::White => "w".to_string(),
                        Color::Black => "b".to_string(),
                    },
                    best_action: encode_move(&best_move),
                    top_k: policy.iter().map(|&(action, _)| action).collect(),
                    teacher_policy: policy
                        .iter()
                        .map(|&(action, p)| (action.to_string(), round_sig(p)))
                        .collect(),
                    value: round_sig(normalized_value(best_score)),
                    valid_actions: engine
                        .legal_moves(&state)
                        .iter()
                        .map(encode_move)
                        .collect(),
                    chosen_move: String::new(),
                    game_id,
                    ply,
                    ts: chrono::Utc::now().to_rfc3339(),
                };

                // Sample the move actually played from the teacher policy.
                let chosen_action = sample_policy(&policy, &mut rng);
                let chosen = search
                    .scored_moves
                    .iter()
                    .find(|&&(mv, _)| encode_move(&mv) == chosen_action)
                    .map(|&(mv, _)| mv)
                    .unwrap_or(best_move);

                let record = TeacherRecord {
                    chosen_move: chosen.algebraic(),
                    ..record
                };
                let line = serde_json::to_string(&record).map_err(|e| {
                    ChessRlError::Io(std::io::Error::other(format!(
                        "record serialization failed: {}",
                        e
                    )))
                })?;
                writeln!(writer, "{}", line)?;
                stats.records += 1;

                state = engine.apply_move(&state, chosen)?;
            } else {
                stats.skipped_repeats += 1;
                // Still advance the game along a sampled teacher move.
                let chosen_action = sample_policy(&policy, &mut rng);
                let chosen = search
                    .scored_moves
                    .iter()
                    .find(|&&(mv, _)| encode_move(&mv) == chosen_action)
                    .map(|&(mv, _)| mv)
                    .unwrap_or(best_move);
                state = engine.apply_move(&state, chosen)?;
            }
            ply += 1;
        }
        stats.games += 1;
        if (game_id + 1) % 10 == 0 {
            log::info!(
                "teacher collection: {}/{} games, {} records",
                game_id + 1,
                config.games,
                stats.records
            );
        }
    }

    writer.flush()?;
    Ok(stats)
}

fn sample_policy(policy: &[(usize, f64)], rng: &mut StdRng) -> usize {
    let mut target = rng.random::<f64>();
    for &(action, p) in policy {
        target -= p;
        if target <= 0.0 {
            return action;
        }
    }
    policy.last().map(|&(action, _)| action).unwrap_or(0)
}
