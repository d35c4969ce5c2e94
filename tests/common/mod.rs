#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chess_core::GameRecord;
use chrono::{TimeZone, Utc};
use repertoire::book::MemoryBook;
use repertoire::{EvalResult, EvaluatorFactory, OpeningDetector, PositionEvaluator, RepertoireError};
use shakmaty::fen::Fen;
use shakmaty::{Chess, Color, EnPassantMode};

/// Generate a unique suffix based on timestamp to avoid collisions.
pub fn unique_suffix() -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}_{}", std::process::id(), ts % 1_000_000_000)
}

/// Fresh path under the system temp dir.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("repertoire_{name}_{}", unique_suffix()))
}

/// Game played by "alice" with the given movetext.
pub fn game(url: &str, color: Color, movetext: &str, eco: Option<&str>) -> GameRecord {
    let (white, black) = match color {
        Color::White => ("alice", "bob"),
        Color::Black => ("bob", "alice"),
    };
    GameRecord {
        white: white.into(),
        black: black.into(),
        my_color: color,
        white_result: "win".into(),
        black_result: "resigned".into(),
        termination: "alice won by resignation".into(),
        pgn: Some(format!("[Event \"Live Chess\"]\n\n{movetext} 1-0")),
        eco_code: eco.map(str::to_string),
        eco_name: eco.map(|_| "Sicilian Defense".to_string()),
        time_class: "blitz".into(),
        end_time: Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
        game_url: url.into(),
    }
}

/// Book covering 1.e4 e5 2.Nf3 Nc6 and 1.e4 c5 2.Nf3 d6.
pub fn detector() -> OpeningDetector {
    let book = MemoryBook::from_lines(&["e2e4 e7e5 g1f3 b8c6", "e2e4 c7c5 g1f3 d7d6"]).unwrap();
    OpeningDetector::new(Box::new(book))
}

/// Deterministic White-relative score of a position: -100..=100.
pub fn fake_score(pos: &Chess) -> i32 {
    let fen = Fen::from_position(pos, EnPassantMode::Legal).to_string();
    let sum: u32 = fen.bytes().map(u32::from).sum();
    (sum % 201) as i32 - 100
}

/// Counters shared by every evaluator a `StubEngines` starts.
#[derive(Default, Clone)]
pub struct EngineCounters {
    pub started: Arc<AtomicUsize>,
    pub evaluations: Arc<AtomicUsize>,
    pub stopped: Arc<AtomicUsize>,
}

impl EngineCounters {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Factory for stub evaluators. With `fail_at`, the evaluation with that
/// global index (0-based) returns an engine error.
#[derive(Default, Clone)]
pub struct StubEngines {
    pub counters: EngineCounters,
    pub fail_at: Option<usize>,
}

impl StubEngines {
    pub fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Self::default()
        }
    }
}

pub struct StubEvaluator {
    counters: EngineCounters,
    fail_at: Option<usize>,
    stopped: bool,
}

impl EvaluatorFactory for StubEngines {
    type Evaluator = StubEvaluator;

    fn start(&self) -> repertoire::Result<StubEvaluator> {
        self.counters.started.fetch_add(1, Ordering::SeqCst);
        Ok(StubEvaluator {
            counters: self.counters.clone(),
            fail_at: self.fail_at,
            stopped: false,
        })
    }
}

impl PositionEvaluator for StubEvaluator {
    fn evaluate(&mut self, pos: &Chess) -> repertoire::Result<EvalResult> {
        let index = self.counters.evaluations.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(index) {
            return Err(RepertoireError::Engine("Stockfish exited unexpectedly".into()));
        }
        Ok(EvalResult {
            score_cp: fake_score(pos),
            mate_in: None,
            depth: 18,
            best_move: None,
        })
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.counters.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}
