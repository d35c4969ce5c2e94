//! Stockfish engine wrapper using UCI protocol (blocking I/O)
//!
//! Each evaluator owns one child process. Calls block the calling thread
//! until the engine answers `bestmove`; there is no per-call timeout.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{Chess, Color, EnPassantMode, Position};
use tracing::debug;

use crate::error::{RepertoireError, Result};

/// Centipawn stand-in for a forced mate.
pub const MATE_SCORE_CP: i32 = 10_000;

/// Default search depth.
pub const DEFAULT_DEPTH: u32 = 18;

/// Engine output for one position, from White's point of view.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    /// Centipawns, positive = good for White. Forced mates are ±MATE_SCORE_CP.
    pub score_cp: i32,
    /// Mate in N, positive = White mates.
    pub mate_in: Option<i32>,
    pub depth: u32,
    pub best_move: Option<UciMove>,
}

impl EvalResult {
    /// Score from `color`'s point of view.
    pub fn score_for(&self, color: Color) -> i32 {
        score_for_color(self.score_cp, color)
    }
}

/// Flip a White-relative score to `color`'s point of view.
pub fn score_for_color(white_cp: i32, color: Color) -> i32 {
    match color {
        Color::White => white_cp,
        Color::Black => -white_cp,
    }
}

/// Something that can score positions.
pub trait PositionEvaluator {
    fn evaluate(&mut self, pos: &Chess) -> Result<EvalResult>;

    /// Release the engine. Safe to call more than once.
    fn stop(&mut self);
}

/// Starts evaluators that share one engine configuration.
pub trait EvaluatorFactory: Sync {
    type Evaluator: PositionEvaluator + Send;

    fn start(&self) -> Result<Self::Evaluator>;
}

/// Raw score line as reported by the engine (side-to-move relative).
#[derive(Debug, Clone, Default, PartialEq)]
struct SearchInfo {
    depth: Option<u32>,
    cp: Option<i32>,
    mate: Option<i32>,
}

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub fn spawn(path: &std::path::Path) -> Result<Self> {
        let mut process = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                RepertoireError::Engine(format!("Failed to spawn {}: {e}", path.display()))
            })?;

        let (Some(stdin), Some(stdout)) = (process.stdin.take(), process.stdout.take()) else {
            let _ = process.kill();
            return Err(RepertoireError::Engine("Engine pipes unavailable".into()));
        };

        let mut engine = Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
        };

        engine.send("uci")?;
        engine.wait_for("uciok")?;
        engine.send("setoption name Threads value 1")?;
        engine.send("setoption name Hash value 64")?;
        engine.send("isready")?;
        engine.wait_for("readyok")?;

        Ok(engine)
    }

    /// Send a command to Stockfish
    fn send(&mut self, cmd: &str) -> Result<()> {
        debug!(cmd, "SF <");
        writeln!(self.stdin, "{cmd}")
            .and_then(|()| self.stdin.flush())
            .map_err(|e| RepertoireError::Engine(format!("Failed to write to Stockfish: {e}")))
    }

    /// Read one line; EOF means the engine died.
    fn read_line(&mut self, line: &mut String) -> Result<()> {
        line.clear();
        let n = self
            .stdout
            .read_line(line)
            .map_err(|e| RepertoireError::Engine(format!("Failed to read from Stockfish: {e}")))?;
        if n == 0 {
            return Err(RepertoireError::Engine("Stockfish exited unexpectedly".into()));
        }
        debug!(line = line.trim(), "SF >");
        Ok(())
    }

    /// Wait for a specific response line
    fn wait_for(&mut self, expected: &str) -> Result<()> {
        let mut line = String::new();
        loop {
            self.read_line(&mut line)?;
            if line.trim() == expected {
                return Ok(());
            }
        }
    }

    /// Search `fen` to `depth` and return the last score line plus best move.
    fn analyse(&mut self, fen: &str, depth: u32) -> Result<(SearchInfo, Option<String>)> {
        self.send(&format!("position fen {fen}"))?;
        self.send(&format!("go depth {depth}"))?;

        let mut info = SearchInfo::default();
        let mut line = String::new();
        loop {
            self.read_line(&mut line)?;
            let trimmed = line.trim();
            if trimmed.starts_with("info") {
                if let Some(parsed) = parse_info(trimmed) {
                    info = parsed;
                }
            } else if let Some(rest) = trimmed.strip_prefix("bestmove") {
                let best = rest
                    .split_whitespace()
                    .next()
                    .filter(|m| *m != "(none)" && *m != "0000")
                    .map(str::to_string);
                return Ok((info, best));
            }
        }
    }

    /// Send quit command and wait for process to exit
    pub fn quit(&mut self) {
        let _ = self.send("quit");
        let _ = self.process.wait();
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // No-op when quit() already reaped the process
        if let Ok(None) = self.process.try_wait() {
            let _ = self.process.kill();
            let _ = self.process.wait();
        }
    }
}

/// Engine location and search depth shared by every evaluator of a run.
#[derive(Debug, Clone)]
pub struct StockfishSettings {
    pub path: PathBuf,
    pub depth: u32,
}

impl EvaluatorFactory for StockfishSettings {
    type Evaluator = StockfishEvaluator;

    fn start(&self) -> Result<StockfishEvaluator> {
        let mut evaluator = StockfishEvaluator::new(self.path.clone(), self.depth);
        evaluator.start()?;
        Ok(evaluator)
    }
}

/// Fixed-depth evaluator over one Stockfish process.
pub struct StockfishEvaluator {
    path: PathBuf,
    depth: u32,
    engine: Option<StockfishEngine>,
}

impl StockfishEvaluator {
    /// Create an evaluator; no process runs until `start`.
    pub fn new(path: impl Into<PathBuf>, depth: u32) -> Self {
        Self {
            path: path.into(),
            depth,
            engine: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.engine.is_none() {
            self.engine = Some(StockfishEngine::spawn(&self.path)?);
        }
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.engine.is_some()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

impl PositionEvaluator for StockfishEvaluator {
    fn evaluate(&mut self, pos: &Chess) -> Result<EvalResult> {
        let depth = self.depth;
        let engine = self.engine.as_mut().ok_or(RepertoireError::EngineNotStarted)?;
        let fen = Fen::from_position(pos, EnPassantMode::Legal).to_string();
        let (info, best) = engine.analyse(&fen, depth)?;

        let best_move = match best {
            Some(text) => Some(text.parse::<UciMove>().map_err(|e| {
                RepertoireError::Engine(format!("Malformed bestmove {text}: {e}"))
            })?),
            None => None,
        };
        let (score_cp, mate_in) = white_relative_score(pos.turn(), info.cp, info.mate);

        Ok(EvalResult {
            score_cp,
            mate_in,
            depth: info.depth.unwrap_or(depth),
            best_move,
        })
    }

    fn stop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.quit();
        }
    }
}

impl Drop for StockfishEvaluator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Convert a side-to-move score into (White-relative centipawns, White-relative mate).
///
/// `mate 0` means the side to move is already mated.
fn white_relative_score(turn: Color, cp: Option<i32>, mate: Option<i32>) -> (i32, Option<i32>) {
    if let Some(mate) = mate {
        let stm_wins = mate > 0;
        let white_wins = stm_wins == (turn == Color::White);
        let white_mate = score_for_color(mate, turn);
        let score = if white_wins { MATE_SCORE_CP } else { -MATE_SCORE_CP };
        return (score, Some(white_mate));
    }
    (score_for_color(cp.unwrap_or(0), turn), None)
}

/// Parse the score part of an `info` line. Lines without a score
/// (currmove, string, ...) yield `None`.
fn parse_info(line: &str) -> Option<SearchInfo> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut info = SearchInfo::default();
    let mut has_score = false;
    let mut i = 0;
    while i < parts.len() {
        match parts[i] {
            "depth" => info.depth = parts.get(i + 1).and_then(|v| v.parse().ok()),
            "score" => {
                match (parts.get(i + 1), parts.get(i + 2).and_then(|v| v.parse().ok())) {
                    (Some(&"cp"), Some(v)) => {
                        info.cp = Some(v);
                        has_score = true;
                    }
                    (Some(&"mate"), Some(v)) => {
                        info.mate = Some(v);
                        has_score = true;
                    }
                    _ => {}
                }
                i += 2;
            }
            // Everything after pv is moves
            "pv" | "string" => break,
            _ => {}
        }
        i += 1;
    }
    has_score.then_some(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cp() {
        let line = "info depth 20 seldepth 25 multipv 1 score cp 35 nodes 100000 pv e2e4";
        let info = parse_info(line).unwrap();
        assert_eq!(info.cp, Some(35));
        assert_eq!(info.mate, None);
        assert_eq!(info.depth, Some(20));
    }

    #[test]
    fn test_parse_mate() {
        let line = "info depth 20 score mate -3 nodes 100000 pv e2e4";
        let info = parse_info(line).unwrap();
        assert_eq!(info.mate, Some(-3));
        assert_eq!(info.cp, None);
    }

    #[test]
    fn test_parse_lowerbound_and_non_score_lines() {
        let line = "info depth 12 score cp 40 lowerbound nodes 2000 pv d2d4";
        assert_eq!(parse_info(line).unwrap().cp, Some(40));
        assert!(parse_info("info depth 5 currmove e2e4 currmovenumber 1").is_none());
        assert!(parse_info("info string NNUE evaluation using nn.nnue").is_none());
    }

    #[test]
    fn test_white_relative_cp() {
        assert_eq!(white_relative_score(Color::White, Some(35), None), (35, None));
        assert_eq!(white_relative_score(Color::Black, Some(35), None), (-35, None));
        assert_eq!(white_relative_score(Color::Black, None, None), (0, None));
    }

    #[test]
    fn test_white_relative_mate() {
        assert_eq!(white_relative_score(Color::White, None, Some(2)), (10_000, Some(2)));
        assert_eq!(white_relative_score(Color::Black, None, Some(2)), (-10_000, Some(-2)));
        assert_eq!(white_relative_score(Color::Black, None, Some(-4)), (10_000, Some(4)));
        // Side to move is mated
        assert_eq!(white_relative_score(Color::White, None, Some(0)).0, -10_000);
        assert_eq!(white_relative_score(Color::Black, None, Some(0)).0, 10_000);
    }

    #[test]
    fn test_score_for_color_symmetry() {
        for v in [-250, -1, 0, 1, 75, MATE_SCORE_CP] {
            assert_eq!(score_for_color(v, Color::White), v);
            assert_eq!(score_for_color(v, Color::Black), -v);
        }
        assert_eq!(score_for_color(0, Color::Black), 0);
    }

    #[test]
    fn test_evaluate_before_start_fails_fast() {
        let mut evaluator = StockfishEvaluator::new("/nonexistent/stockfish", 12);
        assert!(!evaluator.is_started());
        let err = evaluator.evaluate(&Chess::default()).unwrap_err();
        assert!(matches!(err, RepertoireError::EngineNotStarted));
    }

    #[test]
    fn test_start_missing_binary_errors() {
        let mut evaluator = StockfishEvaluator::new("/nonexistent/stockfish", 12);
        assert!(matches!(evaluator.start(), Err(RepertoireError::Engine(_))));
        assert!(!evaluator.is_started());
    }
}
