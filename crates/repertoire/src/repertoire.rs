//! Repertoire analysis: deviation detection, engine scoring and per-opening
//! aggregation over a game collection.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::thread;

use chess_core::pgn::parse_moves;
use chess_core::{color_name, GameOutcome, GameRecord};
use shakmaty::fen::Fen;
use shakmaty::{Color, EnPassantMode, Move, Position};
use tracing::{debug, info, warn};

use crate::analysis::{eval_loss, round1};
use crate::book::uci_string;
use crate::deviation::{DeviationResult, OpeningDetector};
use crate::error::{RepertoireError, Result};
use crate::stockfish::{EvaluatorFactory, PositionEvaluator};

/// Games shorter than this many plies are not analyzed.
pub const MIN_PLIES: usize = 4;

/// Bucket label for games without an ECO code.
pub const UNKNOWN_OPENING: &str = "Unknown";

/// Fallback opening name.
pub const UNKNOWN_OPENING_NAME: &str = "Unknown Opening";

/// Progress callback: (completed, total).
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Sync);

/// One game's analyzed opening. This is what the cache stores.
#[derive(Debug, Clone, PartialEq)]
pub struct OpeningEvaluation {
    pub eco_code: Option<String>,
    pub eco_name: String,
    pub my_color: Color,
    pub deviation_ply: usize,
    pub deviating_side: Option<Color>,
    /// Score at the deviation position, from the player's point of view.
    pub eval_cp: i32,
    pub is_fully_booked: bool,
    pub fen_at_deviation: String,
    pub best_move_uci: Option<String>,
    pub played_move_uci: Option<String>,
    pub book_moves_uci: Vec<String>,
    pub eval_loss_cp: i32,
    pub game_moves_uci: Vec<String>,
    pub game_url: String,
    pub my_result: Option<GameOutcome>,
    pub time_class: String,
}

impl OpeningEvaluation {
    /// True when the analyzed player (not the opponent) left the book.
    pub fn player_deviated(&self) -> bool {
        self.deviating_side == Some(self.my_color)
    }
}

/// Aggregation bucket: opening code (or "Unknown") and player color.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatsKey {
    pub opening: String,
    pub color: Color,
}

impl StatsKey {
    pub fn new(opening: impl Into<String>, color: Color) -> Self {
        Self {
            opening: opening.into(),
            color,
        }
    }

    pub fn of(evaluation: &OpeningEvaluation) -> Self {
        Self::new(
            evaluation.eco_code.as_deref().unwrap_or(UNKNOWN_OPENING),
            evaluation.my_color,
        )
    }
}

impl fmt::Display for StatsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.opening, color_name(self.color))
    }
}

/// Running totals for one (opening, color) bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct OpeningStats {
    pub eco_code: Option<String>,
    pub eco_name: String,
    pub color: Color,
    pub times_played: u32,
    pub total_eval: i64,
    pub min_eval: i32,
    pub max_eval: i32,
    pub total_deviation_ply: u64,
    pub player_deviated_count: u32,
    pub evaluations: Vec<i32>,
}

impl OpeningStats {
    fn seeded(evaluation: &OpeningEvaluation) -> Self {
        Self {
            eco_code: evaluation.eco_code.clone(),
            eco_name: evaluation.eco_name.clone(),
            color: evaluation.my_color,
            times_played: 0,
            total_eval: 0,
            min_eval: evaluation.eval_cp,
            max_eval: evaluation.eval_cp,
            total_deviation_ply: 0,
            player_deviated_count: 0,
            evaluations: Vec::new(),
        }
    }

    /// Mean score in centipawns, one decimal.
    pub fn avg_eval(&self) -> f64 {
        if self.times_played == 0 {
            return 0.0;
        }
        round1(self.total_eval as f64 / f64::from(self.times_played))
    }

    /// Mean deviation ply, one decimal.
    pub fn avg_deviation_ply(&self) -> f64 {
        if self.times_played == 0 {
            return 0.0;
        }
        round1(self.total_deviation_ply as f64 / f64::from(self.times_played))
    }
}

pub type OpeningStatsMap = HashMap<StatsKey, OpeningStats>;

/// Stats over cached and new evaluations, plus the new evaluations paired
/// with their games.
pub type RepertoireOutcome<'g> = (OpeningStatsMap, Vec<(&'g GameRecord, OpeningEvaluation)>);

/// Fold one evaluation into the stats map.
pub fn aggregate(stats: &mut OpeningStatsMap, evaluation: &OpeningEvaluation) {
    let entry = stats
        .entry(StatsKey::of(evaluation))
        .or_insert_with(|| OpeningStats::seeded(evaluation));

    entry.times_played += 1;
    entry.total_eval += i64::from(evaluation.eval_cp);
    entry.min_eval = entry.min_eval.min(evaluation.eval_cp);
    entry.max_eval = entry.max_eval.max(evaluation.eval_cp);
    entry.total_deviation_ply += evaluation.deviation_ply as u64;
    entry.evaluations.push(evaluation.eval_cp);
    if evaluation.player_deviated() {
        entry.player_deviated_count += 1;
    }
}

/// A game that survived preprocessing.
struct PreparedGame<'g> {
    game: &'g GameRecord,
    deviation: DeviationResult,
    moves: Vec<Move>,
}

/// Evaluators started for one run. Dropping the set stops every engine.
struct EngineSet<E: PositionEvaluator>(Vec<E>);

impl<E: PositionEvaluator> EngineSet<E> {
    fn start<F>(factory: &F, count: usize) -> Result<Self>
    where
        F: EvaluatorFactory<Evaluator = E>,
    {
        let mut set = Self(Vec::with_capacity(count));
        for _ in 0..count {
            set.0.push(factory.start()?);
        }
        Ok(set)
    }

    fn stop_all(&mut self) {
        for engine in &mut self.0 {
            engine.stop();
        }
    }
}

impl<E: PositionEvaluator> Drop for EngineSet<E> {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Shared state of a parallel run, guarded by one lock.
struct ParallelState<'g> {
    stats: OpeningStatsMap,
    results: Vec<(&'g GameRecord, OpeningEvaluation)>,
    completed: usize,
}

pub struct RepertoireAnalyzer<F: EvaluatorFactory> {
    username: String,
    detector: OpeningDetector,
    engines: F,
}

impl<F: EvaluatorFactory> RepertoireAnalyzer<F> {
    pub fn new(username: impl Into<String>, detector: OpeningDetector, engines: F) -> Self {
        Self {
            username: username.into(),
            detector,
            engines,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Analyze `games` and merge the results with `cached`.
    ///
    /// Returns the stats over cached and new evaluations, and the new
    /// evaluations paired with their games. With `workers > 1` the new
    /// evaluations come back in completion order.
    pub fn analyze_repertoire<'g>(
        &self,
        games: &'g [GameRecord],
        progress: Option<ProgressFn<'_>>,
        workers: usize,
        cached: &[OpeningEvaluation],
    ) -> Result<RepertoireOutcome<'g>> {
        let mut stats = OpeningStatsMap::new();
        for evaluation in cached {
            aggregate(&mut stats, evaluation);
        }

        let prepared = self.prepare(games);
        if prepared.is_empty() {
            if let Some(progress) = progress {
                progress(0, 0);
            }
            return Ok((stats, Vec::new()));
        }

        info!(
            username = %self.username,
            games = prepared.len(),
            skipped = games.len() - prepared.len(),
            cached = cached.len(),
            workers,
            "Analyzing repertoire"
        );

        if workers <= 1 {
            self.analyze_sequential(prepared, progress, stats)
        } else {
            self.analyze_parallel(prepared, progress, workers, stats)
        }
    }

    /// Parse and walk every game against the book; drop the ones that
    /// cannot be analyzed.
    fn prepare<'g>(&self, games: &'g [GameRecord]) -> Vec<PreparedGame<'g>> {
        games
            .iter()
            .filter_map(|game| {
                let moves = parse_moves(game.pgn.as_deref()?)?;
                if moves.len() < MIN_PLIES {
                    debug!(game_url = %game.game_url, plies = moves.len(), "Skipping short game");
                    return None;
                }
                let deviation = self.detector.find_deviation(&moves)?;
                Some(PreparedGame { game, deviation, moves })
            })
            .collect()
    }

    fn analyze_sequential<'g>(
        &self,
        prepared: Vec<PreparedGame<'g>>,
        progress: Option<ProgressFn<'_>>,
        mut stats: OpeningStatsMap,
    ) -> Result<RepertoireOutcome<'g>> {
        let total = prepared.len();
        let mut engines = EngineSet::start(&self.engines, 1)?;
        let mut results = Vec::with_capacity(total);

        for (i, item) in prepared.iter().enumerate() {
            if let Some(progress) = progress {
                progress(i + 1, total);
            }
            let evaluation = evaluate_game(&mut engines.0[0], item)?;
            aggregate(&mut stats, &evaluation);
            results.push((item.game, evaluation));
        }

        engines.stop_all();
        Ok((stats, results))
    }

    fn analyze_parallel<'g>(
        &self,
        prepared: Vec<PreparedGame<'g>>,
        progress: Option<ProgressFn<'_>>,
        workers: usize,
        stats: OpeningStatsMap,
    ) -> Result<RepertoireOutcome<'g>> {
        let total = prepared.len();

        // Round-robin: item i goes to bucket i % n, and no bucket is empty
        let n = workers.min(total);
        let mut buckets: Vec<Vec<PreparedGame<'g>>> = (0..n).map(|_| Vec::new()).collect();
        for (i, item) in prepared.into_iter().enumerate() {
            buckets[i % n].push(item);
        }

        let mut engines = EngineSet::start(&self.engines, buckets.len())?;
        let state = Mutex::new(ParallelState {
            stats,
            results: Vec::with_capacity(total),
            completed: 0,
        });

        let outcome = thread::scope(|scope| {
            let handles: Vec<_> = buckets
                .iter()
                .zip(engines.0.iter_mut())
                .map(|(bucket, engine)| {
                    let state = &state;
                    scope.spawn(move || -> Result<()> {
                        for item in bucket {
                            let evaluation = evaluate_game(engine, item)?;
                            let mut shared =
                                state.lock().map_err(|_| RepertoireError::WorkerPanicked)?;
                            aggregate(&mut shared.stats, &evaluation);
                            shared.results.push((item.game, evaluation));
                            shared.completed += 1;
                            if let Some(progress) = progress {
                                progress(shared.completed, total);
                            }
                        }
                        Ok(())
                    })
                })
                .collect();

            let mut first_error = None;
            for handle in handles {
                let result = handle
                    .join()
                    .unwrap_or_else(|_| Err(RepertoireError::WorkerPanicked));
                if let Err(e) = result {
                    warn!(error = %e, "Analysis worker failed");
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        });

        engines.stop_all();
        outcome?;

        let state = state.into_inner().map_err(|_| RepertoireError::WorkerPanicked)?;
        Ok((state.stats, state.results))
    }
}

/// Score one prepared game. The second engine call (after the played move)
/// only happens for a real deviation.
fn evaluate_game<E: PositionEvaluator>(
    engine: &mut E,
    item: &PreparedGame<'_>,
) -> Result<OpeningEvaluation> {
    let game = item.game;
    let deviation = &item.deviation;
    let color = game.my_color;

    let before = engine.evaluate(&deviation.position)?;
    let eval_cp = before.score_for(color);

    let eval_loss_cp = match (&deviation.played_move, deviation.is_fully_booked) {
        (Some(played), false) => {
            let mut after = deviation.position.clone();
            after.play_unchecked(played.clone());
            let after_eval = engine.evaluate(&after)?;
            eval_loss(eval_cp, after_eval.score_for(color))
        }
        _ => 0,
    };

    debug!(
        game_url = %game.game_url,
        deviation_ply = deviation.deviation_ply,
        eval_cp,
        eval_loss_cp,
        "Evaluated deviation"
    );

    Ok(OpeningEvaluation {
        eco_code: game.eco_code.clone(),
        eco_name: game
            .eco_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_OPENING_NAME.to_string()),
        my_color: color,
        deviation_ply: deviation.deviation_ply,
        deviating_side: deviation.deviating_side,
        eval_cp,
        is_fully_booked: deviation.is_fully_booked,
        fen_at_deviation: Fen::from_position(&deviation.position, EnPassantMode::Legal).to_string(),
        best_move_uci: before.best_move.as_ref().map(|m| m.to_string()),
        played_move_uci: deviation.played_move.as_ref().map(uci_string),
        book_moves_uci: deviation.book_moves.iter().map(uci_string).collect(),
        eval_loss_cp,
        game_moves_uci: item.moves.iter().map(uci_string).collect(),
        game_url: game.game_url.clone(),
        my_result: Some(game.outcome()),
        time_class: game.time_class.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluation(eco: Option<&str>, color: Color, eval_cp: i32, ply: usize) -> OpeningEvaluation {
        OpeningEvaluation {
            eco_code: eco.map(str::to_string),
            eco_name: "Sicilian Defense".into(),
            my_color: color,
            deviation_ply: ply,
            deviating_side: Some(color),
            eval_cp,
            is_fully_booked: false,
            fen_at_deviation: String::new(),
            best_move_uci: None,
            played_move_uci: None,
            book_moves_uci: Vec::new(),
            eval_loss_cp: 0,
            game_moves_uci: Vec::new(),
            game_url: String::new(),
            my_result: None,
            time_class: String::new(),
        }
    }

    #[test]
    fn test_aggregate_first_sight_seeds_min_max() {
        let mut stats = OpeningStatsMap::new();
        aggregate(&mut stats, &evaluation(Some("B90"), Color::White, -40, 6));
        let s = &stats[&StatsKey::new("B90", Color::White)];
        assert_eq!(s.times_played, 1);
        assert_eq!((s.min_eval, s.max_eval), (-40, -40));
        assert_eq!(s.player_deviated_count, 1);
        assert_eq!(s.avg_deviation_ply(), 6.0);
    }

    #[test]
    fn test_aggregate_unknown_and_color_split() {
        let mut stats = OpeningStatsMap::new();
        aggregate(&mut stats, &evaluation(None, Color::White, 10, 4));
        aggregate(&mut stats, &evaluation(None, Color::Black, 20, 4));
        aggregate(&mut stats, &evaluation(Some("Unknown"), Color::White, 30, 4));
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[&StatsKey::new(UNKNOWN_OPENING, Color::White)].times_played, 2);
        assert_eq!(StatsKey::new("B90", Color::Black).to_string(), "B90_black");
    }

    #[test]
    fn test_aggregate_order_independent() {
        let evals = vec![
            evaluation(Some("C20"), Color::White, 35, 3),
            evaluation(Some("C20"), Color::White, -80, 7),
            evaluation(Some("C20"), Color::White, 12, 5),
            evaluation(Some("A00"), Color::Black, 5, 1),
        ];
        let mut forward = OpeningStatsMap::new();
        evals.iter().for_each(|e| aggregate(&mut forward, e));
        let mut backward = OpeningStatsMap::new();
        evals.iter().rev().for_each(|e| aggregate(&mut backward, e));

        for (key, a) in &forward {
            let b = &backward[key];
            assert_eq!(a.times_played, b.times_played);
            assert_eq!(a.total_eval, b.total_eval);
            assert_eq!((a.min_eval, a.max_eval), (b.min_eval, b.max_eval));
            assert_eq!(a.total_deviation_ply, b.total_deviation_ply);
            assert_eq!(a.avg_eval(), b.avg_eval());
        }
        let c20 = &forward[&StatsKey::new("C20", Color::White)];
        assert_eq!((c20.min_eval, c20.max_eval), (-80, 35));
        assert_eq!(c20.avg_eval(), -11.0);
    }

    #[test]
    fn test_opponent_deviation_not_counted() {
        let mut ev = evaluation(Some("B90"), Color::White, 0, 3);
        ev.deviating_side = Some(Color::Black);
        let mut stats = OpeningStatsMap::new();
        aggregate(&mut stats, &ev);
        assert_eq!(stats[&StatsKey::of(&ev)].player_deviated_count, 0);
    }
}
