//! Opening repertoire analysis
//!
//! Walks a player's games against an opening book, scores the position
//! where each game left theory with Stockfish, and aggregates the scores
//! per opening and color.

pub mod analysis;
pub mod book;
pub mod cache;
pub mod clients;
pub mod config;
pub mod deviation;
pub mod error;
pub mod report;
pub mod repertoire;
pub mod sources;
pub mod stockfish;

pub use book::{BookFormat, OpeningReference};
pub use cache::GameCache;
pub use deviation::{DeviationResult, OpeningDetector};
pub use error::{RepertoireError, Result};
pub use repertoire::{OpeningEvaluation, OpeningStats, OpeningStatsMap, RepertoireAnalyzer, StatsKey};
pub use stockfish::{EvalResult, EvaluatorFactory, PositionEvaluator, StockfishEvaluator, StockfishSettings};
