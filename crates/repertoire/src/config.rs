use std::collections::HashSet;
use std::path::PathBuf;

use chess_core::filter::TimeClass;
use clap::{Parser, ValueEnum};

use crate::book::BookFormat;
use crate::error::{RepertoireError, Result};
use crate::stockfish::DEFAULT_DEPTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Platform {
    Chesscom,
    Lichess,
}

/// Analyze a player's opening repertoire with an opening book and Stockfish.
#[derive(Debug, Parser)]
#[command(name = "repertoire", version)]
pub struct Cli {
    /// Player to analyze
    pub username: String,

    /// Only analyze games from the last N days (0 = all)
    #[arg(default_value_t = 0)]
    pub days: i64,

    #[arg(long, env = "REPERTOIRE_PLATFORM", value_enum, default_value_t = Platform::Chesscom)]
    pub platform: Platform,

    /// Stockfish search depth
    #[arg(long, env = "ANALYSIS_DEPTH", default_value_t = DEFAULT_DEPTH)]
    pub depth: u32,

    #[arg(long, env = "STOCKFISH_PATH", default_value = "/usr/local/bin/stockfish")]
    pub stockfish: PathBuf,

    #[arg(long, env = "OPENING_BOOK_PATH", default_value = "data/gm2001.bin")]
    pub book: PathBuf,

    #[arg(long, env = "OPENING_BOOK_FORMAT", value_enum, default_value_t = BookFormat::Polyglot)]
    pub book_format: BookFormat,

    /// Parallel Stockfish instances (0 = one per CPU)
    #[arg(long, env = "ANALYSIS_WORKERS", default_value_t = 1)]
    pub workers: usize,

    #[arg(long, env = "CACHE_DB_PATH", default_value = "data/cache.db")]
    pub cache_db: PathBuf,

    /// Re-fetch and re-analyze everything (results are still saved)
    #[arg(long)]
    pub no_cache: bool,

    /// Print coaching items for the player's own deviations
    #[arg(long)]
    pub report: bool,

    /// Only report deviations that occurred at least N times
    #[arg(long, default_value_t = 1)]
    pub min_times: usize,

    /// Only include these time controls
    #[arg(long, num_args = 1.., conflicts_with = "exclude")]
    pub include: Vec<TimeClass>,

    /// Exclude these time controls
    #[arg(long, num_args = 1..)]
    pub exclude: Vec<TimeClass>,
}

/// Resolved settings for one run.
#[derive(Debug, Clone)]
pub struct RepertoireConfig {
    pub username: String,
    pub days: i64,
    pub platform: Platform,
    pub depth: u32,
    pub stockfish_path: PathBuf,
    pub book_path: PathBuf,
    pub book_format: BookFormat,
    pub workers: usize,
    pub cache_db: PathBuf,
    pub force_refresh: bool,
    pub report: bool,
    pub min_times: usize,
    pub include: HashSet<TimeClass>,
    pub exclude: HashSet<TimeClass>,
}

impl RepertoireConfig {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        if cli.depth == 0 {
            return Err(RepertoireError::Config("depth must be at least 1".into()));
        }
        let workers = if cli.workers == 0 { num_cpus::get() } else { cli.workers };

        Ok(Self {
            username: cli.username,
            days: cli.days,
            platform: cli.platform,
            depth: cli.depth,
            stockfish_path: cli.stockfish,
            book_path: cli.book,
            book_format: cli.book_format,
            workers,
            cache_db: cli.cache_db,
            force_refresh: cli.no_cache,
            report: cli.report,
            min_times: cli.min_times.max(1),
            include: cli.include.into_iter().collect(),
            exclude: cli.exclude.into_iter().collect(),
        })
    }

    /// Fail early when the engine or the book is missing.
    pub fn validate_paths(&self) -> Result<()> {
        if !self.stockfish_path.is_file() {
            return Err(RepertoireError::Config(format!(
                "Stockfish not found at {}",
                self.stockfish_path.display()
            )));
        }
        if !self.book_path.is_file() {
            return Err(RepertoireError::Config(format!(
                "Opening book not found at {}",
                self.book_path.display()
            )));
        }
        Ok(())
    }
}
