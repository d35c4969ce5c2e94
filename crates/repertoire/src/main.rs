//! Repertoire CLI
//!
//! Fetches a player's games, finds where each left the opening book, and
//! prints per-opening Stockfish scores.

use std::collections::HashSet;

use anyhow::Context;
use chess_core::endgame;
use chess_core::filter::{filter_by_days, filter_by_time_class};
use chess_core::summary::GameSummary;
use chess_core::GameRecord;
use chrono::Utc;
use clap::Parser;
use tracing::info;

use repertoire::clients::chess_com::ChessComClient;
use repertoire::clients::lichess::LichessClient;
use repertoire::config::{Cli, Platform, RepertoireConfig};
use repertoire::repertoire::ProgressFn;
use repertoire::report::{
    coaching_deviations, coaching_headline, describe_deviation, format_one_offs, format_summary,
};
use repertoire::{sources, GameCache, OpeningDetector, OpeningEvaluation, RepertoireAnalyzer, StockfishSettings};

/// Summary lines only list openings seen at least this often.
const SUMMARY_MIN_GAMES: u32 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = RepertoireConfig::from_cli(Cli::parse())?;
    config.validate_paths()?;

    let mut cache = GameCache::open(&config.cache_db).context("Failed to open cache")?;
    if config.force_refresh {
        info!("Force refresh: re-fetching and re-analyzing, results will be saved");
    }

    let games = fetch_games(&config, &cache).await?;
    if games.is_empty() {
        println!("No games found.");
        return Ok(());
    }

    print_general_stats(&games);
    print_endgame_stats(&games);

    println!("\n--- Opening Repertoire Analysis (depth {}, {} workers) ---", config.depth, config.workers);
    let detector = OpeningDetector::open(&config.book_path, config.book_format)
        .context("Failed to load opening book")?;

    let cached: Vec<OpeningEvaluation> = if config.force_refresh {
        Vec::new()
    } else {
        let urls: Vec<&str> = games
            .iter()
            .map(|g| g.game_url.as_str())
            .filter(|url| !url.is_empty())
            .collect();
        cache
            .get_cached_evaluations(&urls, config.depth)?
            .into_values()
            .collect()
    };

    let cached_urls: HashSet<&str> = cached.iter().map(|ev| ev.game_url.as_str()).collect();
    let uncached: Vec<GameRecord> = games
        .iter()
        .filter(|g| !cached_urls.contains(g.game_url.as_str()))
        .cloned()
        .collect();
    info!(cached = cached.len(), new = uncached.len(), "Cache lookup done");

    let analyzer = RepertoireAnalyzer::new(
        config.username.clone(),
        detector,
        StockfishSettings {
            path: config.stockfish_path.clone(),
            depth: config.depth,
        },
    );
    let workers = config.workers;

    let (stats, new_evals, cached) = tokio::task::spawn_blocking(move || {
        let progress: ProgressFn<'_> = &|done: usize, total: usize| {
            if done % 10 == 0 || done == total {
                info!(done, total, "Analyzing games");
            }
        };
        let (stats, results) = analyzer.analyze_repertoire(&uncached, Some(progress), workers, &cached)?;
        let new_evals: Vec<OpeningEvaluation> = results.into_iter().map(|(_, ev)| ev).collect();
        Ok::<_, repertoire::RepertoireError>((stats, new_evals, cached))
    })
    .await
    .context("Analysis task failed")??;

    let to_save: Vec<&OpeningEvaluation> = new_evals.iter().filter(|ev| !ev.game_url.is_empty()).collect();
    if !to_save.is_empty() {
        let saved = cache.save_evaluations_batch(&config.username, config.depth, to_save)?;
        info!(saved, "Cached new evaluations");
    }

    if stats.is_empty() {
        println!("  No openings detected (games may be too short or missing PGN data).");
        return Ok(());
    }

    let lines = format_summary(&stats, SUMMARY_MIN_GAMES);
    if lines.is_empty() {
        println!("  No opening played more than once.");
    } else {
        println!("\n  Openings played {SUMMARY_MIN_GAMES}+ times (sorted best to worst):\n");
        for line in lines {
            println!("    {line}");
        }
    }

    let one_offs = format_one_offs(&stats);
    if !one_offs.is_empty() {
        println!("\n  Played once ({} openings):", one_offs.len());
        for line in one_offs {
            println!("    {line}");
        }
    }

    if config.report {
        let all_evals: Vec<OpeningEvaluation> = cached.into_iter().chain(new_evals).collect();
        let stale = all_evals.iter().filter(|ev| ev.fen_at_deviation.is_empty()).count();
        if stale > 0 {
            println!(
                "\n  Note: {stale} cached evaluations lack coaching data. \
                 Run with --no-cache to re-analyze and update cache."
            );
        }

        let items = coaching_deviations(&all_evals, config.min_times);
        match coaching_headline(&items) {
            Some(headline) => {
                println!("\n--- Coaching Report for {} ---\n  {headline}\n", config.username);
                for item in &items {
                    println!("{}\n", describe_deviation(item));
                }
            }
            None => println!("\n  No recurring deviations to report."),
        }
    }

    Ok(())
}

async fn fetch_games(config: &RepertoireConfig, cache: &GameCache) -> anyhow::Result<Vec<GameRecord>> {
    let raw = match config.platform {
        Platform::Chesscom => {
            let client = ChessComClient::new()?;
            sources::fetch_chesscom_games(&client, cache, &config.username, config.force_refresh)
                .await
                .context("Could not fetch Chess.com archives")?
        }
        Platform::Lichess => {
            let client = LichessClient::new()?;
            sources::fetch_lichess_games(&client, &config.username, config.days)
                .await
                .context("Could not fetch Lichess games")?
        }
    };

    let mut games = sources::to_records(&raw, config.platform, &config.username);

    if config.days > 0 {
        games = filter_by_days(games, config.days, Utc::now());
        info!(days = config.days, games = games.len(), "Filtered by age");
    }

    if !config.include.is_empty() || !config.exclude.is_empty() {
        let before = games.len();
        games = filter_by_time_class(games, &config.include, &config.exclude);
        info!(before, after = games.len(), "Filtered by time control");
    }

    Ok(games)
}

fn print_general_stats(games: &[GameRecord]) {
    let Some(s) = GameSummary::summarize(games) else {
        return;
    };
    println!("\n--- General Stats ({} games) ---", s.total_games);
    println!("  Wins:   {} ({}%)", s.wins, s.win_percent);
    println!("  Losses: {}", s.losses);
    println!("  Draws:  {}", s.draws);
    println!("  Win as white: {}% (of {} games)", s.win_white_percent, s.games_white);
    println!("  Win as black: {}% (of {} games)", s.win_black_percent, s.games_black);
}

fn print_endgame_stats(games: &[GameRecord]) {
    let stats = endgame::aggregate(games);
    if stats.is_empty() {
        return;
    }
    let reached: u32 = stats.iter().map(|s| s.total).sum();
    println!("\n--- Endgames ({reached} games reached one) ---");
    for s in &stats {
        println!(
            "  {} ({}): {} games, W {}% / L {}% / D {}%",
            s.endgame_type,
            s.balance.as_str(),
            s.total,
            s.win_pct,
            s.loss_pct,
            s.draw_pct
        );
    }
}
