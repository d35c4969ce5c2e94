//! Fetching a player's games, with completed Chess.com months served from
//! the archive cache.

use std::sync::LazyLock;

use chess_core::GameRecord;
use chrono::{DateTime, Datelike, Duration, Utc};
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::GameCache;
use crate::clients::chess_com::ChessComClient;
use crate::clients::lichess::LichessClient;
use crate::config::Platform;
use crate::error::Result;

static ARCHIVE_MONTH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"/(\d{4})/(\d{2})$").ok());

/// True when the archive URL is for the month of `now`, or cannot be parsed.
pub fn is_current_month(archive_url: &str, now: DateTime<Utc>) -> bool {
    let Some(caps) = ARCHIVE_MONTH.as_ref().and_then(|re| re.captures(archive_url)) else {
        return true;
    };
    let year: Option<i32> = caps.get(1).and_then(|m| m.as_str().parse().ok());
    let month: Option<u32> = caps.get(2).and_then(|m| m.as_str().parse().ok());
    match (year, month) {
        (Some(year), Some(month)) => year == now.year() && month == now.month(),
        _ => true,
    }
}

/// Raw Chess.com game objects across all monthly archives.
///
/// Failing to list the archives aborts; a failing month is skipped.
pub async fn fetch_chesscom_games(
    client: &ChessComClient,
    cache: &GameCache,
    username: &str,
    force_refresh: bool,
) -> Result<Vec<Value>> {
    info!(username, "Fetching Chess.com archives");
    let archive_urls = client.fetch_archives(username).await?;
    let now = Utc::now();

    let mut raw_games = Vec::new();
    let mut cached_months = 0;
    let mut fetched_months = 0;

    for url in &archive_urls {
        let cached = if force_refresh || is_current_month(url, now) {
            None
        } else {
            cache.get_archive(url)?
        };

        let month = match cached {
            Some(data) => {
                cached_months += 1;
                data
            }
            None => match client.fetch_month(url).await {
                Ok(data) => {
                    fetched_months += 1;
                    cache.save_archive(url, username, &data)?;
                    data
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to fetch archive month");
                    continue;
                }
            },
        };

        if let Some(games) = month["games"].as_array() {
            raw_games.extend(games.iter().cloned());
        }
    }

    info!(fetched_months, cached_months, games = raw_games.len(), "Archives loaded");
    Ok(raw_games)
}

/// Raw Lichess game objects, limited to the last `days` days when positive.
pub async fn fetch_lichess_games(client: &LichessClient, username: &str, days: i64) -> Result<Vec<Value>> {
    let since = (days > 0).then(|| (Utc::now() - Duration::days(days)).timestamp_millis());
    info!(username, "Fetching Lichess games");
    let games = client.fetch_games(username, since).await?;
    info!(games = games.len(), "Lichess games loaded");
    Ok(games)
}

/// Map raw platform JSON into records where `username` played a seat.
pub fn to_records(raw_games: &[Value], platform: Platform, username: &str) -> Vec<GameRecord> {
    let records: Vec<GameRecord> = raw_games
        .iter()
        .filter_map(|game| match platform {
            Platform::Chesscom => GameRecord::from_chesscom_json(game, username),
            Platform::Lichess => GameRecord::from_lichess_json(game, username),
        })
        .collect();
    info!(raw = raw_games.len(), kept = records.len(), username, "Parsed games");
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_current_month_detected() {
        let base = "https://api.chess.com/pub/player/alice/games";
        assert!(is_current_month(&format!("{base}/2025/03"), now()));
        assert!(!is_current_month(&format!("{base}/2025/02"), now()));
        assert!(!is_current_month(&format!("{base}/2024/03"), now()));
    }

    #[test]
    fn test_unparsable_url_counts_as_current() {
        assert!(is_current_month("https://api.chess.com/pub/player/alice/games", now()));
        assert!(is_current_month("https://api.chess.com/pub/player/alice/games/2025/03/", now()));
    }

    #[test]
    fn test_to_records_drops_foreign_games() {
        let raw = vec![
            serde_json::json!({
                "white": {"username": "Alice", "result": "win"},
                "black": {"username": "bob", "result": "resigned"},
                "end_time": 1_700_000_000,
                "time_class": "blitz",
                "url": "https://www.chess.com/game/live/1",
                "pgn": "[ECO \"C20\"]\n\n1. e4 e5 *"
            }),
            serde_json::json!({
                "white": {"username": "carol", "result": "win"},
                "black": {"username": "dave", "result": "resigned"},
                "end_time": 1_700_000_000,
                "time_class": "blitz",
                "url": "https://www.chess.com/game/live/2"
            }),
        ];
        let records = to_records(&raw, Platform::Chesscom, "alice");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].game_url, "https://www.chess.com/game/live/1");
    }
}
