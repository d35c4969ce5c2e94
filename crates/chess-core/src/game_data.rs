use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shakmaty::Color;

use crate::pgn::extract_header;

/// Match outcome from the analyzed player's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameOutcome {
    Win,
    Loss,
    Draw,
}

impl GameOutcome {
    /// Classify a raw platform result string ("win", "resigned", "agreed", ...).
    pub fn from_result(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "win" => Self::Win,
            "checkmated" | "timeout" | "resigned" | "abandoned" | "lose" => Self::Loss,
            _ => Self::Draw,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Loss => "loss",
            Self::Draw => "draw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "win" => Some(Self::Win),
            "loss" => Some(Self::Loss),
            "draw" => Some(Self::Draw),
            _ => None,
        }
    }
}

/// Lowercase color name used in persisted rows and summaries.
pub fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

pub fn parse_color(s: &str) -> Option<Color> {
    match s {
        "white" => Some(Color::White),
        "black" => Some(Color::Black),
        _ => None,
    }
}

/// One played game as seen from the analyzed player's seat.
#[derive(Debug, Clone)]
pub struct GameRecord {
    pub white: String,
    pub black: String,
    pub my_color: Color,
    pub white_result: String,
    pub black_result: String,
    pub termination: String,
    pub pgn: Option<String>,
    pub eco_code: Option<String>,
    pub eco_name: Option<String>,
    pub time_class: String,
    pub end_time: DateTime<Utc>,
    pub game_url: String,
}

impl GameRecord {
    /// Raw result string for the analyzed player.
    pub fn my_result(&self) -> &str {
        match self.my_color {
            Color::White => &self.white_result,
            Color::Black => &self.black_result,
        }
    }

    pub fn outcome(&self) -> GameOutcome {
        GameOutcome::from_result(self.my_result())
    }

    /// Build from one game object of a Chess.com monthly archive.
    /// Returns `None` when `username` sits in neither seat.
    pub fn from_chesscom_json(data: &Value, username: &str) -> Option<Self> {
        let white = data["white"]["username"].as_str().unwrap_or_default();
        let black = data["black"]["username"].as_str().unwrap_or_default();
        let my_color = seat_of(username, white, black)?;

        let end_time = data["end_time"]
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);

        let pgn = data["pgn"].as_str().map(str::to_string);
        let eco_code = pgn.as_deref().and_then(|p| extract_header(p, "ECO"));
        let eco_name = data["eco"]
            .as_str()
            .and_then(opening_name_from_url)
            .or_else(|| pgn.as_deref().and_then(|p| extract_header(p, "Opening")));

        Some(Self {
            white: white.to_string(),
            black: black.to_string(),
            my_color,
            white_result: data["white"]["result"].as_str().unwrap_or_default().to_string(),
            black_result: data["black"]["result"].as_str().unwrap_or_default().to_string(),
            termination: data["termination"].as_str().unwrap_or_default().to_string(),
            pgn,
            eco_code,
            eco_name,
            time_class: data["time_class"].as_str().unwrap_or_default().to_string(),
            end_time,
            game_url: data["url"].as_str().unwrap_or_default().to_string(),
        })
    }

    /// Build from one NDJSON object of the Lichess games export
    /// (requested with `pgnInJson` and `opening`).
    pub fn from_lichess_json(data: &Value, username: &str) -> Option<Self> {
        let white = data["players"]["white"]["user"]["name"].as_str().unwrap_or_default();
        let black = data["players"]["black"]["user"]["name"].as_str().unwrap_or_default();
        let my_color = seat_of(username, white, black)?;

        let (white_result, black_result) = match data["winner"].as_str() {
            Some("white") => ("win", "lose"),
            Some("black") => ("lose", "win"),
            _ => ("draw", "draw"),
        };

        let end_time = data["lastMoveAt"]
            .as_i64()
            .or_else(|| data["createdAt"].as_i64())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        let game_url = data["id"]
            .as_str()
            .map(|id| format!("https://lichess.org/{id}"))
            .unwrap_or_default();

        Some(Self {
            white: white.to_string(),
            black: black.to_string(),
            my_color,
            white_result: white_result.to_string(),
            black_result: black_result.to_string(),
            termination: data["status"].as_str().unwrap_or_default().to_string(),
            pgn: data["pgn"].as_str().filter(|p| !p.is_empty()).map(str::to_string),
            eco_code: data["opening"]["eco"].as_str().map(str::to_string),
            eco_name: data["opening"]["name"].as_str().map(str::to_string),
            time_class: lichess_time_class(data["speed"].as_str().unwrap_or_default()).to_string(),
            end_time,
            game_url,
        })
    }
}

fn seat_of(username: &str, white: &str, black: &str) -> Option<Color> {
    if username.eq_ignore_ascii_case(white) && !white.is_empty() {
        Some(Color::White)
    } else if username.eq_ignore_ascii_case(black) && !black.is_empty() {
        Some(Color::Black)
    } else {
        None
    }
}

/// "https://www.chess.com/openings/Sicilian-Defense-Najdorf" -> "Sicilian Defense Najdorf"
fn opening_name_from_url(url: &str) -> Option<String> {
    let slug = url.trim_end_matches('/').rsplit('/').next()?;
    if slug.is_empty() || slug.contains(':') {
        return None;
    }
    Some(slug.replace('-', " "))
}

/// Fold Lichess speed names onto the Chess.com time classes.
fn lichess_time_class(speed: &str) -> &str {
    match speed {
        "ultraBullet" => "bullet",
        "classical" => "rapid",
        "correspondence" => "daily",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chesscom_game() -> Value {
        json!({
            "url": "https://www.chess.com/game/live/123",
            "pgn": "[ECO \"B90\"]\n\n1. e4 c5 *",
            "time_class": "blitz",
            "end_time": 1736937000,
            "eco": "https://www.chess.com/openings/Sicilian-Defense-Najdorf-Variation",
            "white": {"username": "Alice", "result": "win"},
            "black": {"username": "Bob", "result": "checkmated"},
            "termination": "checkmate"
        })
    }

    #[test]
    fn test_chesscom_as_white() {
        let game = GameRecord::from_chesscom_json(&chesscom_game(), "alice").unwrap();
        assert_eq!(game.my_color, Color::White);
        assert_eq!(game.eco_code.as_deref(), Some("B90"));
        assert_eq!(game.eco_name.as_deref(), Some("Sicilian Defense Najdorf Variation"));
        assert_eq!(game.outcome(), GameOutcome::Win);
        assert_eq!(game.end_time.timestamp(), 1736937000);
        assert_eq!(game.game_url, "https://www.chess.com/game/live/123");
    }

    #[test]
    fn test_chesscom_as_black_and_stranger() {
        let game = GameRecord::from_chesscom_json(&chesscom_game(), "BOB").unwrap();
        assert_eq!(game.my_color, Color::Black);
        assert_eq!(game.outcome(), GameOutcome::Loss);
        assert!(GameRecord::from_chesscom_json(&chesscom_game(), "carol").is_none());
        assert!(GameRecord::from_chesscom_json(&json!({}), "alice").is_none());
    }

    #[test]
    fn test_lichess_game() {
        let data = json!({
            "id": "abc1",
            "speed": "classical",
            "status": "resign",
            "players": {
                "white": {"user": {"name": "TestPlayer"}},
                "black": {"user": {"name": "Opponent"}}
            },
            "winner": "black",
            "lastMoveAt": 1700000000000i64,
            "pgn": "[Event \"Rated\"]\n\n1. e4 e5 0-1",
            "opening": {"eco": "C20", "name": "King Pawn Opening"}
        });
        let game = GameRecord::from_lichess_json(&data, "testplayer").unwrap();
        assert_eq!(game.my_color, Color::White);
        assert_eq!(game.outcome(), GameOutcome::Loss);
        assert_eq!(game.time_class, "rapid");
        assert_eq!(game.game_url, "https://lichess.org/abc1");
        assert_eq!(game.eco_code.as_deref(), Some("C20"));
        assert_eq!(game.end_time.timestamp_millis(), 1700000000000);
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(GameOutcome::from_result("WIN"), GameOutcome::Win);
        assert_eq!(GameOutcome::from_result("timeout"), GameOutcome::Loss);
        assert_eq!(GameOutcome::from_result("stalemate"), GameOutcome::Draw);
        assert_eq!(GameOutcome::parse("loss"), Some(GameOutcome::Loss));
        assert_eq!(GameOutcome::parse(""), None);
    }
}
