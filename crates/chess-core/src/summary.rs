//! Win/loss/draw totals for a game collection.

use shakmaty::Color;

use crate::game_data::{GameOutcome, GameRecord};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameSummary {
    pub total_games: usize,
    pub wins: usize,
    pub losses: usize,
    pub draws: usize,
    pub games_white: usize,
    pub games_black: usize,
    pub win_percent: f64,
    pub win_white_percent: f64,
    pub win_black_percent: f64,
}

impl GameSummary {
    /// Returns `None` for an empty collection.
    pub fn summarize(games: &[GameRecord]) -> Option<Self> {
        if games.is_empty() {
            return None;
        }

        let mut summary = Self {
            total_games: games.len(),
            ..Self::default()
        };
        let mut wins_white = 0;
        let mut wins_black = 0;

        for game in games {
            match game.my_color {
                Color::White => summary.games_white += 1,
                Color::Black => summary.games_black += 1,
            }
            match game.outcome() {
                GameOutcome::Win => {
                    summary.wins += 1;
                    match game.my_color {
                        Color::White => wins_white += 1,
                        Color::Black => wins_black += 1,
                    }
                }
                GameOutcome::Loss => summary.losses += 1,
                GameOutcome::Draw => summary.draws += 1,
            }
        }

        summary.win_percent = percent(summary.wins, summary.total_games);
        summary.win_white_percent = percent(wins_white, summary.games_white);
        summary.win_black_percent = percent(wins_black, summary.games_black);
        Some(summary)
    }
}

/// Percentage rounded to two decimals, 0 for an empty denominator.
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (10_000.0 * part as f64 / whole as f64).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn game(my_color: Color, white_result: &str, black_result: &str) -> GameRecord {
        GameRecord {
            white: "PlayerA".into(),
            black: "PlayerB".into(),
            my_color,
            white_result: white_result.into(),
            black_result: black_result.into(),
            termination: String::new(),
            pgn: None,
            eco_code: None,
            eco_name: None,
            time_class: "blitz".into(),
            end_time: Utc::now(),
            game_url: String::new(),
        }
    }

    #[test]
    fn test_summarize_counts() {
        let games = vec![
            game(Color::White, "win", "resigned"),
            game(Color::White, "timeout", "win"),
            game(Color::Black, "agreed", "agreed"),
        ];
        let s = GameSummary::summarize(&games).unwrap();
        assert_eq!(s.total_games, 3);
        assert_eq!((s.wins, s.losses, s.draws), (1, 1, 1));
        assert_eq!((s.games_white, s.games_black), (2, 1));
        assert_eq!(s.win_percent, 33.33);
        assert_eq!(s.win_white_percent, 50.0);
        assert_eq!(s.win_black_percent, 0.0);
    }

    #[test]
    fn test_summarize_empty() {
        assert!(GameSummary::summarize(&[]).is_none());
    }
}
