//! Game selection by age and time control.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::error::CoreError;
use crate::game_data::GameRecord;

/// Time classes accepted by `--include` / `--exclude`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeClass {
    Bullet,
    Blitz,
    Rapid,
    Daily,
}

impl TimeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bullet => "bullet",
            Self::Blitz => "blitz",
            Self::Rapid => "rapid",
            Self::Daily => "daily",
        }
    }
}

impl fmt::Display for TimeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bullet" => Ok(Self::Bullet),
            "blitz" => Ok(Self::Blitz),
            "rapid" => Ok(Self::Rapid),
            "daily" => Ok(Self::Daily),
            _ => Err(CoreError::UnknownTimeClass(s.to_string())),
        }
    }
}

/// Keep games that ended within the last `days` days of `now`.
/// Zero or negative `days` keeps everything.
pub fn filter_by_days(games: Vec<GameRecord>, days: i64, now: DateTime<Utc>) -> Vec<GameRecord> {
    if days <= 0 {
        return games;
    }
    let cutoff = now - Duration::days(days);
    games.into_iter().filter(|g| g.end_time >= cutoff).collect()
}

/// Apply an include list or an exclude list of time classes.
///
/// A non-empty `include` wins; games whose time class is unknown never
/// match an include list but survive an exclude list.
pub fn filter_by_time_class(
    games: Vec<GameRecord>,
    include: &HashSet<TimeClass>,
    exclude: &HashSet<TimeClass>,
) -> Vec<GameRecord> {
    if !include.is_empty() {
        return games
            .into_iter()
            .filter(|g| matches_any(&g.time_class, include))
            .collect();
    }
    if !exclude.is_empty() {
        return games
            .into_iter()
            .filter(|g| !matches_any(&g.time_class, exclude))
            .collect();
    }
    games
}

fn matches_any(time_class: &str, set: &HashSet<TimeClass>) -> bool {
    time_class
        .parse::<TimeClass>()
        .map(|tc| set.contains(&tc))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shakmaty::Color;

    fn game(time_class: &str, end_time: DateTime<Utc>) -> GameRecord {
        GameRecord {
            white: "PlayerA".into(),
            black: "PlayerB".into(),
            my_color: Color::White,
            white_result: "win".into(),
            black_result: "lose".into(),
            termination: String::new(),
            pgn: None,
            eco_code: None,
            eco_name: None,
            time_class: time_class.into(),
            end_time,
            game_url: String::new(),
        }
    }

    #[test]
    fn test_filter_by_days() {
        let now = Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap();
        let games = vec![
            game("blitz", now - Duration::days(2)),
            game("blitz", now - Duration::days(40)),
        ];
        assert_eq!(filter_by_days(games.clone(), 30, now).len(), 1);
        assert_eq!(filter_by_days(games.clone(), 0, now).len(), 2);
        assert_eq!(filter_by_days(games, -5, now).len(), 2);
    }

    #[test]
    fn test_filter_by_time_class() {
        let now = Utc::now();
        let games = vec![game("blitz", now), game("bullet", now), game("", now)];

        let include: HashSet<_> = [TimeClass::Blitz].into();
        let kept = filter_by_time_class(games.clone(), &include, &HashSet::new());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].time_class, "blitz");

        let exclude: HashSet<_> = [TimeClass::Bullet].into();
        let kept = filter_by_time_class(games.clone(), &HashSet::new(), &exclude);
        assert_eq!(kept.len(), 2);

        assert_eq!(filter_by_time_class(games, &HashSet::new(), &HashSet::new()).len(), 3);
    }

    #[test]
    fn test_time_class_parse() {
        assert_eq!("Rapid".parse::<TimeClass>().unwrap(), TimeClass::Rapid);
        assert!("classical".parse::<TimeClass>().is_err());
    }
}
