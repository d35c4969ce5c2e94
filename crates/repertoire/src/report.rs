//! Text rendering of repertoire stats and coaching items.

use std::collections::HashMap;
use std::fmt::Write as _;

use chess_core::color_name;
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color};

use crate::analysis::classify_loss;
use crate::repertoire::{OpeningEvaluation, OpeningStats, OpeningStatsMap};

fn pawns(cp: f64) -> String {
    let value = cp / 100.0;
    if value >= 0.0 {
        format!("+{value:.1}")
    } else {
        format!("{value:.1}")
    }
}

fn opening_label(stats: &OpeningStats) -> String {
    match &stats.eco_code {
        Some(eco) => format!("{} ({eco}) as {}", stats.eco_name, color_name(stats.color)),
        None => format!("{} as {}", stats.eco_name, color_name(stats.color)),
    }
}

fn by_avg_desc(stats: &OpeningStatsMap, keep: impl Fn(&OpeningStats) -> bool) -> Vec<&OpeningStats> {
    let mut rows: Vec<&OpeningStats> = stats.values().filter(|s| keep(s)).collect();
    rows.sort_by(|a, b| b.avg_eval().total_cmp(&a.avg_eval()));
    rows
}

/// One line per bucket played at least `min_games` times, best first.
pub fn format_summary(stats: &OpeningStatsMap, min_games: u32) -> Vec<String> {
    by_avg_desc(stats, |s| s.times_played >= min_games)
        .into_iter()
        .map(|s| {
            format!(
                "{}: avg {} pawns, played {}x, avg book depth {:.1} plies",
                opening_label(s),
                pawns(s.avg_eval()),
                s.times_played,
                s.avg_deviation_ply()
            )
        })
        .collect()
}

/// Buckets seen exactly once.
pub fn format_one_offs(stats: &OpeningStatsMap) -> Vec<String> {
    by_avg_desc(stats, |s| s.times_played == 1)
        .into_iter()
        .map(|s| format!("{}: {} pawns", opening_label(s), pawns(s.avg_eval())))
        .collect()
}

/// A repeated player deviation, represented by its costliest instance.
#[derive(Debug, Clone)]
pub struct CoachingDeviation<'a> {
    pub evaluation: &'a OpeningEvaluation,
    pub occurrences: usize,
}

/// Player deviations with coaching data, grouped by (position, played move)
/// and sorted by loss descending.
pub fn coaching_deviations(evaluations: &[OpeningEvaluation], min_times: usize) -> Vec<CoachingDeviation<'_>> {
    let mut groups: HashMap<(&str, &str), Vec<&OpeningEvaluation>> = HashMap::new();
    for ev in evaluations {
        if !ev.player_deviated() || ev.is_fully_booked || ev.fen_at_deviation.is_empty() {
            continue;
        }
        let Some(played) = ev.played_move_uci.as_deref() else {
            continue;
        };
        groups
            .entry((ev.fen_at_deviation.as_str(), played))
            .or_default()
            .push(ev);
    }

    let mut deviations: Vec<CoachingDeviation<'_>> = groups
        .into_values()
        .filter(|members| members.len() >= min_times)
        .filter_map(|members| {
            let occurrences = members.len();
            // First member wins a tie
            members
                .into_iter()
                .reduce(|best, ev| if ev.eval_loss_cp > best.eval_loss_cp { ev } else { best })
                .map(|evaluation| CoachingDeviation { evaluation, occurrences })
        })
        .collect();

    deviations.sort_by(|a, b| {
        b.evaluation
            .eval_loss_cp
            .cmp(&a.evaluation.eval_loss_cp)
            .then_with(|| a.evaluation.game_url.cmp(&b.evaluation.game_url))
    });
    deviations
}

/// "5." for white's fifth move, "5..." for black's.
pub fn move_label(ply: usize) -> String {
    let number = ply / 2 + 1;
    if ply % 2 == 0 {
        format!("{number}.")
    } else {
        format!("{number}...")
    }
}

/// SAN for a UCI move in `pos`, or the UCI text when it does not apply.
fn to_san(pos: Option<&Chess>, uci: Option<&str>) -> String {
    let Some(uci) = uci else {
        return "N/A".to_string();
    };
    pos.and_then(|pos| {
        let mv = uci.parse::<UciMove>().ok()?.to_move(pos).ok()?;
        Some(San::from_move(pos, mv).to_string())
    })
    .unwrap_or_else(|| uci.to_string())
}

fn position_of(fen: &str) -> Option<Chess> {
    fen.parse::<Fen>()
        .ok()?
        .into_position::<Chess>(CastlingMode::Standard)
        .ok()
}

/// Multi-line coaching entry for one deviation.
pub fn describe_deviation(item: &CoachingDeviation<'_>) -> String {
    let ev = item.evaluation;
    let pos = position_of(&ev.fen_at_deviation);

    let played = to_san(pos.as_ref(), ev.played_move_uci.as_deref());
    let best = to_san(pos.as_ref(), ev.best_move_uci.as_deref());
    let book: Vec<String> = ev
        .book_moves_uci
        .iter()
        .map(|uci| to_san(pos.as_ref(), Some(uci)))
        .collect();
    let book = if book.is_empty() {
        "None in book".to_string()
    } else {
        book.join(", ")
    };

    let loss = f64::from(ev.eval_loss_cp) / 100.0;
    let loss = if loss > 0.0 {
        format!("-{loss:.1}")
    } else {
        format!("+{:.1}", loss.abs())
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} ({}) as {}",
        ev.eco_name,
        ev.eco_code.as_deref().unwrap_or("?"),
        color_name(ev.my_color)
    );
    let _ = writeln!(
        out,
        "  {}{played} ({}, {loss} pawns, position {} pawns)",
        move_label(ev.deviation_ply),
        classify_loss(ev.eval_loss_cp),
        pawns(f64::from(ev.eval_cp))
    );
    let _ = writeln!(out, "  Engine prefers: {best}");
    let _ = writeln!(out, "  Book moves: {book}");
    let _ = write!(out, "  Seen {}x, e.g. {}", item.occurrences, ev.game_url);
    out
}

/// Header line for the coaching report.
pub fn coaching_headline(items: &[CoachingDeviation<'_>]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let as_white = items
        .iter()
        .filter(|d| d.evaluation.my_color == Color::White)
        .count();
    Some(format!(
        "{} recurring deviations ({} as white, {} as black)",
        items.len(),
        as_white,
        items.len() - as_white
    ))
}
