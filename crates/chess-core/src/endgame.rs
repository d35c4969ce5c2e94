//! Endgame detection and per-type results.
//!
//! A game's endgame is the first position where queens are gone, or where
//! every side still holding a queen has no rook and at most one minor piece.
//! That position is labelled by piece set ("R vs R", "Q vs -", "Pawn") and
//! by material balance from the player's side.

use std::collections::HashMap;

use shakmaty::{Board, Chess, Color, Position, Role};

use crate::game_data::{GameOutcome, GameRecord};
use crate::pgn::parse_moves;

/// Label order and letters for non-pawn pieces
const LABEL_ROLES: [(Role, char); 4] = [
    (Role::Queen, 'Q'),
    (Role::Rook, 'R'),
    (Role::Bishop, 'B'),
    (Role::Knight, 'N'),
];

/// Material values in pawns, king excluded
const PIECE_VALUES: [(Role, u32); 5] = [
    (Role::Queen, 9),
    (Role::Rook, 5),
    (Role::Bishop, 3),
    (Role::Knight, 3),
    (Role::Pawn, 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialBalance {
    Up,
    Equal,
    Down,
}

impl MaterialBalance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Equal => "equal",
            Self::Down => "down",
        }
    }
}

/// First endgame position reached in one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndgameInfo {
    pub endgame_type: String,
    /// 0-based ply of the move that entered the endgame
    pub endgame_ply: usize,
    pub material_balance: MaterialBalance,
    pub my_result: GameOutcome,
}

/// Results for one (endgame type, balance) group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndgameStats {
    pub endgame_type: String,
    pub balance: MaterialBalance,
    pub total: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub win_pct: u32,
    pub loss_pct: u32,
    pub draw_pct: u32,
}

fn count(board: &Board, color: Color, role: Role) -> u32 {
    (board.by_color(color) & board.by_role(role)).count() as u32
}

pub fn is_endgame(board: &Board) -> bool {
    [Color::White, Color::Black].into_iter().all(|color| {
        count(board, color, Role::Queen) == 0
            || (count(board, color, Role::Rook) == 0
                && count(board, color, Role::Bishop) + count(board, color, Role::Knight) <= 1)
    })
}

/// Compact piece label for one side, e.g. "QRRBBNN" or "" for king and pawns.
pub fn pieces_label(board: &Board, color: Color) -> String {
    let mut label = String::new();
    for (role, letter) in LABEL_ROLES {
        for _ in 0..count(board, color, role) {
            label.push(letter);
        }
    }
    label
}

pub fn material_value(board: &Board, color: Color) -> u32 {
    PIECE_VALUES
        .iter()
        .map(|&(role, value)| count(board, color, role) * value)
        .sum()
}

/// Endgame type and material balance as seen by `my_color`.
pub fn classify_position(board: &Board, my_color: Color) -> (String, MaterialBalance) {
    let mine = pieces_label(board, my_color);
    let theirs = pieces_label(board, !my_color);

    let endgame_type = match (mine.is_empty(), theirs.is_empty()) {
        (true, true) => "Pawn".to_string(),
        (false, false) => format!("{mine} vs {theirs}"),
        (false, true) => format!("{mine} vs -"),
        (true, false) => format!("- vs {theirs}"),
    };

    let my_material = material_value(board, my_color);
    let their_material = material_value(board, !my_color);
    let balance = match my_material.cmp(&their_material) {
        std::cmp::Ordering::Greater => MaterialBalance::Up,
        std::cmp::Ordering::Less => MaterialBalance::Down,
        std::cmp::Ordering::Equal => MaterialBalance::Equal,
    };

    (endgame_type, balance)
}

/// Walk the mainline and classify the first endgame position.
///
/// Returns `None` when the game has no moves or never reaches an endgame.
pub fn analyze_game(game: &GameRecord) -> Option<EndgameInfo> {
    let moves = parse_moves(game.pgn.as_deref()?)?;
    let mut pos = Chess::default();
    for (ply, mv) in moves.into_iter().enumerate() {
        pos.play_unchecked(mv);
        if is_endgame(pos.board()) {
            let (endgame_type, material_balance) = classify_position(pos.board(), game.my_color);
            return Some(EndgameInfo {
                endgame_type,
                endgame_ply: ply,
                material_balance,
                my_result: game.outcome(),
            });
        }
    }
    None
}

/// Group endgame results by (type, balance), most common first.
///
/// Groups seen equally often keep the order they first appeared in.
pub fn aggregate(games: &[GameRecord]) -> Vec<EndgameStats> {
    let mut index: HashMap<(String, MaterialBalance), usize> = HashMap::new();
    let mut groups: Vec<EndgameStats> = Vec::new();

    for info in games.iter().filter_map(analyze_game) {
        let key = (info.endgame_type.clone(), info.material_balance);
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(EndgameStats {
                endgame_type: info.endgame_type.clone(),
                balance: info.material_balance,
                total: 0,
                wins: 0,
                losses: 0,
                draws: 0,
                win_pct: 0,
                loss_pct: 0,
                draw_pct: 0,
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];
        group.total += 1;
        match info.my_result {
            GameOutcome::Win => group.wins += 1,
            GameOutcome::Loss => group.losses += 1,
            GameOutcome::Draw => group.draws += 1,
        }
    }

    for group in &mut groups {
        group.win_pct = percent(group.wins, group.total);
        group.loss_pct = percent(group.losses, group.total);
        group.draw_pct = percent(group.draws, group.total);
    }
    groups.sort_by(|a, b| b.total.cmp(&a.total));
    groups
}

/// Whole percentage, halves rounded to even.
fn percent(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    (100.0 * f64::from(part) / f64::from(whole)).round_ties_even() as u32
}
